//! # Configuration Management
//!
//! Centralized configuration for the master server and the query client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides (`DARKSTAR_*`) via `from_env()` / `apply_env()`
//!
//! Durations are written as milliseconds. A config is only ever consumed as a
//! snapshot: the engine copies what it needs in `new()` / `apply_config()`.

use crate::core::packet::MAX_PACKET_SIZE;
use crate::error::{ProtocolError, Result};
use crate::registry::directory::MAX_MOTD_LEN;
use crate::registry::network::{parse_networks, AddressRewriter, BannedNetworkList, Ipv4Cidr};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default UDP port masters listen on
pub const DEFAULT_LISTEN_PORT: u16 = 29000;

/// Default spanning budget for list responses
pub const DEFAULT_MAX_PACKET_SIZE: usize = 512;

/// Smallest spanning budget that still leaves room for a header and entries
pub const MIN_PACKET_SIZE: usize = 64;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct MasterConfig {
    /// Listening socket
    #[serde(default)]
    pub server: ServerConfig,

    /// What the master advertises and how long it keeps servers
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Banned source networks
    #[serde(default)]
    pub bans: BanConfig,

    /// Address substitution for masters behind NAT
    #[serde(default)]
    pub nat: NatConfig,

    /// Client-side probe settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MasterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `DARKSTAR_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; split out so tests don't
    /// have to touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("DARKSTAR_LISTEN_IP") {
            self.server.listen_ip = ip;
        }

        if let Some(port) = lookup("DARKSTAR_LISTEN_PORT") {
            self.server.listen_port = port.parse::<u16>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid DARKSTAR_LISTEN_PORT: '{port}'"))
            })?;
        }

        if let Some(hostname) = lookup("DARKSTAR_HOSTNAME") {
            self.directory.hostname = hostname;
        }

        if let Some(motd) = lookup("DARKSTAR_MOTD") {
            self.directory.motd = motd;
        }

        if let Some(ttl) = lookup("DARKSTAR_SERVER_TTL_SECS") {
            let secs = ttl.parse::<u64>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid DARKSTAR_SERVER_TTL_SECS: '{ttl}'"))
            })?;
            self.directory.server_ttl = Duration::from_secs(secs);
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.directory.validate());
        errors.extend(self.bans.validate());
        errors.extend(self.nat.validate());
        errors.extend(self.query.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listening socket configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Address to bind; empty means all interfaces
    pub listen_ip: String,

    pub listen_port: u16,

    /// Byte budget for each list response packet
    pub max_packet_size: usize,

    /// Receive buffer size
    pub max_buffer_size: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: String::new(),
            listen_port: DEFAULT_LISTEN_PORT,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_buffer_size: 32768,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind, `0.0.0.0` when `listen_ip` is empty
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip = if self.listen_ip.trim().is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            self.listen_ip.trim().parse::<IpAddr>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid listen_ip: '{}'", self.listen_ip))
            })?
        };
        Ok(SocketAddr::new(ip, self.listen_port))
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = self.listen_addr() {
            errors.push(e.to_string());
        }

        if self.max_packet_size < MIN_PACKET_SIZE || self.max_packet_size > MAX_PACKET_SIZE {
            errors.push(format!(
                "max_packet_size out of range: {} (valid range: {}-{})",
                self.max_packet_size,
                MIN_PACKET_SIZE,
                MAX_PACKET_SIZE
            ));
        }

        if self.max_buffer_size < self.max_packet_size {
            errors.push(format!(
                "max_buffer_size ({}) must be at least max_packet_size ({})",
                self.max_buffer_size, self.max_packet_size
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Directory identity and server lifetime
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DirectoryConfig {
    /// Common name sent in list headers
    pub hostname: String,

    pub motd: String,

    /// Master id placed in every list packet
    pub id: u16,

    /// Distinct ports accepted per source IP
    pub servers_per_ip: u16,

    /// Inactivity window before a server is purged
    #[serde(with = "duration_serde")]
    pub server_ttl: Duration,

    /// How often the sweep runs
    #[serde(with = "duration_serde")]
    pub maintenance_interval: Duration,

    /// Deadline for the heartbeat verification probe
    #[serde(with = "duration_serde")]
    pub verify_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            hostname: String::from("SlimThiccMaster"),
            motd: String::from("Welcome to a Darkstar master server"),
            id: 99,
            servers_per_ip: 15,
            server_ttl: Duration::from_secs(300),
            maintenance_interval: Duration::from_secs(60),
            verify_timeout: timeout::DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.hostname.len() > u8::MAX as usize {
            errors.push(format!(
                "hostname too long: {} bytes (maximum: 255)",
                self.hostname.len()
            ));
        }

        if self.motd.len() > MAX_MOTD_LEN {
            errors.push(format!(
                "motd too long: {} bytes (maximum: {MAX_MOTD_LEN})",
                self.motd.len()
            ));
        }

        if self.servers_per_ip == 0 {
            errors.push("servers_per_ip must be greater than 0".to_string());
        }

        if self.server_ttl.is_zero() {
            errors.push("server_ttl must be greater than 0".to_string());
        }

        if self.maintenance_interval.is_zero() {
            errors.push("maintenance_interval must be greater than 0".to_string());
        }

        if self.verify_timeout.is_zero() {
            errors.push("verify_timeout must be greater than 0".to_string());
        }

        errors
    }
}

/// Banned source networks and the message they get instead of a list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BanConfig {
    /// CIDR ranges, e.g. "224.0.0.0/4"
    pub banned_networks: Vec<String>,

    /// MOTD of the ban response
    pub banned_message: String,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            banned_networks: vec![String::from("224.0.0.0/4")],
            banned_message: String::from(
                "Welcome to bansville, population: you\\nVisit the discord to appeal!",
            ),
        }
    }
}

impl BanConfig {
    pub fn ban_list(&self) -> Result<BannedNetworkList> {
        parse_networks(&self.banned_networks).map(BannedNetworkList::new)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .banned_networks
            .iter()
            .filter_map(|net| net.parse::<Ipv4Cidr>().err())
            .map(|e| format!("banned_networks: {e}"))
            .collect();

        if self.banned_message.len() > MAX_MOTD_LEN {
            errors.push(format!(
                "banned_message too long: {} bytes (maximum: {MAX_MOTD_LEN})",
                self.banned_message.len()
            ));
        }

        errors
    }
}

/// Address substitution; disabled while `local_networks` is empty
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct NatConfig {
    /// Publicly reachable address of this master
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<Ipv4Addr>,

    /// CIDR ranges considered local to this master
    #[serde(default)]
    pub local_networks: Vec<String>,
}

impl NatConfig {
    pub fn rewriter(&self) -> Result<AddressRewriter> {
        let networks = parse_networks(&self.local_networks)?;
        Ok(AddressRewriter::new(self.external_ip, networks))
    }

    pub fn validate(&self) -> Vec<String> {
        self.local_networks
            .iter()
            .filter_map(|net| net.parse::<Ipv4Cidr>().err())
            .map(|e| format!("local_networks: {e}"))
            .collect()
    }
}

/// Client-side probe configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QueryConfig {
    /// Per-request deadline
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Copies of each request to send
    pub send_attempts: u8,

    /// Drop 127.x entries found in master lists
    pub skip_loopback_entries: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: timeout::DEFAULT_QUERY_TIMEOUT,
            send_attempts: 1,
            skip_loopback_entries: true,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.timeout.as_millis() < 10 {
            errors.push("Query timeout too short (minimum: 10ms)".to_string());
        }

        if self.send_attempts == 0 {
            errors.push("send_attempts must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
