//! # Server Registry
//!
//! In-memory directory of verified game servers.
//!
//! ## Components
//! - **ServerRegistry**: records keyed by "ip:port", per-IP quotas, pending verifications
//! - **MasterDirectory**: name/MOTD/id and the list wire format
//! - **Spanning**: splitting a listing over several datagrams
//! - **Network**: CIDR ranges, the ban list, NAT address substitution
//!
//! Nothing here is synchronized; the engine owns one registry behind a single
//! lock and every read-modify-write goes through it.

pub mod directory;
pub mod network;
pub mod record;
pub mod spanning;

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use crate::core::ping_info::PingInfo;
use crate::error::{ProtocolError, Result};

pub use directory::MasterDirectory;
pub use network::{AddressRewriter, BannedNetworkList, Ipv4Cidr};
pub use record::ServerRecord;
pub use spanning::SpanPlan;

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// First time this "ip:port" was seen.
    pub is_new: bool,
    /// Time since the previous heartbeat; zero for new servers.
    pub delta: Duration,
    /// Servers now registered for the source IP.
    pub count: u16,
}

#[derive(Debug)]
pub struct ServerRegistry {
    servers: HashMap<String, ServerRecord>,
    per_ip: HashMap<Ipv4Addr, u16>,
    pending: HashSet<String>,
    servers_per_ip: u16,
    ttl: Duration,
}

impl ServerRegistry {
    pub fn new(servers_per_ip: u16, ttl: Duration) -> Self {
        Self {
            servers: HashMap::new(),
            per_ip: HashMap::new(),
            pending: HashSet::new(),
            servers_per_ip,
            ttl,
        }
    }

    /// Apply new limits. Existing records pick up the new TTL; servers already
    /// over a lowered quota stay until they expire.
    pub fn set_limits(&mut self, servers_per_ip: u16, ttl: Duration) {
        self.servers_per_ip = servers_per_ip;
        self.ttl = ttl;
        for record in self.servers.values_mut() {
            record.ttl = ttl;
        }
    }

    pub fn servers_per_ip(&self) -> u16 {
        self.servers_per_ip
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns false if the address was already pending.
    pub fn mark_pending(&mut self, address: SocketAddrV4) -> bool {
        self.pending.insert(address.to_string())
    }

    pub fn clear_pending(&mut self, address: SocketAddrV4) -> bool {
        self.pending.remove(&address.to_string())
    }

    pub fn is_pending(&self, address: SocketAddrV4) -> bool {
        self.pending.contains(&address.to_string())
    }

    pub fn is_registered(&self, address: SocketAddrV4) -> bool {
        self.servers.contains_key(&address.to_string())
    }

    /// Insert or refresh a server.
    ///
    /// A new "ip:port" is rejected once its IP already holds `servers_per_ip`
    /// entries; the registry is left untouched in that case.
    pub fn register(
        &mut self,
        address: SocketAddrV4,
        info: Option<PingInfo>,
        now: Instant,
    ) -> Result<Registration> {
        let key = address.to_string();
        let ip = *address.ip();

        if let Some(record) = self.servers.get_mut(&key) {
            let delta = record.touch(now);
            if info.is_some() {
                record.info = info;
            }
            return Ok(Registration {
                is_new: false,
                delta,
                count: self.per_ip.get(&ip).copied().unwrap_or(0),
            });
        }

        let count = self.per_ip.get(&ip).copied().unwrap_or(0);
        if u32::from(count) + 1 > u32::from(self.servers_per_ip) {
            return Err(ProtocolError::RegistrationRejected {
                address: key,
                count,
                limit: self.servers_per_ip,
            });
        }

        let mut record = ServerRecord::new(address, now, self.ttl);
        record.info = info;
        self.servers.insert(key, record);
        self.per_ip.insert(ip, count + 1);

        Ok(Registration {
            is_new: true,
            delta: Duration::ZERO,
            count: count + 1,
        })
    }

    /// Remove every record with `now - last_seen >= ttl`, returning them.
    pub fn sweep(&mut self, now: Instant) -> Vec<ServerRecord> {
        let expired: Vec<String> = self
            .servers
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for key in expired {
            let Some(record) = self.servers.remove(&key) else {
                continue;
            };
            self.pending.remove(&key);

            let ip = *record.address.ip();
            if let Some(count) = self.per_ip.get_mut(&ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.per_ip.remove(&ip);
                }
            }
            removed.push(record);
        }
        removed
    }

    /// Registered addresses, ascending by "ip:port".
    pub fn sorted_addresses(&self) -> Vec<SocketAddrV4> {
        let mut keys: Vec<&String> = self.servers.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| self.servers.get(key))
            .map(|record| record.address)
            .collect()
    }

    pub fn get(&self, address: SocketAddrV4) -> Option<&ServerRecord> {
        self.servers.get(&address.to_string())
    }

    pub fn ip_count(&self, ip: Ipv4Addr) -> u16 {
        self.per_ip.get(&ip).copied().unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
