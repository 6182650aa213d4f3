//! # Query Engine
//!
//! Concurrent client-side probing of masters and game servers.
//!
//! Every batch call resolves and binds all targets first. Targets that fail
//! at that stage are reported as errors and never dispatched; every other
//! target gets its own task and contributes exactly one success or one error.
//! Failures never cancel sibling probes.
//!
//! ## Example
//! ```no_run
//! use darkstar_query::query::{Query, QueryOptions};
//!
//! # async fn run() {
//! let query = Query::new(QueryOptions::default());
//! let results = query.masters(&["master2.starsiege.pw:29000"]).await;
//! let addresses: Vec<String> = results.servers.keys().cloned().collect();
//! let status = query.servers(&addresses).await;
//! for info in &status.servers {
//!     println!("{info}");
//! }
//! # }
//! ```

pub mod probe;

use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::core::packet::MAX_PACKET_SIZE;
use crate::core::ping_info::PingInfo;
use crate::error::{ProtocolError, Result, TargetError};
use crate::registry::directory::MasterDirectory;
use crate::utils::timeout::DEFAULT_QUERY_TIMEOUT;

pub use probe::{dial, resolve, Target};

/// Per-probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Deadline for the whole exchange with one target
    pub timeout: Duration,
    /// Copies of the request sent back to back
    pub send_attempts: u8,
    /// Largest datagram expected from a target
    pub max_packet_size: usize,
    /// Drop 127.x entries from master lists
    pub skip_loopback_entries: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            send_attempts: 1,
            max_packet_size: MAX_PACKET_SIZE,
            skip_loopback_entries: true,
        }
    }
}

impl QueryOptions {
    /// Options for verifying a heartbeat: short deadline, request sent twice.
    pub fn verification(timeout: Duration) -> Self {
        Self {
            timeout,
            send_attempts: 2,
            ..Self::default()
        }
    }
}

impl From<&QueryConfig> for QueryOptions {
    fn from(config: &QueryConfig) -> Self {
        Self {
            timeout: config.timeout,
            send_attempts: config.send_attempts,
            skip_loopback_entries: config.skip_loopback_entries,
            ..Self::default()
        }
    }
}

/// A game server address and the master that listed it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredServer {
    pub address: SocketAddrV4,
    pub master: String,
}

#[derive(Debug, Default)]
pub struct MasterQueryResults {
    /// Masters that answered, in the order the addresses were given
    pub masters: Vec<MasterDirectory>,
    /// Every listed server across all masters, keyed by "ip:port"
    pub servers: HashMap<String, DiscoveredServer>,
    pub errors: Vec<TargetError>,
}

#[derive(Debug, Default)]
pub struct ServerQueryResults {
    pub servers: Vec<PingInfo>,
    pub errors: Vec<TargetError>,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    options: QueryOptions,
}

impl Query {
    pub fn new(options: QueryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Fetch the server list from every master in `addresses`.
    pub async fn masters<S: AsRef<str>>(&self, addresses: &[S]) -> MasterQueryResults {
        let (outcomes, errors) = self
            .fan_out(addresses, |target, options| async move {
                target.query_master(&options).await
            })
            .await;

        let mut results = MasterQueryResults {
            errors,
            ..MasterQueryResults::default()
        };
        for (address, outcome) in outcomes {
            match outcome {
                Ok(directory) if !directory.ping.is_zero() => results.masters.push(directory),
                Ok(_) => debug!(server = %address, "discarding response without round trip"),
                Err(error) => results.errors.push(TargetError::new(address, error)),
            }
        }

        results.servers = dedupe(&results.masters);
        info!(
            masters = results.masters.len(),
            servers = results.servers.len(),
            errors = results.errors.len(),
            "master query complete"
        );
        results
    }

    /// Fetch the status of every game server in `addresses`.
    pub async fn servers<S: AsRef<str>>(&self, addresses: &[S]) -> ServerQueryResults {
        let (outcomes, errors) = self
            .fan_out(addresses, |target, options| async move {
                target.query_server(&options).await
            })
            .await;

        let mut results = ServerQueryResults {
            errors,
            ..ServerQueryResults::default()
        };
        for (address, outcome) in outcomes {
            match outcome {
                Ok(info) => results.servers.push(info),
                Err(error) => results.errors.push(TargetError::new(address, error)),
            }
        }
        results
    }

    /// Status of a single game server.
    pub async fn server(&self, address: &str) -> Result<PingInfo> {
        dial(address).await?.query_server(&self.options).await
    }

    /// Dial every address, spawn one probe per dialed target and wait for all
    /// of them. Returns per-target outcomes plus the dial failures.
    async fn fan_out<S, F, Fut, T>(
        &self,
        addresses: &[S],
        probe: F,
    ) -> (Vec<(String, Result<T>)>, Vec<TargetError>)
    where
        S: AsRef<str>,
        F: Fn(Target, QueryOptions) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut errors = Vec::new();
        let mut handles = Vec::with_capacity(addresses.len());

        for address in addresses {
            let address = address.as_ref();
            match dial(address).await {
                Ok(target) => {
                    let task = tokio::spawn(probe(target, self.options.clone()));
                    handles.push((address.to_string(), task));
                }
                Err(error) => {
                    debug!(server = address, %error, "dial failed");
                    errors.push(TargetError::new(address, error));
                }
            }
        }

        let (names, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(tasks).await;

        let outcomes = names
            .into_iter()
            .zip(joined)
            .map(|(address, joined)| {
                let outcome =
                    joined.unwrap_or_else(|e| Err(ProtocolError::TaskFailed(e.to_string())));
                (address, outcome)
            })
            .collect();

        (outcomes, errors)
    }
}

/// Merge every master's servers into one map; the first master to list an
/// address keeps it.
fn dedupe(masters: &[MasterDirectory]) -> HashMap<String, DiscoveredServer> {
    let mut servers = HashMap::new();
    for master in masters {
        for (key, address) in &master.servers {
            servers
                .entry(key.clone())
                .or_insert_with(|| DiscoveredServer {
                    address: *address,
                    master: master.address.clone(),
                });
        }
    }
    servers
}
