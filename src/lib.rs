//! # Darkstar Query
//!
//! Master server and concurrent query engine for the Darkstar UDP
//! game-server discovery protocol.
//!
//! Game servers announce themselves to a master with heartbeats; the master
//! verifies each one with a status probe and keeps a bounded, expiring
//! directory. Clients ask masters for that directory (possibly spread over
//! several datagrams) and then probe the listed servers directly.
//!
//! ## Modules
//! - [`core`]: the 8-byte envelope, the datagram codec and the status payload
//! - [`registry`]: directory state, the list wire format and response spanning
//! - [`master`]: the heartbeat/verify/list state machine and its UDP runtime
//! - [`query`]: concurrent master and game-server probes
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Example
//! ```no_run
//! use darkstar_query::config::MasterConfig;
//! use darkstar_query::master::start_server;
//!
//! # async fn run() -> darkstar_query::error::Result<()> {
//! let config = MasterConfig::from_file("mastersrv.toml")?;
//! start_server(config).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod master;
pub mod query;
pub mod registry;
pub mod utils;

pub use crate::config::MasterConfig;
pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{Packet, PacketType, MAX_PACKET_SIZE};
pub use crate::core::ping_info::PingInfo;
pub use crate::error::{ProtocolError, Result};
pub use crate::master::{MasterDirectoryEngine, MasterServer};
pub use crate::query::{Query, QueryOptions};
pub use crate::registry::{MasterDirectory, ServerRegistry};
