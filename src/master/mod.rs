//! # Master Directory Engine
//!
//! Server-side state machine turning heartbeats into a verified, bounded,
//! expiring directory.
//!
//! ## Lifecycle per "ip:port"
//! ```text
//! Unknown --heartbeat--> Pending --verified status--> Registered --sweep--> Removed
//! ```
//!
//! The engine never touches a socket. [`MasterDirectoryEngine::handle_datagram`]
//! classifies one datagram and returns an [`Action`] for the caller (the
//! receive loop in [`server`]) to carry out. All directory state lives behind
//! one lock owned by the engine; the receive loop, verification tasks and the
//! sweep share it through an `Arc`.

pub mod server;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::MasterConfig;
use crate::core::packet::{Packet, PacketType};
use crate::core::ping_info::PingInfo;
use crate::error::{ProtocolError, Result};
use crate::registry::{
    AddressRewriter, BannedNetworkList, MasterDirectory, Registration, ServerRecord,
    ServerRegistry,
};
use crate::utils::metrics::{Metrics, Timer};

pub use server::{start_server, start_server_with_shutdown, MasterServer};

/// What the receive loop should do with a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Probe the sender, then report back through
    /// [`MasterDirectoryEngine::complete_verification`].
    Verify(SocketAddrV4),
    /// Send these packets to the sender, in order.
    Reply { packets: Vec<Packet>, banned: bool },
    Drop,
}

#[derive(Debug)]
struct EngineState {
    live: MasterDirectory,
    banned: MasterDirectory,
    registry: ServerRegistry,
    bans: BannedNetworkList,
    rewriter: AddressRewriter,
    max_packet_size: usize,
}

#[derive(Debug)]
pub struct MasterDirectoryEngine {
    state: Mutex<EngineState>,
    rewriting: AtomicBool,
    metrics: Metrics,
}

impl MasterDirectoryEngine {
    pub fn new(config: &MasterConfig) -> Result<Self> {
        let bans = config.bans.ban_list()?;
        let rewriter = config.nat.rewriter()?;
        let directory = &config.directory;

        let state = EngineState {
            live: MasterDirectory::new(&directory.hostname, &directory.motd, directory.id),
            banned: MasterDirectory::new(
                &directory.hostname,
                &config.bans.banned_message,
                directory.id,
            ),
            registry: ServerRegistry::new(directory.servers_per_ip, directory.server_ttl),
            bans,
            rewriter,
            max_packet_size: config.server.max_packet_size,
        };

        Ok(Self {
            rewriting: AtomicBool::new(state.rewriter.is_enabled()),
            state: Mutex::new(state),
            metrics: Metrics::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state.lock().map_err(|_| ProtocolError::LockPoisoned)
    }

    /// Swap in a new configuration without dropping registered servers.
    ///
    /// Bans and NAT ranges are parsed before anything changes, so a bad
    /// config leaves the running one in place.
    pub fn apply_config(&self, config: &MasterConfig) -> Result<()> {
        let bans = config.bans.ban_list()?;
        let rewriter = config.nat.rewriter()?;
        let directory = &config.directory;

        let mut state = self.lock()?;
        state.live.common_name = directory.hostname.clone();
        state.live.motd = directory.motd.clone();
        state.live.master_id = directory.id;
        state.banned.common_name = directory.hostname.clone();
        state.banned.motd = config.bans.banned_message.clone();
        state.banned.master_id = directory.id;
        state
            .registry
            .set_limits(directory.servers_per_ip, directory.server_ttl);
        state.max_packet_size = config.server.max_packet_size;
        self.rewriting.store(rewriter.is_enabled(), Ordering::Relaxed);
        state.bans = bans;
        state.rewriter = rewriter;

        info!(
            component = "config",
            hostname = %directory.hostname,
            id = directory.id,
            banned_networks = state.bans.len(),
            "configuration applied"
        );
        Ok(())
    }

    /// Whether list responses depend on the receiving interface.
    pub fn is_rewriting(&self) -> bool {
        self.rewriting.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Classify one inbound datagram.
    ///
    /// `interface` is the local address the datagram arrived on; it is only
    /// needed when address rewriting is enabled. Nothing here fails: bad input
    /// is logged and dropped.
    pub fn handle_datagram(
        &self,
        raw: &[u8],
        peer: SocketAddr,
        interface: Option<Ipv4Addr>,
        now: Instant,
    ) -> Action {
        self.metrics.datagram_received(raw.len() as u64);

        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                self.metrics.malformed_packet();
                warn!(component = "server", server = %peer, error = %e, "dropping undecodable datagram");
                return Action::Drop;
            }
        };

        let peer = match ipv4_peer(peer) {
            Ok(peer) => peer,
            Err(e) => {
                self.metrics.unsolicited_packet();
                warn!(component = "server", error = %e, kind = %packet.kind, "dropping datagram");
                return Action::Drop;
            }
        };

        match self.classify(&packet, peer, interface, now) {
            Ok(action) => action,
            Err(e) => {
                error!(component = "server", server = %peer, error = %e, "failed to handle datagram");
                Action::Drop
            }
        }
    }

    fn classify(
        &self,
        packet: &Packet,
        peer: SocketAddrV4,
        interface: Option<Ipv4Addr>,
        now: Instant,
    ) -> Result<Action> {
        let mut state = self.lock()?;
        let banned = state.bans.is_banned(IpAddr::V4(*peer.ip()));

        match packet.kind {
            PacketType::MasterServerHeartbeat if banned => {
                self.metrics.banned_request();
                warn!(component = "server", server = %peer, "received {} packet from banned host", packet.kind);
                Ok(Action::Drop)
            }
            PacketType::MasterServerHeartbeat => {
                self.metrics.heartbeat();
                state.registry.mark_pending(peer);
                debug!(component = "server", server = %peer, "heartbeat received, verifying");
                Ok(Action::Verify(peer))
            }
            PacketType::PingInfoQuery if banned => {
                self.metrics.banned_request();
                warn!(component = "server", server = %peer, "received {} packet from banned host", packet.kind);
                let packets =
                    state
                        .banned
                        .generate_packets(&[], packet.key, state.max_packet_size, |ip| ip);
                Ok(Action::Reply {
                    packets,
                    banned: true,
                })
            }
            PacketType::PingInfoQuery => Ok(Action::Reply {
                packets: list_packets(&state, packet.key, IpAddr::V4(*peer.ip()), interface),
                banned: false,
            }),
            PacketType::PingInfoResponse
                if !banned
                    && (state.registry.is_pending(peer) || state.registry.is_registered(peer)) =>
            {
                drop(state);
                let info = PingInfo::from_packet(packet).map(|mut info| {
                    info.address = peer.to_string();
                    info
                });
                // outcome is logged by the registration path
                let _ = self.complete_verification(peer, info, now);
                Ok(Action::Drop)
            }
            kind => {
                self.metrics.unsolicited_packet();
                if banned {
                    warn!(component = "server", server = %peer, "received unsolicited packet type {kind} from banned host");
                } else {
                    warn!(component = "server", server = %peer, "received unsolicited packet type {kind}");
                }
                Ok(Action::Drop)
            }
        }
    }

    /// Record the result of a verification probe for `peer`.
    ///
    /// A failed probe leaves the registry untouched; an unregistered peer
    /// also loses its pending marker.
    pub fn complete_verification(
        &self,
        peer: SocketAddrV4,
        outcome: Result<PingInfo>,
        now: Instant,
    ) -> Result<Registration> {
        match outcome {
            Ok(info) => self.register(peer, Some(info), now),
            Err(e) => {
                self.metrics.verification_failed();
                warn!(component = "server", server = %peer, error = %e, "error during server verification");
                let mut state = self.lock()?;
                if !state.registry.is_registered(peer) {
                    state.registry.clear_pending(peer);
                }
                Err(e)
            }
        }
    }

    /// Insert or refresh `peer`, enforcing the per-IP quota.
    pub fn register(
        &self,
        peer: SocketAddrV4,
        info: Option<PingInfo>,
        now: Instant,
    ) -> Result<Registration> {
        let mut state = self.lock()?;
        let limit = state.registry.servers_per_ip();
        let outcome = state.registry.register(peer, info, now);
        state.registry.clear_pending(peer);

        match outcome {
            Ok(registration) if registration.is_new => {
                self.metrics.registration();
                info!(component = "server", server = %peer, "Heartbeat - New Server");
                info!(
                    component = "server",
                    server = %peer,
                    "New Server for IP - total server count for IP: {}/{}",
                    registration.count,
                    limit
                );
                Ok(registration)
            }
            Ok(registration) => {
                info!(component = "server", server = %peer, "Heartbeat - delta: {:?}", registration.delta);
                Ok(registration)
            }
            Err(e) => {
                self.metrics.rejection();
                if let ProtocolError::RegistrationRejected { count, limit, .. } = &e {
                    warn!(
                        component = "server",
                        server = %peer,
                        "Rejecting additional server for IP - count: {count}/{limit}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Remove every expired server. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> Result<usize> {
        let _timer = Timer::start("sweep");
        let removed: Vec<ServerRecord> = self.lock()?.registry.sweep(now);

        for record in &removed {
            info!(
                component = "maintenance",
                server = %record.address,
                last_seen_secs = now.saturating_duration_since(record.last_seen).as_secs(),
                "Removing server"
            );
        }
        self.metrics.servers_expired(removed.len() as u64);
        info!(component = "maintenance", "Cleaned up {} stale servers", removed.len());
        Ok(removed.len())
    }

    /// The live list response for `requester`.
    pub fn list_packets(
        &self,
        key: u16,
        requester: IpAddr,
        interface: Option<Ipv4Addr>,
    ) -> Result<Vec<Packet>> {
        let state = self.lock()?;
        Ok(list_packets(&state, key, requester, interface))
    }

    pub fn server_count(&self) -> Result<usize> {
        Ok(self.lock()?.registry.len())
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.lock()?.registry.pending_count())
    }

    /// Registered addresses, sorted by "ip:port".
    pub fn servers(&self) -> Result<Vec<SocketAddrV4>> {
        Ok(self.lock()?.registry.sorted_addresses())
    }

    /// Last verified status of a registered server.
    pub fn server_info(&self, address: SocketAddrV4) -> Result<Option<PingInfo>> {
        Ok(self
            .lock()?
            .registry
            .get(address)
            .and_then(|record| record.info.clone()))
    }
}

fn list_packets(
    state: &EngineState,
    key: u16,
    requester: IpAddr,
    interface: Option<Ipv4Addr>,
) -> Vec<Packet> {
    let entries = state.registry.sorted_addresses();
    state
        .live
        .generate_packets(&entries, key, state.max_packet_size, |ip| {
            state.rewriter.rewrite(ip, requester, interface)
        })
}

/// The wire format only carries IPv4; v4-mapped IPv6 peers are unwrapped.
fn ipv4_peer(peer: SocketAddr) -> Result<SocketAddrV4> {
    match peer {
        SocketAddr::V4(v4) => Ok(v4),
        SocketAddr::V6(v6) => v6
            .ip()
            .to_ipv4_mapped()
            .map(|ip| SocketAddrV4::new(ip, v6.port()))
            .ok_or_else(|| ProtocolError::UnsupportedAddress(peer.to_string())),
    }
}
