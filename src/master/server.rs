//! UDP runtime for the master directory.
//!
//! One receive loop feeds [`MasterDirectoryEngine`]; heartbeat verification
//! runs in spawned tasks and the sweep runs on its own interval. Everything
//! stops when the shutdown channel fires.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MasterConfig;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::master::{Action, MasterDirectoryEngine};
use crate::query::{Query, QueryOptions};
use crate::registry::network::is_private;
use crate::utils::duplicate::DuplicateGuard;

/// A bound master server, ready to [`run`](MasterServer::run).
#[derive(Debug)]
pub struct MasterServer {
    engine: Arc<MasterDirectoryEngine>,
    socket: Arc<UdpSocket>,
    config: MasterConfig,
    local_addr: SocketAddr,
}

impl MasterServer {
    /// Validate `config`, build the engine and bind the listen socket.
    pub async fn bind(config: MasterConfig) -> Result<Self> {
        config.validate_strict()?;
        let engine = Arc::new(MasterDirectoryEngine::new(&config)?);
        let addr = config.server.listen_addr()?;

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            error!(component = "startup", error = %e, "unable to bind to {addr}");
            ProtocolError::Io(e)
        })?;
        let local_addr = socket.local_addr()?;
        info!(component = "startup", "now listening on [{local_addr}]");

        Ok(Self {
            engine,
            socket: Arc::new(socket),
            config,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the engine, e.g. for applying a reloaded config.
    pub fn engine(&self) -> Arc<MasterDirectoryEngine> {
        Arc::clone(&self.engine)
    }

    /// Serve until `shutdown` receives a message or its senders are dropped.
    #[instrument(skip_all, fields(listen = %self.local_addr))]
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let maintenance = tokio::spawn(maintenance_loop(
            Arc::clone(&self.engine),
            self.config.directory.maintenance_interval,
        ));

        let verify_options = QueryOptions::verification(self.config.directory.verify_timeout);
        let mut verifications: JoinSet<()> = JoinSet::new();
        let mut duplicates = DuplicateGuard::new();
        let mut interfaces = InterfaceCache::new(self.local_addr);
        let mut buf = vec![0u8; self.config.server.max_buffer_size];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(component = "shutdown", "shutdown initiated...");
                    break;
                }

                Some(joined) = verifications.join_next(), if !verifications.is_empty() => {
                    if let Err(e) = joined {
                        warn!(component = "server", error = %e, "verification task failed");
                    }
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(component = "server", error = %e, "receive failed");
                            continue;
                        }
                    };
                    let datagram = &buf[..len];

                    if duplicates.is_duplicate(peer, datagram) {
                        self.engine.metrics().duplicate_dropped();
                        continue;
                    }

                    // only private requesters get loopback entries substituted
                    let interface = if self.engine.is_rewriting() && is_private(peer.ip()) {
                        interfaces.lookup(peer)
                    } else {
                        None
                    };

                    match self.engine.handle_datagram(datagram, peer, interface, Instant::now()) {
                        Action::Verify(address) => {
                            let engine = Arc::clone(&self.engine);
                            let options = verify_options.clone();
                            verifications.spawn(verify(engine, options, address));
                        }
                        Action::Reply { packets, banned } => {
                            self.reply(peer, &packets, banned).await;
                        }
                        Action::Drop => {}
                    }
                }
            }
        }

        maintenance.abort();
        let drained = tokio::time::timeout(self.config.server.shutdown_timeout, async {
            while verifications.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                component = "shutdown",
                outstanding = verifications.len(),
                "shutdown timeout reached, abandoning verifications"
            );
            verifications.shutdown().await;
        }

        info!(component = "shutdown", "process complete");
        Ok(())
    }

    async fn reply(&self, peer: SocketAddr, packets: &[Packet], banned: bool) {
        for packet in packets {
            if let Err(e) = self.socket.send_to(&packet.encode(), peer).await {
                warn!(component = "server", server = %peer, error = %e, "failed to send reply");
                return;
            }
        }

        let metrics = self.engine.metrics();
        if banned {
            metrics.ban_sent();
            info!(component = "server", server = %peer, "banned message sent");
        } else {
            metrics.list_sent();
            info!(component = "server", server = %peer, packets = packets.len(), "servers list sent");
        }
    }
}

async fn verify(engine: Arc<MasterDirectoryEngine>, options: QueryOptions, address: SocketAddrV4) {
    let outcome = Query::new(options).server(&address.to_string()).await;
    // success and failure are both logged by the engine
    let _ = engine.complete_verification(address, outcome, Instant::now());
}

async fn maintenance_loop(engine: Arc<MasterDirectoryEngine>, period: std::time::Duration) {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period);
    loop {
        interval.tick().await;
        if let Err(e) = engine.sweep(Instant::now()) {
            error!(component = "maintenance", error = %e, "sweep failed");
        }
        engine.metrics().log_metrics();
    }
}

/// Route lookups are cleared wholesale past this many requesters.
const INTERFACE_CACHE_LIMIT: usize = 1024;

/// Local IPv4 address a datagram from a given requester most likely arrived
/// on.
///
/// A specific bind address is used as is. For a wildcard bind the routing
/// table is asked once per requester by connecting a throwaway socket towards
/// it, and the answer is remembered.
#[derive(Debug)]
struct InterfaceCache {
    bound: SocketAddr,
    routes: HashMap<IpAddr, Option<Ipv4Addr>>,
}

impl InterfaceCache {
    fn new(bound: SocketAddr) -> Self {
        Self {
            bound,
            routes: HashMap::new(),
        }
    }

    fn lookup(&mut self, peer: SocketAddr) -> Option<Ipv4Addr> {
        if let IpAddr::V4(ip) = self.bound.ip() {
            if !ip.is_unspecified() {
                return Some(ip);
            }
        }

        if let Some(route) = self.routes.get(&peer.ip()) {
            return *route;
        }
        if self.routes.len() >= INTERFACE_CACHE_LIMIT {
            self.routes.clear();
        }
        let route = route_to(peer);
        self.routes.insert(peer.ip(), route);
        route
    }
}

fn route_to(peer: SocketAddr) -> Option<Ipv4Addr> {
    let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
        socket.connect(peer)?;
        socket.local_addr()
    });
    match probe {
        Ok(SocketAddr::V4(local)) => Some(*local.ip()),
        Ok(_) => None,
        Err(e) => {
            debug!(component = "server", server = %peer, error = %e, "no route to requester");
            None
        }
    }
}

/// Bind and serve `config` until CTRL+C.
pub async fn start_server(config: MasterConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!(component = "shutdown", "Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(config, shutdown_rx).await
}

/// Bind and serve `config` with an external shutdown channel.
pub async fn start_server_with_shutdown(
    config: MasterConfig,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    MasterServer::bind(config).await?.run(shutdown_rx).await
}
