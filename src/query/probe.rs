//! Single-target probes.
//!
//! A target is resolved and bound before anything is spawned so that dial
//! failures never occupy a task. Each probe owns an unconnected socket framed
//! with [`PacketCodec`]. Datagrams from anyone but the target, and datagrams
//! that do not decode, are skipped rather than failing the probe.

use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::Instant;
use tokio_util::udp::UdpFramed;
use tracing::{debug, trace};

use crate::core::codec::PacketCodec;
use crate::core::packet::{Packet, PacketType, REQUEST_ALL_PACKETS};
use crate::core::ping_info::PingInfo;
use crate::error::{constants, DialError, ProtocolError, Result};
use crate::query::QueryOptions;
use crate::registry::directory::MasterDirectory;
use crate::utils::timeout::with_deadline;

/// A resolved, bound target ready to be probed.
pub struct Target {
    /// Address as the caller wrote it.
    pub address: String,
    pub remote: SocketAddrV4,
    framed: UdpFramed<PacketCodec>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("address", &self.address)
            .field("remote", &self.remote)
            .finish()
    }
}

/// Resolve `address` ("host:port") to its first IPv4 endpoint.
pub async fn resolve(address: &str) -> Result<SocketAddrV4> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(DialError::InvalidAddress {
            address: address.to_string(),
        }
        .into());
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(DialError::InvalidAddress {
            address: address.to_string(),
        }
        .into());
    }

    let resolved = lookup_host(address).await.map_err(|e| {
        debug!(server = address, error = %e, "resolution failed");
        DialError::HostUnresolvable {
            host: host.to_string(),
        }
    })?;

    for candidate in resolved {
        match candidate {
            SocketAddr::V4(v4) => return Ok(v4),
            SocketAddr::V6(v6) => {
                if let Some(v4) = v6.ip().to_ipv4_mapped() {
                    return Ok(SocketAddrV4::new(v4, v6.port()));
                }
            }
        }
    }

    Err(ProtocolError::UnsupportedAddress(format!(
        "{address}: {}",
        constants::ERR_NO_ADDRESSES
    )))
}

/// Resolve and bind a socket for `address`.
pub async fn dial(address: &str) -> Result<Target> {
    let remote = resolve(address).await?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|source| DialError::Bind {
            address: address.to_string(),
            source,
        })?;

    Ok(Target {
        address: address.to_string(),
        remote,
        framed: UdpFramed::new(socket, PacketCodec),
    })
}

impl Target {
    async fn send_request(&mut self, kind: PacketType, key: u16, attempts: u8) -> Result<()> {
        let remote = SocketAddr::V4(self.remote);
        for _ in 0..attempts.max(1) {
            self.framed
                .send((Packet::request_all(kind, key), remote))
                .await?;
        }
        Ok(())
    }

    /// Next packet from the target; datagrams from other sources are skipped.
    async fn recv(&mut self) -> Result<Packet> {
        let remote = SocketAddr::V4(self.remote);
        loop {
            match self.framed.next().await {
                Some(Ok((packet, source))) if source == remote => return Ok(packet),
                Some(Ok((_, source))) => {
                    trace!(server = %self.address, %source, "ignoring stray datagram");
                }
                Some(Err(ProtocolError::Io(e))) => return Err(ProtocolError::Io(e)),
                Some(Err(e)) => {
                    debug!(server = %self.address, error = %e, "ignoring undecodable datagram");
                }
                None => {
                    return Err(ProtocolError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "socket closed",
                    )))
                }
            }
        }
    }

    /// Fetch a master's full list, reassembling spanned responses.
    ///
    /// The set is complete on a packet that is not spanned (`total` 0/1 or
    /// `number` 0xFF), or once the terminal packet `number == total` has
    /// arrived along with every packet before it. Packets may arrive in any
    /// order. If the deadline passes after at least one list packet was
    /// merged, the partial directory is returned instead of `TimedOut`.
    pub async fn query_master(mut self, options: &QueryOptions) -> Result<MasterDirectory> {
        let key = rand::random::<u16>();
        let start = Instant::now();
        let deadline = start + options.timeout;
        let skip_loopback = options.skip_loopback_entries;

        self.send_request(PacketType::PingInfoQuery, key, options.send_attempts)
            .await?;

        let mut directory = MasterDirectory::with_address(self.address.clone());
        let mut seen = HashSet::new();
        let mut expected = 0u8;
        let mut last_packet = None;

        let read = with_deadline(deadline, async {
            loop {
                let packet = self.recv().await?;
                if packet.kind != PacketType::MasterServerList {
                    debug!(server = %self.address, kind = %packet.kind, "unexpected packet type");
                    continue;
                }

                directory.merge_packet(&packet, skip_loopback)?;
                last_packet = Some(Instant::now());
                if packet.total <= 1 || packet.number == REQUEST_ALL_PACKETS {
                    return Ok(());
                }

                expected = packet.total;
                if (1..=packet.total).contains(&packet.number) {
                    seen.insert(packet.number);
                }
                if seen.len() >= usize::from(packet.total) {
                    return Ok(());
                }
            }
        })
        .await;

        match (read, last_packet) {
            (Ok(()), Some(at)) => directory.ping = at - start,
            (Err(ProtocolError::TimedOut), Some(at)) => {
                debug!(
                    server = %self.address,
                    received = seen.len(),
                    total = expected,
                    "list incomplete at deadline, keeping partial directory"
                );
                directory.ping = at - start;
            }
            (Ok(()), None) => directory.ping = start.elapsed(),
            (Err(e), _) => return Err(e),
        }
        Ok(directory)
    }

    /// Ask a game server for its status.
    pub async fn query_server(mut self, options: &QueryOptions) -> Result<PingInfo> {
        let key = rand::random::<u16>();
        let start = Instant::now();
        let deadline = start + options.timeout;

        self.send_request(PacketType::PingInfoQuery, key, options.send_attempts)
            .await?;

        let packet = with_deadline(deadline, async {
            loop {
                let packet = self.recv().await?;
                if packet.kind == PacketType::PingInfoResponse {
                    return Ok(packet);
                }
                debug!(server = %self.address, kind = %packet.kind, "unexpected packet type");
            }
        })
        .await?;

        let mut info = PingInfo::from_packet(&packet)?;
        info.address = self.address.clone();
        info.ping = start.elapsed();
        Ok(info)
    }
}
