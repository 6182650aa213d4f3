//! Master directory state machine: heartbeats, quotas, expiry, bans and NAT

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use darkstar_query::config::MasterConfig;
use darkstar_query::core::packet::{Packet, PacketType};
use darkstar_query::core::ping_info::PingInfo;
use darkstar_query::error::ProtocolError;
use darkstar_query::master::{Action, MasterDirectoryEngine};
use darkstar_query::registry::MasterDirectory;
use darkstar_query::utils::duplicate::DuplicateGuard;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

fn engine_with<F: FnOnce(&mut MasterConfig)>(mutator: F) -> MasterDirectoryEngine {
    let config = MasterConfig::default_with_overrides(mutator);
    config.validate_strict().expect("valid config");
    MasterDirectoryEngine::new(&config).expect("engine")
}

fn addr(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port)
}

fn ping_response(players: u8, max: u8, name: &str) -> Packet {
    let mut data = b"es3a\x02V 001.004r".to_vec();
    data.extend_from_slice(name.as_bytes());
    Packet {
        total: 1,
        id: u16::from_be_bytes([max, players]),
        data,
        ..Packet::new(PacketType::PingInfoResponse)
    }
}

fn listed(engine: &MasterDirectoryEngine, requester: Ipv4Addr, interface: Option<Ipv4Addr>) -> MasterDirectory {
    let packets = engine
        .list_packets(1, IpAddr::V4(requester), interface)
        .expect("list");
    let mut dir = MasterDirectory::default();
    for packet in &packets {
        dir.merge_packet(packet, false).expect("merge");
    }
    dir
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[test]
fn test_per_ip_quota() {
    let engine = engine_with(|c| c.directory.servers_per_ip = 2);
    let now = Instant::now();

    assert!(engine.register(addr(10, 0, 0, 1, 29001), None, now).expect("first").is_new);
    assert_eq!(
        engine.register(addr(10, 0, 0, 1, 29002), None, now).expect("second").count,
        2
    );

    match engine.register(addr(10, 0, 0, 1, 29003), None, now) {
        Err(ProtocolError::RegistrationRejected { count, limit, .. }) => {
            assert_eq!((count, limit), (2, 2));
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    // refreshing an existing port is not a new registration
    let refresh = engine
        .register(addr(10, 0, 0, 1, 29001), None, now + Duration::from_secs(5))
        .expect("refresh");
    assert!(!refresh.is_new);
    assert_eq!(refresh.delta, Duration::from_secs(5));

    // other addresses have their own quota
    engine.register(addr(10, 0, 0, 2, 29003), None, now).expect("other ip");
    assert_eq!(engine.server_count().unwrap(), 3);
    assert_eq!(engine.metrics().snapshot().rejections, 1);
}

#[test]
fn test_ttl_boundary() {
    let engine = engine_with(|c| {
        c.directory.servers_per_ip = 1;
        c.directory.server_ttl = Duration::from_secs(300);
    });
    let start = Instant::now();
    let server = addr(10, 0, 0, 1, 29001);
    engine.register(server, None, start).expect("register");

    assert_eq!(engine.sweep(start + Duration::from_secs(299)).unwrap(), 0);
    assert_eq!(engine.servers().unwrap(), vec![server]);

    assert_eq!(engine.sweep(start + Duration::from_secs(300)).unwrap(), 1);
    assert!(engine.servers().unwrap().is_empty());

    // the expired slot is free again
    let later = start + Duration::from_secs(301);
    assert!(engine.register(addr(10, 0, 0, 1, 29002), None, later).is_ok());
    assert_eq!(engine.metrics().snapshot().servers_expired, 1);
}

#[test]
fn test_heartbeat_then_verified() {
    let engine = engine_with(|_| {});
    let now = Instant::now();
    let server = addr(10, 0, 0, 1, 29001);
    let heartbeat = Packet::request_all(PacketType::MasterServerHeartbeat, 0).encode();

    assert_eq!(
        engine.handle_datagram(&heartbeat, SocketAddr::V4(server), None, now),
        Action::Verify(server)
    );

    let mut info = PingInfo::from_packet(&ping_response(3, 16, "Arena")).expect("info");
    info.address = server.to_string();
    let registration = engine
        .complete_verification(server, Ok(info), now)
        .expect("registered");
    assert!(registration.is_new);
    assert_eq!(engine.pending_count().unwrap(), 0);

    let stored = engine.server_info(server).unwrap().expect("status kept");
    assert_eq!(stored.name, "Arena");
    assert_eq!((stored.player_count, stored.max_players), (3, 16));
}

#[test]
fn test_status_response_on_listen_socket_counts_as_verification() {
    let engine = engine_with(|_| {});
    let now = Instant::now();
    let server = addr(10, 0, 0, 7, 29001);
    let heartbeat = Packet::request_all(PacketType::MasterServerHeartbeat, 0).encode();
    engine.handle_datagram(&heartbeat, SocketAddr::V4(server), None, now);

    let response = ping_response(0, 32, "Direct").encode();
    assert_eq!(
        engine.handle_datagram(&response, SocketAddr::V4(server), None, now),
        Action::Drop
    );
    assert_eq!(engine.servers().unwrap(), vec![server]);
}

#[test]
fn test_registered_servers_are_listed_sorted() {
    let engine = engine_with(|_| {});
    let now = Instant::now();
    for server in [
        addr(10, 0, 0, 2, 29001),
        addr(10, 0, 0, 10, 29001),
        addr(10, 0, 0, 1, 29001),
    ] {
        engine.register(server, None, now).expect("register");
    }

    let keys: Vec<String> = engine.servers().unwrap().iter().map(|a| a.to_string()).collect();
    assert_eq!(keys, ["10.0.0.1:29001", "10.0.0.10:29001", "10.0.0.2:29001"]);

    let query = Packet::request_all(PacketType::PingInfoQuery, 0x0707).encode();
    match engine.handle_datagram(&query, "10.9.9.9:5000".parse().unwrap(), None, now) {
        Action::Reply { packets, banned } => {
            assert!(!banned);
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].key, 0x0707);
            assert_eq!(packets[0].id, 99);
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// BANS
// ============================================================================

#[test]
fn test_banned_sources() {
    let engine = engine_with(|c| {
        c.bans.banned_networks = vec!["224.0.0.0/4".into(), "198.18.0.0/15".into()];
        c.bans.banned_message = "go away".into();
    });
    let now = Instant::now();
    let banned: SocketAddr = "198.19.4.4:29001".parse().unwrap();
    engine.register(addr(10, 0, 0, 1, 29001), None, now).expect("register");

    let heartbeat = Packet::request_all(PacketType::MasterServerHeartbeat, 0).encode();
    assert_eq!(engine.handle_datagram(&heartbeat, banned, None, now), Action::Drop);

    let query = Packet::request_all(PacketType::PingInfoQuery, 5).encode();
    let Action::Reply { packets, banned: true } = engine.handle_datagram(&query, banned, None, now) else {
        panic!("banned query should get the ban message");
    };
    let mut dir = MasterDirectory::default();
    dir.merge_packet(&packets[0], false).expect("merge");
    assert_eq!(dir.motd, "go away");
    assert!(dir.servers.is_empty());
    assert_eq!(engine.metrics().snapshot().banned_requests, 2);
}

// ============================================================================
// NAT
// ============================================================================

#[test]
fn test_no_rewrite_without_local_networks() {
    let engine = engine_with(|c| c.nat.external_ip = Some(Ipv4Addr::new(198, 51, 100, 9)));
    engine
        .register(addr(192, 168, 1, 5, 29001), None, Instant::now())
        .expect("register");
    assert!(!engine.is_rewriting());

    let dir = listed(&engine, Ipv4Addr::new(8, 8, 8, 8), None);
    assert!(dir.servers.contains_key("192.168.1.5:29001"));
}

#[test]
fn test_rewrite_for_public_and_private_requesters() {
    let external = Ipv4Addr::new(198, 51, 100, 9);
    let engine = engine_with(|c| {
        c.nat.external_ip = Some(external);
        c.nat.local_networks = vec!["192.168.0.0/16".into()];
    });
    let now = Instant::now();
    engine.register(addr(192, 168, 1, 5, 29001), None, now).expect("lan");
    engine.register(addr(127, 0, 0, 1, 29002), None, now).expect("loopback");
    assert!(engine.is_rewriting());

    let public = listed(&engine, Ipv4Addr::new(8, 8, 8, 8), None);
    assert!(public.servers.contains_key("198.51.100.9:29001"));
    assert!(public.servers.contains_key("127.0.0.1:29002"));

    let interface = Ipv4Addr::new(192, 168, 1, 2);
    let private = listed(&engine, Ipv4Addr::new(192, 168, 1, 20), Some(interface));
    assert!(private.servers.contains_key("192.168.1.5:29001"));
    assert!(private.servers.contains_key("192.168.1.2:29002"));
}

// ============================================================================
// DUPLICATES
// ============================================================================

#[test]
fn test_duplicate_guard_drops_one_repeat() {
    let mut guard = DuplicateGuard::new();
    let a: SocketAddr = "10.0.0.1:29001".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:29001".parse().unwrap();
    let heartbeat = Packet::request_all(PacketType::MasterServerHeartbeat, 0).encode();

    assert!(!guard.is_duplicate(a, &heartbeat));
    assert!(guard.is_duplicate(a, &heartbeat));
    assert!(!guard.is_duplicate(a, &heartbeat));
    assert!(!guard.is_duplicate(b, &heartbeat));
    assert!(!guard.is_duplicate(a, &heartbeat));
}
