//! Observability and Metrics
//!
//! Counters for the master directory engine. Each engine owns its own
//! [`Metrics`]; the maintenance task logs a snapshot with every sweep.
//!
//! Uses atomic counters so the receive loop, verification tasks and the
//! sweep can all record without taking the directory lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Counters for datagram handling and directory maintenance
#[derive(Debug)]
pub struct Metrics {
    /// Datagrams accepted by the receive loop
    pub datagrams_received: AtomicU64,
    /// Bytes accepted by the receive loop
    pub bytes_received: AtomicU64,
    /// Exact repeats discarded before decoding
    pub duplicates_dropped: AtomicU64,
    /// Datagrams that failed to decode
    pub malformed_packets: AtomicU64,
    /// Unsolicited or unsupported datagrams
    pub unsolicited_packets: AtomicU64,
    /// Heartbeats that started a verification
    pub heartbeats: AtomicU64,
    /// Heartbeats and queries from banned networks
    pub banned_requests: AtomicU64,
    /// New servers added to the directory
    pub registrations: AtomicU64,
    /// Registrations refused by the per-IP quota
    pub rejections: AtomicU64,
    /// Verification probes that failed or timed out
    pub verification_failures: AtomicU64,
    /// Server lists sent
    pub lists_sent: AtomicU64,
    /// Ban responses sent
    pub bans_sent: AtomicU64,
    /// Servers removed by the sweep
    pub servers_expired: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            malformed_packets: AtomicU64::new(0),
            unsolicited_packets: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            banned_requests: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            verification_failures: AtomicU64::new(0),
            lists_sent: AtomicU64::new(0),
            bans_sent: AtomicU64::new(0),
            servers_expired: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_packet(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unsolicited_packet(&self) {
        self.unsolicited_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn banned_request(&self) {
        self.banned_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn verification_failed(&self) {
        self.verification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn list_sent(&self) {
        self.lists_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ban_sent(&self) {
        self.bans_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn servers_expired(&self, count: u64) {
        self.servers_expired.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            unsolicited_packets: self.unsolicited_packets.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            banned_requests: self.banned_requests.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            lists_sent: self.lists_sent.load(Ordering::Relaxed),
            bans_sent: self.bans_sent.load(Ordering::Relaxed),
            servers_expired: self.servers_expired.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            component = "maintenance",
            datagrams_received = snapshot.datagrams_received,
            bytes_received = snapshot.bytes_received,
            duplicates_dropped = snapshot.duplicates_dropped,
            malformed_packets = snapshot.malformed_packets,
            unsolicited_packets = snapshot.unsolicited_packets,
            heartbeats = snapshot.heartbeats,
            banned_requests = snapshot.banned_requests,
            registrations = snapshot.registrations,
            rejections = snapshot.rejections,
            verification_failures = snapshot.verification_failures,
            lists_sent = snapshot.lists_sent,
            bans_sent = snapshot.bans_sent,
            servers_expired = snapshot.servers_expired,
            uptime_seconds = snapshot.uptime_seconds,
            "Directory metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub duplicates_dropped: u64,
    pub malformed_packets: u64,
    pub unsolicited_packets: u64,
    pub heartbeats: u64,
    pub banned_requests: u64,
    pub registrations: u64,
    pub rejections: u64,
    pub verification_failures: u64,
    pub lists_sent: u64,
    pub bans_sent: u64,
    pub servers_expired: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
