use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

use crate::core::ping_info::PingInfo;

/// One registered game server, keyed by its "ip:port" string.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub address: SocketAddrV4,
    pub last_seen: Instant,
    pub ttl: Duration,
    /// Last status reported by the verification probe.
    pub info: Option<PingInfo>,
}

impl ServerRecord {
    pub fn new(address: SocketAddrV4, now: Instant, ttl: Duration) -> Self {
        Self {
            address,
            last_seen: now,
            ttl,
            info: None,
        }
    }

    /// Expired once `now - last_seen >= ttl`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= self.ttl
    }

    /// Refresh `last_seen`, returning the time since the previous heartbeat.
    pub fn touch(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_seen);
        self.last_seen = now;
        delta
    }

    pub fn key(&self) -> String {
        self.address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn record(now: Instant) -> ServerRecord {
        ServerRecord::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 29001),
            now,
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_expiry_boundary() {
        let start = Instant::now();
        let rec = record(start);
        assert!(!rec.is_expired(start));
        assert!(!rec.is_expired(start + Duration::from_secs(299)));
        assert!(rec.is_expired(start + Duration::from_secs(300)));
        assert!(rec.is_expired(start + Duration::from_secs(301)));
    }

    #[test]
    fn test_touch_reports_delta() {
        let start = Instant::now();
        let mut rec = record(start);
        let delta = rec.touch(start + Duration::from_secs(42));
        assert_eq!(delta, Duration::from_secs(42));
        assert_eq!(rec.key(), "10.0.0.1:29001");
    }
}
