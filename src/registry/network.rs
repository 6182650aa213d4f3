//! IPv4 network ranges, the ban list, and NAT-aware address substitution.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// An IPv4 CIDR range such as `224.0.0.0/4`. A bare address parses as `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(ProtocolError::ConfigError(format!(
                "invalid prefix length /{prefix}"
            )));
        }
        let network = Ipv4Addr::from(u32::from(address) & Self::mask(prefix));
        Ok(Self { network, prefix })
    }

    #[inline]
    fn mask(prefix: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    #[inline]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// IPv6 addresses are never inside an IPv4 range, except v4-mapped ones.
    pub fn contains_ip(&self, address: IpAddr) -> bool {
        match address {
            IpAddr::V4(v4) => self.contains(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| self.contains(v4)),
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProtocolError::ConfigError(format!("invalid CIDR '{s}'"));
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), 32),
        };
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        Self::new(addr, prefix).map_err(|_| invalid())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Parse a list of CIDR strings, failing on the first bad entry.
pub fn parse_networks<S: AsRef<str>>(input: &[S]) -> Result<Vec<Ipv4Cidr>> {
    input.iter().map(|s| s.as_ref().parse()).collect()
}

/// Source ranges whose heartbeats are dropped and whose list queries get the
/// ban directory instead of the live one.
#[derive(Debug, Clone, Default)]
pub struct BannedNetworkList {
    networks: Vec<Ipv4Cidr>,
}

impl BannedNetworkList {
    pub fn new(networks: Vec<Ipv4Cidr>) -> Self {
        Self { networks }
    }

    pub fn is_banned(&self, address: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains_ip(address))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// Rewrites listed server addresses so a master behind NAT hands out
/// reachable addresses.
///
/// Disabled (identity) unless local networks are configured; the external
/// address rule additionally needs `external_ip`.
#[derive(Debug, Clone, Default)]
pub struct AddressRewriter {
    external_ip: Option<Ipv4Addr>,
    local_networks: Vec<Ipv4Cidr>,
}

impl AddressRewriter {
    pub fn new(external_ip: Option<Ipv4Addr>, local_networks: Vec<Ipv4Cidr>) -> Self {
        Self {
            external_ip,
            local_networks,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.local_networks.is_empty()
    }

    fn is_local(&self, address: IpAddr) -> bool {
        self.local_networks.iter().any(|net| net.contains_ip(address))
    }

    /// Address to advertise for `entry` when answering `requester`.
    ///
    /// `interface` is the local address the request arrived on.
    pub fn rewrite(
        &self,
        entry: Ipv4Addr,
        requester: IpAddr,
        interface: Option<Ipv4Addr>,
    ) -> Ipv4Addr {
        if !self.is_enabled() {
            return entry;
        }

        let requester_private = is_private(requester);
        if requester_private {
            return match interface {
                Some(local) if entry.is_loopback() => local,
                _ => entry,
            };
        }

        match self.external_ip {
            Some(external)
                if !requester.is_loopback()
                    && !self.is_local(requester)
                    && self.local_networks.iter().any(|net| net.contains(entry)) =>
            {
                external
            }
            _ => entry,
        }
    }
}

/// RFC 1918 check that also understands v4-mapped IPv6 peers.
pub fn is_private(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| v4.is_private()),
    }
}
