//! # Error Types
//!
//! Error handling for the Darkstar discovery protocol.
//!
//! This module defines every failure that can surface from decoding datagrams,
//! dialing masters and game servers, and maintaining the master directory.
//!
//! ## Error Categories
//! - **Decode Errors**: unknown version byte, empty datagram, malformed payload
//! - **Network Errors**: dial/resolution failures, socket I/O, timeouts
//! - **Directory Errors**: per-IP registration cap exceeded, unsupported peers
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Decode errors on the master's receive path are logged and the datagram is
//! dropped; client-side errors are collected per target alongside successes.
//!
//! ## Example Usage
//! ```rust
//! use darkstar_query::core::packet::Packet;
//! use darkstar_query::error::ProtocolError;
//!
//! match Packet::decode(&[0x42, 0x03]) {
//!     Err(ProtocolError::UnknownVersion(v)) => assert_eq!(v, 0x42),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    pub const ERR_SHORT_PING_INFO: &str = "ping response payload shorter than 15 bytes";
    pub const ERR_OVERSIZED_PACKET: &str = "packet exceeds maximum datagram size";
    pub const ERR_NOT_A_LIST: &str = "packet is not a master server list";
    pub const ERR_NOT_A_PING_RESPONSE: &str = "packet is not a ping info response";
    pub const ERR_NO_ADDRESSES: &str = "address resolved to no IPv4 endpoints";
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown packet version: {0:#04x}")]
    UnknownVersion(u8),

    #[error("Empty packet received")]
    EmptyPacket,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Dial error: {0}")]
    Dial(#[from] DialError),

    #[error("Connection timed out")]
    TimedOut,

    #[error("Rejecting additional server {address} - count: {count}/{limit}")]
    RegistrationRejected {
        address: String,
        count: u16,
        limit: u16,
    },

    #[error("Unsupported address: {0}")]
    UnsupportedAddress(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,

    #[error("Probe task failed: {0}")]
    TaskFailed(String),
}

/// Failures that happen before a probe is dispatched.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("{host}: no such host")]
    HostUnresolvable { host: String },

    #[error("{address}: invalid address")]
    InvalidAddress { address: String },

    #[error("{address}: unable to open socket: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

impl ProtocolError {
    /// True for deadline expiries, never for generic I/O failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::TimedOut)
    }

    /// True for DNS resolution failures at dial time.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, ProtocolError::Dial(DialError::HostUnresolvable { .. }))
    }
}

/// A failure attributed to one queried address.
#[derive(Error, Debug)]
#[error("[{address}]: {error}")]
pub struct TargetError {
    pub address: String,
    #[source]
    pub error: ProtocolError,
}

impl TargetError {
    pub fn new(address: impl Into<String>, error: ProtocolError) -> Self {
        Self {
            address: address.into(),
            error,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_io() {
        let io_err = ProtocolError::Io(io::Error::new(io::ErrorKind::TimedOut, "read"));
        assert!(!io_err.is_timeout());
        assert!(ProtocolError::TimedOut.is_timeout());
    }

    #[test]
    fn test_unresolvable_subtype() {
        let err: ProtocolError = DialError::HostUnresolvable {
            host: "nowhere.invalid".to_string(),
        }
        .into();
        assert!(err.is_unresolvable());
        assert_eq!(err.to_string(), "Dial error: nowhere.invalid: no such host");
    }

    #[test]
    fn test_target_error_display() {
        let err = TargetError::new("10.0.0.1:29001", ProtocolError::TimedOut);
        assert_eq!(err.to_string(), "[10.0.0.1:29001]: Connection timed out");
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "Connection timed out");
    }
}
