//! # Core Protocol Components
//!
//! Low-level datagram handling for the Darkstar discovery protocol.
//!
//! ## Components
//! - **Packet**: the fixed 8-byte envelope and the six packet kinds
//! - **Codec**: `tokio_util` datagram codec for `UdpFramed`
//! - **PingInfo**: game-server status payload and its status bitmask
//! - **Strings**: pascal/C string helpers shared by payload parsers
//!
//! ## Wire Format
//! ```text
//! [Version(1)] [Type(1)] [Number(1)] [Total(1)] [Key(2, BE)] [Id(2, BE)] [Data(N)]
//! ```
//!
//! ## Limits
//! - Maximum datagram size: 1500 bytes, maximum payload: 1492 bytes
//! - Two version bytes are accepted on receive: 0x10 and 0x69

pub mod codec;
pub mod packet;
pub mod ping_info;
pub mod status;
pub mod strings;
