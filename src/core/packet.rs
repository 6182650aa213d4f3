//! # Datagram Envelope
//!
//! Every Darkstar datagram starts with the same 8-byte header:
//!
//! ```text
//! [version(1)] [type(1)] [number(1)] [total(1)] [key(2, BE)] [id(2, BE)] [data(N)]
//! ```
//!
//! `number`/`total` describe spanning: `number` is 1-based within a set, `total`
//! is the size of the set and 0 means "not spanned". A query sets `number` to
//! [`REQUEST_ALL_PACKETS`] to ask for everything.

use std::fmt;

use crate::error::{constants, ProtocolError, Result};

/// Primary protocol version byte.
pub const VERSION: u8 = 0x10;

/// Legacy/extended version byte, accepted on receive.
pub const VERSION_EXT: u8 = 0x69;

/// Standard MTU-sized datagram limit.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Size of the fixed envelope.
pub const HEADER_SIZE: usize = 8;

/// Largest payload that fits a single datagram.
pub const MAX_DATA_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// `number` sentinel: request (or mark) every packet of a set.
pub const REQUEST_ALL_PACKETS: u8 = 0xFF;

/// Numeric value of the first packet type.
pub const PACKET_TYPE_BASE: u8 = 0x03;

/// The six packet kinds, contiguous from [`PACKET_TYPE_BASE`].
///
/// Tags outside that range decode to `Other` so they can be logged and dropped
/// without failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    PingInfoQuery,
    PingInfoResponse,
    MasterServerHeartbeat,
    MasterServerList,
    GameInfoQuery,
    GameInfoResponse,
    Other(u8),
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::PingInfoQuery => PACKET_TYPE_BASE,
            PacketType::PingInfoResponse => PACKET_TYPE_BASE + 1,
            PacketType::MasterServerHeartbeat => PACKET_TYPE_BASE + 2,
            PacketType::MasterServerList => PACKET_TYPE_BASE + 3,
            PacketType::GameInfoQuery => PACKET_TYPE_BASE + 4,
            PacketType::GameInfoResponse => PACKET_TYPE_BASE + 5,
            PacketType::Other(tag) => tag,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::PingInfoQuery => "PingInfoQuery",
            PacketType::PingInfoResponse => "PingInfoResponse",
            PacketType::MasterServerHeartbeat => "MasterServerHeartbeat",
            PacketType::MasterServerList => "MasterServerList",
            PacketType::GameInfoQuery => "GameInfoQuery",
            PacketType::GameInfoResponse => "GameInfoResponse",
            PacketType::Other(_) => "Unknown",
        }
    }
}

impl From<u8> for PacketType {
    fn from(tag: u8) -> Self {
        match tag.wrapping_sub(PACKET_TYPE_BASE) {
            0 => PacketType::PingInfoQuery,
            1 => PacketType::PingInfoResponse,
            2 => PacketType::MasterServerHeartbeat,
            3 => PacketType::MasterServerList,
            4 => PacketType::GameInfoQuery,
            5 => PacketType::GameInfoResponse,
            _ => PacketType::Other(tag),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(kind: PacketType) -> Self {
        kind.as_u8()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Other(tag) => write!(f, "Unknown({tag:#04x})"),
            known => f.write_str(known.name()),
        }
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub kind: PacketType,
    /// Packet number out of `total`; starts at 1.
    pub number: u8,
    pub total: u8,
    /// Transaction / verification token.
    pub key: u16,
    /// Sender-assigned identifier; ping responses pack two bytes in here.
    pub id: u16,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketType) -> Self {
        Self {
            version: VERSION,
            kind,
            number: 0,
            total: 0,
            key: 0,
            id: 0,
            data: Vec::new(),
        }
    }

    /// A query asking the peer for every packet it has, tagged with `key`.
    pub fn request_all(kind: PacketType, key: u16) -> Self {
        Self {
            number: REQUEST_ALL_PACKETS,
            key,
            ..Self::new(kind)
        }
    }

    /// Decode a raw datagram.
    ///
    /// Trailing NUL padding is stripped first (receive buffers are reused and
    /// over-sized), then the header is zero-padded back up to 8 bytes if needed.
    /// The resulting `data` is everything after the header.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(ProtocolError::EmptyPacket);
        }

        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let trimmed = &raw[..end];

        let mut header = [0u8; HEADER_SIZE];
        let header_len = trimmed.len().min(HEADER_SIZE);
        header[..header_len].copy_from_slice(&trimmed[..header_len]);

        let version = header[0];
        if version != VERSION && version != VERSION_EXT {
            return Err(ProtocolError::UnknownVersion(version));
        }

        Ok(Self {
            version,
            kind: PacketType::from(header[1]),
            number: header[2],
            total: header[3],
            key: u16::from_be_bytes([header[4], header[5]]),
            id: u16::from_be_bytes([header[6], header[7]]),
            data: trimmed.get(HEADER_SIZE..).unwrap_or_default().to_vec(),
        })
    }

    /// Encode header and payload. No padding is added.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Append the encoded datagram to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.kind.as_u8());
        out.push(self.number);
        out.push(self.total);
        out.extend_from_slice(&self.key.to_be_bytes());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.data);
    }

    /// Encode, refusing anything larger than one datagram.
    pub fn try_encode(&self) -> Result<Vec<u8>> {
        if self.encoded_len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_OVERSIZED_PACKET.to_string(),
            ));
        }
        Ok(self.encode())
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// A response set is complete on its last packet, on the 0xFF marker,
    /// or when it was never spanned.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.number == self.total || self.number == REQUEST_ALL_PACKETS || self.total == 0
    }

    #[inline]
    pub fn is_spanned(&self) -> bool {
        self.total > 1
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.encode() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
