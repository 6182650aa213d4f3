//! Game-server status payload (PingInfoResponse).
//!
//! ```text
//! header: total = game mode, id = [max players (hi)] [player count (lo)]
//! data:   [game name(4)] [status(1)] [game version(10)] [display name .. NUL]
//! ```

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::core::packet::{Packet, PacketType};
use crate::core::status::StatusByte;
use crate::core::strings::{c_len, lossy};
use crate::error::{constants, ProtocolError, Result};

const GAME_NAME_LEN: usize = 4;
const GAME_VERSION_LEN: usize = 10;
const FIXED_LEN: usize = GAME_NAME_LEN + 1 + GAME_VERSION_LEN;

/// Live status reported by one game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingInfo {
    pub game_mode: u8,
    pub player_count: u8,
    pub max_players: u8,
    pub status: StatusByte,
    /// 4-byte game tag, e.g. `es3a`.
    pub game_name: String,
    /// 10-byte version tag, e.g. `V 001.000r`.
    pub game_version: String,
    pub name: String,
    pub address: String,
    pub ping: Duration,
}

impl PingInfo {
    /// Parse a ping response. `address` and `ping` are left for the caller.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.kind != PacketType::PingInfoResponse {
            return Err(ProtocolError::MalformedPacket(format!(
                "{}: got {}",
                constants::ERR_NOT_A_PING_RESPONSE,
                packet.kind
            )));
        }

        let data = &packet.data;
        if data.len() < FIXED_LEN {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_SHORT_PING_INFO.to_string(),
            ));
        }

        let (game_name, rest) = data.split_at(GAME_NAME_LEN);
        let (status, rest) = rest.split_at(1);
        let (game_version, rest) = rest.split_at(GAME_VERSION_LEN);
        let [max_players, player_count] = packet.id.to_be_bytes();

        Ok(Self {
            game_mode: packet.total,
            player_count,
            max_players,
            status: StatusByte(status[0]),
            game_name: lossy(game_name),
            game_version: lossy(game_version),
            name: lossy(&rest[..c_len(rest)]),
            address: String::new(),
            ping: Duration::ZERO,
        })
    }
}

impl fmt::Display for PingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PingInfoResponse: {} [{:?}] ({}) Players: {}/{} @ {}",
            self.name, self.ping, self.status, self.player_count, self.max_players, self.address
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const CAPTURE: [u8; 39] = [
        0x10, 0x04, 0xFF, 0xFD, 0x00, 0x00, 0x40, 0x00, 0x65, 0x73, 0x33, 0x61, 0x06, 0x56, 0x20,
        0x30, 0x30, 0x31, 0x2E, 0x30, 0x30, 0x30, 0x72, 0x44, 0x4F, 0x56, 0x3A, 0x20, 0x43, 0x69,
        0x74, 0x79, 0x20, 0x4F, 0x6E, 0x20, 0x54, 0x68, 0x65,
    ];

    #[test]
    fn test_parse_capture() {
        let packet = Packet::decode(&CAPTURE).expect("decode");
        let info = PingInfo::from_packet(&packet).expect("ping info");

        assert_eq!(info.game_mode, 0xFD);
        assert_eq!(info.game_name, "es3a");
        assert_eq!(info.game_version, "V 001.000r");
        assert_eq!(info.status, StatusByte(0x06));
        assert_eq!(info.player_count, 0x00);
        assert_eq!(info.max_players, 0x40);
        assert_eq!(info.name, "DOV: City On The");
    }

    #[test]
    fn test_name_stops_at_nul() {
        let mut packet = Packet::new(PacketType::PingInfoResponse);
        packet.id = 0x1003;
        packet.data = b"es3a\x02V 001.000rArena\0junk".to_vec();

        let info = PingInfo::from_packet(&packet).expect("ping info");
        assert_eq!(info.name, "Arena");
        assert_eq!(info.player_count, 3);
        assert_eq!(info.max_players, 16);
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let mut packet = Packet::new(PacketType::PingInfoResponse);
        packet.data = b"es3a\x02V 0".to_vec();
        assert!(matches!(
            PingInfo::from_packet(&packet),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let packet = Packet::new(PacketType::MasterServerList);
        assert!(PingInfo::from_packet(&packet).is_err());
    }
}
