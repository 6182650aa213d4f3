//! # Master Directory Wire Model
//!
//! A master's list response is a header followed by 7-byte server entries:
//!
//! ```text
//! first packet: [len][common name] [motd block] [count] [entry]*
//! later:        [count] [entry]*
//! motd block:   [len][10-byte filler][motd text][NUL]   or   [0x00][0x00] when empty
//! entry:        [0x06][ipv4 (4)][port (2, LE)]
//! ```
//!
//! The 10-byte filler carries no meaning but clients only show the MOTD when it
//! is not all NULs, so it must round-trip byte-for-byte.

use serde::Serialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::core::packet::{Packet, PacketType};
use crate::core::strings::{lossy, read_pascal_string, write_pascal_string};
use crate::error::{constants, ProtocolError, Result};

/// Length of the MOTD compatibility filler.
pub const MOTD_FILLER_LEN: usize = 10;

/// Filler used when none was received.
pub const DEFAULT_MOTD_FILLER: [u8; MOTD_FILLER_LEN] = *b"0000000000";

/// Longest MOTD that still fits its one-byte length prefix.
pub const MAX_MOTD_LEN: usize = u8::MAX as usize - MOTD_FILLER_LEN;

/// Size of one server entry.
pub const ENTRY_LEN: usize = 7;

/// Pascal-style length tag leading every entry.
pub const ENTRY_TAG: u8 = (ENTRY_LEN - 1) as u8;

/// Name, MOTD and server list of one master, as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct MasterDirectory {
    /// Address this directory was fetched from (client side only).
    pub address: String,
    pub common_name: String,
    pub motd: String,
    #[serde(skip)]
    pub motd_filler: [u8; MOTD_FILLER_LEN],
    pub master_id: u16,
    pub servers: HashMap<String, SocketAddrV4>,
    pub ping: Duration,
}

impl Default for MasterDirectory {
    fn default() -> Self {
        Self {
            address: String::new(),
            common_name: String::new(),
            motd: String::new(),
            motd_filler: DEFAULT_MOTD_FILLER,
            master_id: 0,
            servers: HashMap::new(),
            ping: Duration::ZERO,
        }
    }
}

impl MasterDirectory {
    pub fn new(common_name: impl Into<String>, motd: impl Into<String>, master_id: u16) -> Self {
        Self {
            common_name: common_name.into(),
            motd: motd.into(),
            master_id,
            ..Self::default()
        }
    }

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// MOTD with literal `\n` sequences rendered as spaces.
    pub fn display_motd(&self) -> String {
        self.motd.replace("\\n", " ")
    }

    /// Server addresses sorted by their "ip:port" key.
    pub fn sorted_servers(&self) -> Vec<SocketAddrV4> {
        let mut keys: Vec<(&String, &SocketAddrV4)> = self.servers.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        keys.into_iter().map(|(_, addr)| *addr).collect()
    }

    /// Pascal common name followed by the MOTD block.
    pub fn encode_header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.common_name.len() + self.motd.len() + 14);
        write_pascal_string(&mut out, self.common_name.as_bytes());

        if self.motd.is_empty() {
            out.extend_from_slice(&[0x00, 0x00]);
            return out;
        }

        let motd = &self.motd.as_bytes()[..self.motd.len().min(MAX_MOTD_LEN)];
        out.push((motd.len() + MOTD_FILLER_LEN) as u8);
        out.extend_from_slice(&self.motd_filler);
        out.extend_from_slice(motd);
        out.push(0x00);
        out
    }

    /// Merge one list packet into this directory, returning the number of
    /// entries added.
    ///
    /// Only packet number 1 carries the name and MOTD. Bytes missing from the
    /// end of the payload were stripped NULs and read back as zeros.
    pub fn merge_packet(&mut self, packet: &Packet, skip_loopback: bool) -> Result<usize> {
        if packet.kind != PacketType::MasterServerList {
            return Err(ProtocolError::MalformedPacket(format!(
                "{}: got {}",
                constants::ERR_NOT_A_LIST,
                packet.kind
            )));
        }

        self.master_id = packet.id;
        let mut data = packet.data.as_slice();
        if data.len() <= 2 && packet.number <= 1 {
            return Ok(0);
        }

        if packet.number <= 1 {
            let (name, rest) = read_pascal_string(data);
            self.common_name = lossy(&name).replace("\\n", "");

            let (motd, rest) = read_pascal_string(rest);
            if motd.len() >= MOTD_FILLER_LEN {
                self.motd_filler.copy_from_slice(&motd[..MOTD_FILLER_LEN]);
                self.motd = lossy(&motd[MOTD_FILLER_LEN..]);
            } else {
                self.motd = lossy(&motd);
            }

            // NUL separator between the header and the entry list
            data = rest.get(1..).unwrap_or_default();
        }

        let Some((&count, entries)) = data.split_first() else {
            return Ok(0);
        };

        let mut added = 0;
        for index in 0..usize::from(count) {
            let mut entry = [0u8; ENTRY_LEN];
            let start = index * ENTRY_LEN;
            if let Some(available) = entries.get(start..) {
                let n = available.len().min(ENTRY_LEN);
                entry[..n].copy_from_slice(&available[..n]);
            }

            let ip = Ipv4Addr::new(entry[1], entry[2], entry[3], entry[4]);
            let port = u16::from_le_bytes([entry[5], entry[6]]);
            if ip.is_unspecified() || port == 0 || (skip_loopback && ip.is_loopback()) {
                continue;
            }

            let address = SocketAddrV4::new(ip, port);
            if self.servers.insert(address.to_string(), address).is_none() {
                added += 1;
            }
        }

        Ok(added)
    }
}

/// Entry block: count byte followed by 7-byte entries.
pub fn encode_entries(entries: &[SocketAddrV4]) -> Vec<u8> {
    let count = entries.len().min(usize::from(u8::MAX));
    let mut out = Vec::with_capacity(1 + count * ENTRY_LEN);
    out.push(count as u8);
    for address in &entries[..count] {
        out.push(ENTRY_TAG);
        out.extend_from_slice(&address.ip().octets());
        out.extend_from_slice(&address.port().to_le_bytes());
    }
    out
}
