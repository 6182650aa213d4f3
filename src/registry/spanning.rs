//! Splitting a directory listing across several datagrams.
//!
//! Budgets are computed against `max_packet_size`, not the 1500 byte datagram
//! limit, so operators can keep responses small enough for old clients.

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::warn;

use crate::core::packet::{Packet, PacketType, HEADER_SIZE};
use crate::registry::directory::{encode_entries, MasterDirectory, ENTRY_LEN};

/// Count byte plus the one byte of slack every list packet reserves.
const LIST_OVERHEAD: usize = HEADER_SIZE + 2;

/// Largest set a `u8` total can describe.
pub const MAX_PACKETS_PER_RESPONSE: usize = u8::MAX as usize;

/// How many entries go where for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanPlan {
    /// Entries that fit next to the header in packet 1.
    pub first_capacity: usize,
    /// Entries that fit in each later packet.
    pub overflow_capacity: usize,
    /// Number of packets in the set (1 when not spanned).
    pub packets: usize,
    /// Entries actually sent; less than requested only when the set would
    /// exceed [`MAX_PACKETS_PER_RESPONSE`].
    pub entries: usize,
}

impl SpanPlan {
    pub fn new(header_len: usize, entries: usize, max_packet_size: usize) -> Self {
        let first_capacity = max_packet_size.saturating_sub(header_len + LIST_OVERHEAD) / ENTRY_LEN;
        let overflow_capacity = (max_packet_size.saturating_sub(LIST_OVERHEAD) / ENTRY_LEN)
            .clamp(1, usize::from(u8::MAX));

        if entries <= first_capacity {
            return Self {
                first_capacity,
                overflow_capacity,
                packets: 1,
                entries,
            };
        }

        let packets = (entries - first_capacity).div_ceil(overflow_capacity) + 1;
        if packets <= MAX_PACKETS_PER_RESPONSE {
            return Self {
                first_capacity,
                overflow_capacity,
                packets,
                entries,
            };
        }

        Self {
            first_capacity,
            overflow_capacity,
            packets: MAX_PACKETS_PER_RESPONSE,
            entries: first_capacity + (MAX_PACKETS_PER_RESPONSE - 1) * overflow_capacity,
        }
    }

    #[inline]
    pub fn is_spanned(&self) -> bool {
        self.packets > 1
    }
}

impl MasterDirectory {
    /// Build the list response for `entries`, which must already be sorted by
    /// their "ip:port" key.
    ///
    /// Every entry address is passed through `rewrite` before encoding. The
    /// header only rides in the first packet; `number` counts from 1 and
    /// `total` is the size of the set.
    pub fn generate_packets<F>(
        &self,
        entries: &[SocketAddrV4],
        key: u16,
        max_packet_size: usize,
        mut rewrite: F,
    ) -> Vec<Packet>
    where
        F: FnMut(Ipv4Addr) -> Ipv4Addr,
    {
        let header = self.encode_header();
        let plan = SpanPlan::new(header.len(), entries.len(), max_packet_size);
        if plan.entries < entries.len() {
            warn!(
                component = "server",
                listed = plan.entries,
                registered = entries.len(),
                "directory listing truncated to {} packets",
                MAX_PACKETS_PER_RESPONSE
            );
        }

        let rewritten: Vec<SocketAddrV4> = entries[..plan.entries]
            .iter()
            .map(|addr| SocketAddrV4::new(rewrite(*addr.ip()), addr.port()))
            .collect();

        let first_len = rewritten.len().min(plan.first_capacity);
        let (first, rest) = rewritten.split_at(first_len);
        let total = plan.packets as u8;

        let mut data = header;
        data.extend(encode_entries(first));
        let mut packets = Vec::with_capacity(plan.packets);
        packets.push(self.list_packet(1, total, key, data));

        for (index, chunk) in rest.chunks(plan.overflow_capacity).enumerate() {
            packets.push(self.list_packet(index as u8 + 2, total, key, encode_entries(chunk)));
        }

        packets
    }

    fn list_packet(&self, number: u8, total: u8, key: u16, data: Vec<u8>) -> Packet {
        Packet {
            number,
            total,
            key,
            id: self.master_id,
            data,
            ..Packet::new(PacketType::MasterServerList)
        }
    }
}
