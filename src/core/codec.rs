//! Datagram codec for `tokio_util::udp::UdpFramed`.
//!
//! UDP has no stream framing: each read hands the decoder exactly one datagram,
//! so the decoder always consumes the whole buffer, even when the datagram
//! turns out to be undecodable.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{Packet, MAX_PACKET_SIZE};
use crate::error::{constants, ProtocolError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split_to(src.len());
        Packet::decode(&datagram).map(Some)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let len = item.encoded_len();
        if len > MAX_PACKET_SIZE {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_OVERSIZED_PACKET.to_string(),
            ));
        }

        dst.reserve(len);
        dst.put_u8(item.version);
        dst.put_u8(item.kind.as_u8());
        dst.put_u8(item.number);
        dst.put_u8(item.total);
        dst.put_u16(item.key);
        dst.put_u16(item.id);
        dst.extend_from_slice(&item.data);
        Ok(())
    }
}
