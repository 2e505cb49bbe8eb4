//! TDS 5.0 packet codec for tokio-util framing.

use bytes::{BufMut, BytesMut};
use tds5_protocol::packet::{
    MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A TDS packet with header and payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Packet payload, excluding the header.
    pub payload: BytesMut,
}

impl Packet {
    /// Create a packet.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// A header-only packet, e.g. an attention request.
    #[must_use]
    pub fn header_only(packet_type: PacketType, status: PacketStatus, channel: u16) -> Self {
        Self {
            header: PacketHeader::new(packet_type, status, channel),
            payload: BytesMut::new(),
        }
    }

    /// Total size including the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Whether this packet ends its message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Packet codec for tokio-util framing.
///
/// Incoming frames are accepted up to the wire maximum. The negotiated
/// packet size only bounds outgoing messages, where the channel chunks
/// before encoding.
pub struct Tds5Codec {
    max_packet_size: usize,
    packet_nr: u8,
}

impl Tds5Codec {
    /// Create a codec accepting packets up to the wire maximum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_nr: 0,
        }
    }
}

impl Default for Tds5Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Tds5Codec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the length before committing to the parse.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let packet_bytes = src.split_to(length);
        let header = PacketHeader::decode(&packet_bytes)?;
        let payload = BytesMut::from(&packet_bytes[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            packet_type = ?header.packet_type,
            channel = header.channel,
            length,
            is_eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for Tds5Codec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();
        if total_length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.max_packet_size,
            });
        }

        dst.reserve(total_length);

        let mut header = item.header;
        header.length = total_length as u16;
        header.packet_nr = self.packet_nr;
        self.packet_nr = self.packet_nr.wrapping_add(1);

        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            channel = header.channel,
            length = total_length,
            packet_nr = header.packet_nr,
            "encoded packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_packet() {
        let mut codec = Tds5Codec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::Normal as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(0);
        data.put_u8(0);
        data.put_slice(b"test");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::Normal);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"test");
    }

    #[test]
    fn test_incomplete_packet_returns_none() {
        let mut codec = Tds5Codec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::Normal as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(0);
        data.put_u8(0);
        // payload missing

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_encode_stamps_length_and_nr() {
        let mut codec = Tds5Codec::new();

        let packet = Packet::new(
            PacketHeader::new(PacketType::Normal, PacketStatus::END_OF_MESSAGE, 3),
            BytesMut::from(&b"data"[..]),
        );

        let mut dst = BytesMut::new();
        codec.encode(packet.clone(), &mut dst).unwrap();
        codec.encode(packet, &mut dst).unwrap();

        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 12);
        // Second packet has the next sequence number.
        assert_eq!(dst[6], 0);
        assert_eq!(dst[12 + 6], 1);
    }

    #[tokio::test]
    async fn test_decode_across_split_reads() {
        use futures_util::StreamExt;
        use tokio_util::codec::FramedRead;

        let mut wire = BytesMut::new();
        Tds5Codec::new()
            .encode(
                Packet::new(
                    PacketHeader::new(PacketType::Normal, PacketStatus::END_OF_MESSAGE, 2),
                    BytesMut::from(&b"select 1"[..]),
                ),
                &mut wire,
            )
            .unwrap();

        // The header arrives on its own; the payload follows later.
        let io = tokio_test::io::Builder::new()
            .read(&wire[..PACKET_HEADER_SIZE])
            .read(&wire[PACKET_HEADER_SIZE..])
            .build();
        let mut framed = FramedRead::new(io, Tds5Codec::new());

        let packet = framed.next().await.unwrap().unwrap();
        assert_eq!(packet.header.channel, 2);
        assert_eq!(&packet.payload[..], b"select 1");
    }

    #[test]
    fn test_round_trip() {
        let mut codec = Tds5Codec::new();

        let packet = Packet::new(
            PacketHeader::new(PacketType::Language, PacketStatus::END_OF_MESSAGE, 7),
            BytesMut::from(&b"select 1"[..]),
        );

        let mut wire = BytesMut::new();
        codec.encode(packet, &mut wire).unwrap();
        let back = codec.decode(&mut wire).unwrap().unwrap();

        assert_eq!(back.header.packet_type, PacketType::Language);
        assert_eq!(back.header.channel, 7);
        assert_eq!(&back.payload[..], b"select 1");
    }
}
