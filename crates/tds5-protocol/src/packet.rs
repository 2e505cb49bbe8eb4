//! TDS 5.0 packet header.
//!
//! Every packet starts with an 8 byte big-endian header. The `channel`
//! field multiplexes logical channels over one connection; `packet_nr`
//! wraps at 256 and is purely informational.

use bytes::BufMut;

use crate::error::ProtocolError;
use crate::wire::Reader;

/// Size of the packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Default negotiated packet size.
pub const DEFAULT_PACKET_SIZE: usize = 512;

/// Smallest packet size a login may request.
pub const MIN_PACKET_SIZE: usize = 256;

/// Largest representable packet size.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Buffer type of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Language command.
    Language = 1,
    /// Login record.
    Login = 2,
    /// Remote procedure call.
    Rpc = 3,
    /// Server response.
    Response = 4,
    /// Unformatted data.
    UnfmtData = 5,
    /// Attention (cancel), sent out-of-band.
    Attn = 6,
    /// Bulk copy data.
    BulkData = 7,
    /// Channel setup.
    Setup = 8,
    /// Logical channel close.
    Close = 9,
    /// Error.
    Error = 10,
    /// Protocol acknowledgement.
    ProtAck = 11,
    /// Echo data.
    EchoData = 12,
    /// Logout.
    Logout = 13,
    /// Endpoint.
    Endpoint = 14,
    /// Normal tokenized traffic after login.
    Normal = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        let t = match byte {
            1 => Self::Language,
            2 => Self::Login,
            3 => Self::Rpc,
            4 => Self::Response,
            5 => Self::UnfmtData,
            6 => Self::Attn,
            7 => Self::BulkData,
            8 => Self::Setup,
            9 => Self::Close,
            10 => Self::Error,
            11 => Self::ProtAck,
            12 => Self::EchoData,
            13 => Self::Logout,
            14 => Self::Endpoint,
            15 => Self::Normal,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        };
        Ok(t)
    }
}

bitflags::bitflags! {
    /// Packet status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketStatus: u8 {
        /// Last packet of the message.
        const END_OF_MESSAGE = 0x01;
        /// Acknowledgement of an attention request.
        const ATTN_ACK = 0x02;
        /// Attention request.
        const ATTN = 0x04;
        /// Event notification.
        const EVENT = 0x08;
        /// Packet data is encrypted.
        const SEAL = 0x10;
        /// Packet data is encrypted (login negotiation).
        const ENCRYPT = 0x20;
    }
}

/// The 8 byte header preceding every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Buffer type.
    pub packet_type: PacketType,
    /// Status bits.
    pub status: PacketStatus,
    /// Total packet length including this header.
    pub length: u16,
    /// Logical channel the packet belongs to.
    pub channel: u16,
    /// Packet sequence number, wrapping.
    pub packet_nr: u8,
    /// Window size, unused by ASE.
    pub window: u8,
}

impl PacketHeader {
    /// Create a header with zero length; the length is stamped on encode.
    #[must_use]
    pub fn new(packet_type: PacketType, status: PacketStatus, channel: u16) -> Self {
        Self {
            packet_type,
            status,
            length: 0,
            channel,
            packet_nr: 0,
            window: 0,
        }
    }

    /// Whether this packet ends its message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }

    /// Encode the header. All fields are big-endian.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.packet_type as u8);
        buf.put_u8(self.status.bits());
        buf.put_u16(self.length);
        buf.put_u16(self.channel);
        buf.put_u8(self.packet_nr);
        buf.put_u8(self.window);
    }

    /// Decode a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error on short input, an unknown packet type or a length
    /// below the header size.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(buf);

        let packet_type = PacketType::try_from(reader.u8()?)?;
        let status = PacketStatus::from_bits_truncate(reader.u8()?);

        let length_bytes = reader.bytes(2)?;
        let length = u16::from_be_bytes([length_bytes[0], length_bytes[1]]);
        if (length as usize) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::InvalidPacketLength(length));
        }

        let channel_bytes = reader.bytes(2)?;
        let channel = u16::from_be_bytes([channel_bytes[0], channel_bytes[1]]);

        Ok(Self {
            packet_type,
            status,
            length,
            channel,
            packet_nr: reader.u8()?,
            window: reader.u8()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_round_trip() {
        let mut header = PacketHeader::new(
            PacketType::Normal,
            PacketStatus::END_OF_MESSAGE,
            0x1234,
        );
        header.length = 512;
        header.packet_nr = 7;

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), PACKET_HEADER_SIZE);

        let decoded = PacketHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_is_big_endian() {
        let mut header = PacketHeader::new(PacketType::Login, PacketStatus::empty(), 1);
        header.length = 512;

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf[2], 0x02);
        assert_eq!(buf[3], 0x00);
        assert_eq!(buf[4], 0x00);
        assert_eq!(buf[5], 0x01);
    }

    #[test]
    fn test_invalid_length() {
        let raw = [15u8, 1, 0, 4, 0, 0, 0, 0];
        assert!(matches!(
            PacketHeader::decode(&raw),
            Err(ProtocolError::InvalidPacketLength(4))
        ));
    }

    #[test]
    fn test_unknown_type() {
        let raw = [42u8, 1, 0, 8, 0, 0, 0, 0];
        assert!(matches!(
            PacketHeader::decode(&raw),
            Err(ProtocolError::UnknownPacketType(42))
        ));
    }

    #[test]
    fn test_short_input_is_incomplete() {
        let raw = [15u8, 1, 0];
        assert!(PacketHeader::decode(&raw).unwrap_err().is_incomplete());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod properties {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn header_round_trip(
            status_bits in 0u8..=0x3f,
            length in (PACKET_HEADER_SIZE as u16)..,
            channel in any::<u16>(),
            packet_nr in any::<u8>(),
            window in any::<u8>(),
        ) {
            let mut header = PacketHeader::new(
                PacketType::Normal,
                PacketStatus::from_bits_truncate(status_bits),
                channel,
            );
            header.length = length;
            header.packet_nr = packet_nr;
            header.window = window;

            let mut buf = BytesMut::new();
            header.encode(&mut buf);
            prop_assert_eq!(PacketHeader::decode(&buf).unwrap(), header);
        }

        #[test]
        fn bytes_outside_the_type_table_are_rejected(byte in prop_oneof![Just(0u8), 16u8..]) {
            let raw = [byte, 1, 0, 8, 0, 0, 0, 0];
            prop_assert!(matches!(
                PacketHeader::decode(&raw),
                Err(ProtocolError::UnknownPacketType(b)) if b == byte
            ));
        }
    }
}
