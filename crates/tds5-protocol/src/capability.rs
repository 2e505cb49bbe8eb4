//! Capability negotiation.
//!
//! Client and server exchange CAPABILITY packages during login. Each
//! package carries up to three groups (request, response, security), each
//! encoded as a value mask. A value mask packs one bit per capability,
//! counting from bit 0 of the last byte upwards.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

/// Group a value mask belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CapabilityType {
    /// Features the client may request.
    Request = 1,
    /// Responses the client asks the server to suppress.
    Response = 2,
    /// Security features.
    Security = 3,
}

impl TryFrom<u8> for CapabilityType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Self::Request),
            2 => Ok(Self::Response),
            3 => Ok(Self::Security),
            other => Err(ProtocolError::CapabilityMismatch(other)),
        }
    }
}

/// Request capabilities. The discriminant is the bit number in the
/// request value mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum RequestCapability {
    Lang = 1,
    Rpc,
    Evt,
    MultiStatement,
    Bcp,
    Cursor,
    Dynamic,
    Msg,
    Param,
    DataInt1,
    DataInt2,
    DataInt4,
    DataBit,
    DataChar,
    DataVarChar,
    DataBinary,
    DataVarBinary,
    DataMoney8,
    DataMoney4,
    DataDate8,
    DataDate4,
    DataFloat4,
    DataFloat8,
    DataNumeric,
    DataText,
    DataImage,
    DataDecimal,
    DataLongChar,
    DataLongBinary,
    DataIntN,
    DataDateTimeN,
    DataMoneyN,
    CursorPrev,
    CursorFirst,
    CursorLast,
    CursorAbs,
    CursorRel,
    CursorMulti,
    ConOutOfBand,
    ConInBand,
    ConLogical,
    ProtoText,
    ProtoBulk,
    UrgentEvt,
    DataSensitivity,
    DataBoundary,
    ProtoDynamic,
    ProtoDynProc,
    DataFloatN,
    DataBitN,
    DataInt8,
    DataVoid,
    DolBulk,
    ObjectJava1,
    ObjectChar,
    Reserved1,
    ObjectBinary,
    DataColumnStatus,
    WideTables,
    Reserved2,
    DataUint2,
    DataUint4,
    DataUint8,
    DataUintN,
    CursorImplicit,
    DataNlBin,
    ImageNChar,
    BlobNChar16,
    BlobNChar8,
    BlobNCharScsu,
    DataDate,
    DataTime,
    DataInterval,
    CursorScroll,
    CursorSensitive,
    CursorInsensitive,
    CursorSemiSensitive,
    CursorKeysetDriven,
    SrvPacketSize,
    DataUniText,
    ClusterFailover,
    DataSint1,
    LargeIdent,
    BlobNChar16Req,
    DataXml,
    CursorInfo3,
    DbRpc2,
    Unused,
    Migrate,
    MultiRequests,
    Reserved91,
    Reserved92,
    DataBigDateTime,
    DataMicroseconds,
    RpcParamLob,
    InstId,
    Grid,
    DynBatch,
    LangBatch,
    RpcBatch,
    DataLobLocator,
    RowCountForSelect,
    LogParams,
    DynamicSuppressParamFmt,
    ReadOnly,
    CommandEncryption,
}

/// Highest request capability bit.
pub const REQUEST_CAPABILITY_MAX: usize = RequestCapability::CommandEncryption as usize;

/// Response capabilities. Setting a bit asks the server not to send the
/// named response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ResponseCapability {
    NoMsg = 1,
    NoEed,
    NoParam,
    NoDataInt1,
    NoDataInt2,
    NoDataInt4,
    NoDataBit,
    NoDataChar,
    NoDataVarChar,
    NoDataBinary,
    NoDataVarBinary,
    NoDataMoney8,
    NoDataMoney4,
    NoDataDate8,
    NoDataDate4,
    NoDataFloat4,
    NoDataFloat8,
    NoDataNumeric,
    NoDataText,
    NoDataImage,
    NoDataDecimal,
    NoDataLongChar,
    NoDataLongBinary,
    NoDataIntN,
    NoDataDateTimeN,
    NoDataMoneyN,
    NoConOutOfBand,
    NoConInBand,
    NoProtoText,
    NoProtoBulk,
    NoDataSensitivity,
    NoDataBoundary,
    NoTdsDebug,
    NoStripBlanks,
    NoDataInt8,
    NoObjectJava1,
    NoObjectChar,
    NoDataColumnStatus,
    NoObjectBinary,
    Reserved,
    NoDataUint2,
    NoDataUint4,
    NoDataUint8,
    NoDataUintN,
    NoWideTables,
    NoDataNlBin,
    NoImageNChar,
    NoBlobNChar16,
    NoBlobNChar8,
    NoBlobNCharScsu,
    NoDataDate,
    NoDataTime,
    NoDataInterval,
    NoDataUniText,
    NoDataSint1,
    NoLargeIdent,
    NoBlobNChar16Res,
    NoSrvPacketSize,
    NoDataXml,
    NonIntReturnValue,
    NoXnlMetadata,
    SuppressFmt,
    SuppressDoneInProc,
    Unused,
    NoDataBigDateTime,
    NoDataMicroseconds,
    NoTdsControl,
    NoRpcParamLob,
    NoDataLobLocator,
    NoRowCountForSelect,
    ListDrMap,
    DrNoKill,
}

/// Highest response capability bit.
pub const RESPONSE_CAPABILITY_MAX: usize = ResponseCapability::DrNoKill as usize;

/// A variable-width bit mask over capability numbers starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueMask {
    bits: Vec<bool>,
}

impl ValueMask {
    /// Create an empty mask able to hold capabilities `1..=max`.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            bits: vec![false; max],
        }
    }

    /// Set or clear a capability bit.
    pub fn set(&mut self, capability: usize, enabled: bool) {
        if capability == 0 {
            return;
        }
        if capability > self.bits.len() {
            self.bits.resize(capability, false);
        }
        self.bits[capability - 1] = enabled;
    }

    /// Whether a capability bit is set.
    #[must_use]
    pub fn is_set(&self, capability: usize) -> bool {
        capability > 0 && self.bits.get(capability - 1).copied().unwrap_or(false)
    }

    /// Whether no bit is set. A server answering with an all-clear group
    /// supports nothing this driver needs.
    #[must_use]
    pub fn is_all_clear(&self) -> bool {
        self.bits.iter().all(|b| !b)
    }

    /// Whether the mask holds no capabilities at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Parse a mask from wire bytes. Capability 1 is bit 0 of the last
    /// byte, counting upwards towards the first byte.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut mask = Self::new(bytes.len() * 8);
        let mut capability = 1;
        for byte in bytes.iter().rev() {
            for bit in 0..8 {
                mask.set(capability, byte & (1 << bit) != 0);
                capability += 1;
            }
        }
        mask
    }

    /// Pack the mask into wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.bits.len().div_ceil(8);
        let mut bytes = vec![0u8; len];
        for (idx, enabled) in self.bits.iter().enumerate() {
            if *enabled {
                bytes[len - 1 - idx / 8] |= 1 << (idx % 8);
            }
        }
        bytes
    }
}

/// A CAPABILITY package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityPackage {
    /// Request group.
    pub request: ValueMask,
    /// Response group.
    pub response: ValueMask,
    /// Security group.
    pub security: ValueMask,
}

impl CapabilityPackage {
    /// The capability set this driver announces at login.
    #[must_use]
    pub fn client_default() -> Self {
        use RequestCapability as R;

        let mut request = ValueMask::new(REQUEST_CAPABILITY_MAX);
        let enabled = [
            R::Lang,
            R::MultiStatement,
            R::Cursor,
            R::Dynamic,
            R::Msg,
            R::Param,
            R::DataInt1,
            R::DataInt2,
            R::DataInt4,
            R::DataBit,
            R::DataChar,
            R::DataVarChar,
            R::DataBinary,
            R::DataVarBinary,
            R::DataMoney8,
            R::DataMoney4,
            R::DataDate8,
            R::DataDate4,
            R::DataFloat4,
            R::DataFloat8,
            R::DataNumeric,
            R::DataText,
            R::DataImage,
            R::DataDecimal,
            R::DataLongChar,
            R::DataLongBinary,
            R::DataIntN,
            R::DataDateTimeN,
            R::DataMoneyN,
            R::DataSensitivity,
            R::DataBoundary,
            R::DataFloatN,
            R::DataBitN,
            R::DataInt8,
            R::DataUint2,
            R::DataUint4,
            R::DataUint8,
            R::DataUintN,
            R::DataNlBin,
            R::ImageNChar,
            R::BlobNChar16,
            R::BlobNChar8,
            R::BlobNCharScsu,
            R::DataDate,
            R::DataTime,
            R::DataInterval,
            R::DataUniText,
            R::DataSint1,
            R::LargeIdent,
            R::BlobNChar16Req,
            R::DataXml,
            R::DataBigDateTime,
            R::DataMicroseconds,
            R::ConOutOfBand,
            R::ConInBand,
            R::UrgentEvt,
            R::ProtoDynProc,
            R::DataColumnStatus,
            R::CursorInfo3,
            R::DbRpc2,
            R::WideTables,
            R::CursorScroll,
            R::CursorSensitive,
            R::CursorInsensitive,
            R::CursorSemiSensitive,
            R::CursorKeysetDriven,
            R::DynBatch,
            R::LangBatch,
            R::RpcBatch,
            R::CommandEncryption,
        ];
        for cap in enabled {
            request.set(cap as usize, true);
        }

        let mut response = ValueMask::new(RESPONSE_CAPABILITY_MAX);
        response.set(ResponseCapability::NoTdsControl as usize, true);

        Self {
            request,
            response,
            security: ValueMask::default(),
        }
    }

    /// Whether a request capability is active.
    #[must_use]
    pub fn supports_request(&self, capability: RequestCapability) -> bool {
        self.request.is_set(capability as usize)
    }

    /// Check a server capability answer for groups that came back entirely
    /// clear, which means the server supports nothing the group asked for.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CapabilityMismatch`] naming the group.
    pub fn validate_response(&self) -> Result<(), ProtocolError> {
        if !self.request.is_empty() && self.request.is_all_clear() {
            return Err(ProtocolError::CapabilityMismatch(
                CapabilityType::Request as u8,
            ));
        }
        if !self.response.is_empty() && self.response.is_all_clear() {
            return Err(ProtocolError::CapabilityMismatch(
                CapabilityType::Response as u8,
            ));
        }
        Ok(())
    }

    /// Read the package body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an unknown group type.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let end = reader.position() + length;

        let mut pkg = Self::default();
        while reader.position() < end {
            let cap_type = CapabilityType::try_from(reader.u8()?)?;
            let mask_len = reader.u8()? as usize;
            let mask = ValueMask::from_bytes(reader.bytes(mask_len)?);
            match cap_type {
                CapabilityType::Request => pkg.request = mask,
                CapabilityType::Response => pkg.response = mask,
                CapabilityType::Security => pkg.security = mask,
            }
        }

        if reader.position() != end {
            return Err(ProtocolError::LengthMismatch {
                context: "capability package",
                declared: length,
                consumed: length + (reader.position() - end),
            });
        }
        Ok(pkg)
    }

    /// Write the package body following the token byte. Empty groups are
    /// skipped.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let groups = [
            (CapabilityType::Request, &self.request),
            (CapabilityType::Response, &self.response),
            (CapabilityType::Security, &self.security),
        ];

        let mut body = BytesMut::new();
        for (cap_type, mask) in groups {
            if mask.is_empty() {
                continue;
            }
            let bytes = mask.to_bytes();
            body.put_u8(cap_type as u8);
            body.put_u8(bytes.len() as u8);
            body.put_slice(&bytes);
        }

        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_value_mask_bit_order() {
        let mut mask = ValueMask::new(16);
        mask.set(1, true);
        mask.set(9, true);

        // Capability 1 lands in the last byte, capability 9 in the first.
        assert_eq!(mask.to_bytes(), vec![0x01, 0x01]);

        let back = ValueMask::from_bytes(&[0x01, 0x01]);
        assert!(back.is_set(1));
        assert!(back.is_set(9));
        assert!(!back.is_set(2));
    }

    #[test]
    fn test_mask_round_trip() {
        let mut mask = ValueMask::new(REQUEST_CAPABILITY_MAX);
        for cap in [1, 7, 64, 100, 126] {
            mask.set(cap, true);
        }

        let back = ValueMask::from_bytes(&mask.to_bytes());
        for cap in [1, 7, 64, 100, 126] {
            assert!(back.is_set(cap), "capability {cap} lost");
        }
        assert!(!back.is_set(2));
    }

    #[test]
    fn test_package_round_trip() {
        let pkg = CapabilityPackage::client_default();

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf);

        let mut reader = Reader::new(&buf);
        let back = CapabilityPackage::read_from(&mut reader).unwrap();
        assert!(reader.is_empty());

        assert!(back.supports_request(RequestCapability::Lang));
        assert!(back.supports_request(RequestCapability::Cursor));
        assert!(back.supports_request(RequestCapability::CommandEncryption));
        assert!(!back.supports_request(RequestCapability::Rpc));
        assert!(back.response.is_set(ResponseCapability::NoTdsControl as usize));
    }

    #[test]
    fn test_validate_response_rejects_cleared_group() {
        let mut pkg = CapabilityPackage::default();
        pkg.request = ValueMask::new(REQUEST_CAPABILITY_MAX);
        assert!(matches!(
            pkg.validate_response(),
            Err(ProtocolError::CapabilityMismatch(1))
        ));

        pkg.request.set(RequestCapability::Lang as usize, true);
        pkg.validate_response().unwrap();
    }
}
