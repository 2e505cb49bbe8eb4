//! The classic fixed-layout login record.
//!
//! The first message of a connection is not tokenized: it is this record,
//! a tightly packed struct of padded strings and single-byte flags dating
//! back to TDS 4. The capability package is appended to the same message.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::msg::MsgId;
use crate::wire::put_padded_string;

const MAXNAME: usize = 30;
const NETBUF: usize = 4;
const RPLEN: usize = 255;
const PROGNLEN: usize = 10;
const OLDSECURE: usize = 2;
const HA: usize = 6;
const SECURE: usize = 2;
const PKTLEN: usize = 6;
const DUMMY: usize = 4;

/// Name of this library as announced in the login record.
pub const LIBRARY_NAME: &str = "ase-rs";

/// Password of a remote server for server-to-server requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServer {
    /// Server name. Empty means the password applies to any server.
    pub name: String,
    /// Password for that server.
    pub password: String,
}

/// Everything needed to build a login record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    /// Client hostname.
    pub hostname: String,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Client process id.
    pub host_proc: String,
    /// Application name.
    pub app_name: String,
    /// Server name.
    pub server_name: String,
    /// Session language.
    pub language: String,
    /// Session character set.
    pub charset: String,
    /// Requested packet size, 256 to 65535 bytes.
    pub packet_size: u16,
    /// Remote server passwords.
    pub remote_servers: Vec<RemoteServer>,
    /// Password encryption scheme to negotiate.
    pub encrypt: Option<MsgId>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            host_proc: String::from("0"),
            app_name: String::new(),
            server_name: String::new(),
            language: String::from("us_english"),
            charset: String::from("utf8"),
            packet_size: crate::packet::DEFAULT_PACKET_SIZE as u16,
            remote_servers: Vec::new(),
            encrypt: Some(MsgId::SecEncrypt4),
        }
    }
}

impl LoginConfig {
    /// Whether the password is withheld from the record and negotiated
    /// afterwards.
    #[must_use]
    pub fn negotiates_password(&self) -> bool {
        matches!(
            self.encrypt,
            Some(MsgId::SecEncrypt)
                | Some(MsgId::SecEncrypt2)
                | Some(MsgId::SecEncrypt3)
                | Some(MsgId::SecEncrypt4)
        )
    }

    /// Serialize the login record.
    ///
    /// # Errors
    ///
    /// Returns an error if a string exceeds its field or the packet size
    /// is below the protocol minimum.
    pub fn pack(&self) -> Result<BytesMut, ProtocolError> {
        if (self.packet_size as usize) < crate::packet::MIN_PACKET_SIZE {
            return Err(ProtocolError::InvalidLogin(format!(
                "packet size {} below minimum of {}",
                self.packet_size,
                crate::packet::MIN_PACKET_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(600);

        put_padded_string(&mut buf, &self.hostname, MAXNAME, "hostname")?;
        put_padded_string(&mut buf, &self.username, MAXNAME, "username")?;

        // With password encryption the record carries no password; it is
        // negotiated over MSG packages after the login record.
        if self.negotiates_password() {
            put_padded_string(&mut buf, "", MAXNAME, "password")?;
        } else {
            put_padded_string(&mut buf, &self.password, MAXNAME, "password")?;
        }

        put_padded_string(&mut buf, &self.host_proc, MAXNAME, "hostproc")?;

        // Datatype descriptors: little-endian int2/int4, ASCII chars,
        // little-endian floats and dates.
        buf.put_u8(3); // lint2
        buf.put_u8(1); // lint4
        buf.put_u8(6); // lchar
        buf.put_u8(10); // lflt
        buf.put_u8(9); // ldate

        buf.put_u8(1); // lusedb
        buf.put_u8(1); // ldmpld

        // linterfacespare, ltype: server-to-server only
        buf.put_bytes(0, 2);
        // lbufsize: deprecated
        buf.put_bytes(0, NETBUF);
        // lspare
        buf.put_bytes(0, 3);

        put_padded_string(&mut buf, &self.app_name, MAXNAME, "appname")?;
        put_padded_string(&mut buf, &self.server_name, MAXNAME, "servname")?;

        // lrempw: remote passwords travel in MSG packages instead
        put_padded_string(&mut buf, "", RPLEN, "remote password")?;

        // ltds: protocol version 5.0.0.0
        buf.put_slice(&[5, 0, 0, 0]);

        put_padded_string(&mut buf, LIBRARY_NAME, PROGNLEN, "progname")?;
        // lprogvers
        buf.put_slice(&[0, 1, 0, 0]);

        // lnoshort: do not convert short data types
        buf.put_u8(0);
        buf.put_u8(13); // lflt4
        buf.put_u8(17); // ldate4

        put_padded_string(&mut buf, &self.language, MAXNAME, "language")?;
        // lsetlang: notify of language changes
        buf.put_u8(1);

        // loldsecure: deprecated
        buf.put_bytes(0, OLDSECURE);

        // lseclogin
        buf.put_u8(match self.encrypt {
            Some(MsgId::SecEncrypt) => 0x01,
            Some(MsgId::SecEncrypt2) => 0x01 | 0x20,
            Some(MsgId::SecEncrypt3) | Some(MsgId::SecEncrypt4) => 0x01 | 0x20 | 0x80,
            _ => 0x00,
        });

        // lsecbulk: deprecated
        buf.put_u8(1);
        // lhalogin
        buf.put_u8(1);
        // lhasessionid
        buf.put_bytes(0, HA);
        // lsecspare
        buf.put_bytes(0, SECURE);

        put_padded_string(&mut buf, &self.charset, MAXNAME, "charset")?;
        // lsetcharset: notify of charset changes
        buf.put_u8(1);

        // lpacketsize travels as a string
        put_padded_string(&mut buf, &self.packet_size.to_string(), PKTLEN, "packet size")?;

        // ldummy
        buf.put_bytes(0, DUMMY);

        Ok(buf)
    }
}

/// Status of a LOGINACK package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginAckStatus {
    /// Login succeeded.
    Succeed = 5,
    /// Login failed.
    Fail = 6,
    /// The server expects further negotiation.
    Negotiate = 7,
}

impl TryFrom<u8> for LoginAckStatus {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            5 => Ok(Self::Succeed),
            6 => Ok(Self::Fail),
            7 => Ok(Self::Negotiate),
            other => Err(ProtocolError::InvalidLogin(format!(
                "unknown login ack status {other}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> LoginConfig {
        LoginConfig {
            hostname: "client".into(),
            username: "sa".into(),
            password: "secret".into(),
            host_proc: "1234".into(),
            app_name: "test".into(),
            server_name: "ASE1".into(),
            ..LoginConfig::default()
        }
    }

    #[test]
    fn test_record_length_is_fixed() {
        let plain = {
            let mut c = config();
            c.encrypt = None;
            c.pack().unwrap()
        };
        let negotiated = config().pack().unwrap();

        // The layout is positional; the password choice must not shift it.
        assert_eq!(plain.len(), negotiated.len());
        assert_eq!(plain.len(), 568);
    }

    #[test]
    fn test_password_withheld_when_negotiating() {
        let record = config().pack().unwrap();
        // Password field spans bytes 62..=92; all zero with length 0.
        assert!(record[62..93].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_password_present_when_plain() {
        let mut c = config();
        c.encrypt = None;
        let record = c.pack().unwrap();
        assert_eq!(&record[62..68], b"secret");
        assert_eq!(record[92], 6);
    }

    #[test]
    fn test_protocol_version() {
        let record = config().pack().unwrap();
        // ltds sits after four padded 30-byte names, the flag block and
        // two padded 30-byte names plus the 255-byte remote password.
        let offset = 31 * 4 + 16 + 31 * 2 + 256;
        assert_eq!(&record[offset..offset + 4], &[5, 0, 0, 0]);
    }

    #[test]
    fn test_rejects_small_packet_size() {
        let mut c = config();
        c.packet_size = 128;
        assert!(c.pack().is_err());
    }
}
