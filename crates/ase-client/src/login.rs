//! The login handshake.
//!
//! A connection starts with the fixed-layout login record and the client
//! capability announcement in a single message of LOGIN packets. The
//! server either accepts outright or, when password encryption was
//! requested, answers with a negotiation round that carries an RSA public
//! key and a nonce. The password never travels in the clear in that case.

use std::sync::Arc;

use ase_types::{DataType, Value};
use tds5_protocol::capability::CapabilityPackage;
use tds5_protocol::crypto;
use tds5_protocol::field::FieldFmt;
use tds5_protocol::login::{LoginAckStatus, LoginConfig, RemoteServer};
use tds5_protocol::msg::MsgId;
use tds5_protocol::packet::PacketType;
use tds5_protocol::packages::{
    DataPackage, DonePackage, MsgPackage, MsgStatus, Package, ParamFmtPackage, TokenlessPackage,
    TranState,
};

use ase_codec::{Channel, is_final_done};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Outcome of a successful login.
pub(crate) struct LoginResult {
    /// Capabilities the server answered with, or the client defaults when
    /// the server sent none.
    pub capabilities: CapabilityPackage,
    /// Symmetric session key, present after an encrypted handshake.
    pub session_key: Option<Vec<u8>>,
}

/// Run the login handshake on a channel.
///
/// The channel's packet type is LOGIN for the duration of the handshake
/// and NORMAL afterwards.
pub(crate) async fn negotiate<T>(
    channel: &mut Channel<T>,
    config: &LoginConfig,
) -> Result<LoginResult>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    channel.set_packet_type(PacketType::Login);

    let record = config.pack()?;
    channel
        .queue_package(&Package::Tokenless(TokenlessPackage::new(record.to_vec())))
        .await?;
    channel
        .queue_package(&Package::Capability(CapabilityPackage::client_default()))
        .await?;
    channel.flush().await?;

    let ack = match channel.next_package().await? {
        Package::LoginAck(ack) => ack,
        other => {
            return Err(Error::Login(format!(
                "expected login ack as first response, received {other:?}"
            )));
        }
    };

    let result = if config.negotiates_password() {
        if ack.status != LoginAckStatus::Negotiate {
            return Err(Error::Login(format!(
                "expected negotiation, received login ack status {:?}",
                ack.status
            )));
        }
        negotiate_encrypted(channel, config).await?
    } else {
        if ack.status != LoginAckStatus::Succeed {
            return Err(Error::Login(format!(
                "login failed with status {:?}",
                ack.status
            )));
        }
        finish(channel).await?
    };

    channel.set_packet_type(PacketType::Normal);
    Ok(result)
}

/// The ENCRYPT4 round: receive cipher suite, public key and nonce, answer
/// with the encrypted login password, remote server passwords and a fresh
/// symmetric session key.
async fn negotiate_encrypted<T>(
    channel: &mut Channel<T>,
    config: &LoginConfig,
) -> Result<LoginResult>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let msg = expect_msg(channel).await?;
    if msg.msg_id != MsgId::SecEncrypt4 {
        return Err(Error::Login(format!(
            "expected encryption negotiation, received message {:?}",
            msg.msg_id
        )));
    }

    let formats = match channel.next_package().await? {
        Package::ParamFmt(fmt) => fmt,
        other => {
            return Err(Error::Login(format!(
                "expected negotiation parameter formats, received {other:?}"
            )));
        }
    };
    if formats.fields.len() != 3 {
        return Err(Error::Login(format!(
            "expected 3 negotiation parameters, received {}",
            formats.fields.len()
        )));
    }

    let params = match channel.next_package().await? {
        Package::Params(params) => params,
        other => {
            return Err(Error::Login(format!(
                "expected negotiation parameters, received {other:?}"
            )));
        }
    };

    match channel.next_package().await? {
        Package::Done(_) => {}
        other => {
            return Err(Error::Login(format!(
                "expected completion of the negotiation request, received {other:?}"
            )));
        }
    }

    let values = params.values();
    let (cipher_suite, public_key, nonce) = match values.as_slice() {
        [Value::Int(cipher), Value::Binary(key), Value::Binary(nonce)] => {
            (*cipher, key.clone(), nonce.clone())
        }
        other => {
            return Err(Error::Login(format!(
                "malformed negotiation parameters: {other:?}"
            )));
        }
    };
    if cipher_suite != 1 {
        return Err(Error::Login(format!(
            "unhandled asymmetric cipher suite {cipher_suite}"
        )));
    }

    // Password, RSA encrypted with the nonce prepended.
    let encrypted_pass = crypto::rsa_encrypt(&public_key, &nonce, config.password.as_bytes())?;
    queue_msg_params(
        channel,
        MsgId::SecLogPwd3,
        vec![FieldFmt::new(DataType::LongBinary)],
        vec![Value::Binary(encrypted_pass)],
    )
    .await?;

    // Remote server passwords. The first entry is this server itself,
    // named with an empty string.
    let mut remote_servers = vec![RemoteServer {
        name: String::new(),
        password: config.password.clone(),
    }];
    remote_servers.extend(config.remote_servers.iter().cloned());

    let mut fmts = Vec::with_capacity(remote_servers.len() * 2);
    let mut values = Vec::with_capacity(remote_servers.len() * 2);
    for server in &remote_servers {
        fmts.push(FieldFmt::new(DataType::VarChar));
        values.push(Value::Chars(server.name.clone()));

        let encrypted = crypto::rsa_encrypt(&public_key, &nonce, server.password.as_bytes())?;
        fmts.push(FieldFmt::new(DataType::LongBinary));
        values.push(Value::Binary(encrypted));
    }
    queue_msg_params(channel, MsgId::SecRemPwd3, fmts, values).await?;

    // Symmetric session key for on demand command encryption.
    let session_key = crypto::generate_symmetric_key();
    let encrypted_key = crypto::rsa_encrypt(&public_key, &nonce, &session_key)?;
    queue_msg_params(
        channel,
        MsgId::SecSymKey,
        vec![FieldFmt::new(DataType::LongBinary)],
        vec![Value::Binary(encrypted_key)],
    )
    .await?;

    channel.flush().await?;

    let ack = channel
        .next_package_until(|pkg| matches!(pkg, Package::LoginAck(_)))
        .await?;
    if let Package::LoginAck(ack) = ack {
        if ack.status != LoginAckStatus::Succeed {
            return Err(Error::Login(format!(
                "login failed with status {:?}",
                ack.status
            )));
        }
    }

    let mut result = finish(channel).await?;
    result.session_key = Some(session_key);
    Ok(result)
}

/// Read the tail of a login response: an optional capability answer
/// followed by the final completion.
async fn finish<T>(channel: &mut Channel<T>) -> Result<LoginResult>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut capabilities = None;
    let done = loop {
        match channel.next_package().await? {
            Package::Capability(caps) => {
                caps.validate_response()?;
                capabilities = Some(caps);
            }
            pkg @ (Package::Done(_) | Package::DoneProc(_) | Package::DoneInProc(_)) => {
                if !is_final_done(&pkg) {
                    continue;
                }
                if let Package::Done(done) = pkg {
                    break done;
                }
                break DonePackage::final_done();
            }
            Package::Eed(eed) if !eed.is_info() => {
                return Err(Error::from_eeds(vec![eed]));
            }
            other => {
                return Err(Error::Login(format!(
                    "unexpected package in login response: {other:?}"
                )));
            }
        }
    };

    // A negotiated login ends with a committed transaction state; the
    // synthetic completion of a bare acceptance has no state to check.
    if done.tran_state != TranState::Completed && done.tran_state != TranState::NotInTran {
        return Err(Error::Login(format!(
            "login completed with transaction state {:?}",
            done.tran_state
        )));
    }

    Ok(LoginResult {
        capabilities: capabilities.unwrap_or_else(CapabilityPackage::client_default),
        session_key: None,
    })
}

async fn expect_msg<T>(channel: &mut Channel<T>) -> Result<MsgPackage>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match channel.next_package().await? {
        Package::Msg(msg) => Ok(msg),
        other => Err(Error::Login(format!(
            "expected negotiation message, received {other:?}"
        ))),
    }
}

/// Queue a MSG package with its parameter formats and values.
async fn queue_msg_params<T>(
    channel: &mut Channel<T>,
    msg_id: MsgId,
    fmts: Vec<FieldFmt>,
    values: Vec<Value>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    channel
        .queue_package(&Package::Msg(MsgPackage::new(MsgStatus::HasArgs, msg_id)))
        .await?;

    let fmt = ParamFmtPackage::new(fmts);
    let fields = Arc::clone(&fmt.fields);
    channel.queue_package(&Package::ParamFmt(fmt)).await?;

    let params = DataPackage::from_values(fields, values)?;
    channel.queue_package(&Package::Params(params)).await?;
    Ok(())
}
