//! Mock TDS 5.0 server for unit testing.
//!
//! This module provides a mock ASE implementation that can be used for
//! unit testing without requiring a real database instance. It speaks
//! the real packet and package codecs, handles both the plaintext and
//! the encrypted login handshake, and emulates language commands,
//! cursors and prepared statements against scripted responses.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_testing::mock_server::{MockAseServer, MockResponse};
//!
//! let server = MockAseServer::builder()
//!     .with_response("select 1", MockResponse::affected(1))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! // Connect your client to server.host() / server.port()...
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

use ase_types::{DataType, Value};
use tds5_protocol::capability::CapabilityPackage;
use tds5_protocol::field::FieldFmt;
use tds5_protocol::login::LoginAckStatus;
use tds5_protocol::msg::MsgId;
use tds5_protocol::packet::{
    DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType,
};
use tds5_protocol::packages::{
    CurInfoPackage, CursorInfoCommand, CursorInfoStatus, DataPackage, DonePackage, DoneStatus,
    DynamicOperation, DynamicPackage, EedPackage, EnvChange, EnvChangePackage, EnvChangeType,
    LoginAckPackage, MsgPackage, MsgStatus, Package, PackageContext, ParamFmtPackage,
    RowFmtPackage, TranState,
};
use tds5_protocol::wire::Reader;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds5_protocol::ProtocolError),

    /// The client violated the scripted exchange.
    #[error("unexpected client behavior: {0}")]
    Unexpected(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// One result set of a scripted response.
#[derive(Debug, Clone)]
pub struct MockResultSet {
    /// Column formats.
    pub formats: Vec<FieldFmt>,
    /// Row data; every row must match the formats.
    pub rows: Vec<Vec<Value>>,
}

impl MockResultSet {
    /// Create a result set.
    #[must_use]
    pub fn new(formats: Vec<FieldFmt>, rows: Vec<Vec<Value>>) -> Self {
        Self { formats, rows }
    }

    /// An `int` column format.
    #[must_use]
    pub fn int_column(name: &str) -> FieldFmt {
        let mut fmt = FieldFmt::named(DataType::IntN, name);
        fmt.max_length = 4;
        fmt
    }

    /// A `varchar` column format.
    #[must_use]
    pub fn varchar_column(name: &str) -> FieldFmt {
        let mut fmt = FieldFmt::named(DataType::VarChar, name);
        fmt.max_length = 255;
        fmt
    }
}

/// Scripted response for a query.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// One or more result sets.
    ResultSets(Vec<MockResultSet>),
    /// A rows-affected count without rows.
    Affected(i32),
    /// A server error.
    Error {
        /// Server message number.
        number: u32,
        /// Severity class.
        class: u8,
        /// Message text.
        message: String,
    },
}

impl MockResponse {
    /// A single result set response.
    #[must_use]
    pub fn rows(formats: Vec<FieldFmt>, rows: Vec<Vec<Value>>) -> Self {
        Self::ResultSets(vec![MockResultSet::new(formats, rows)])
    }

    /// A rows-affected response.
    #[must_use]
    pub fn affected(count: i32) -> Self {
        Self::Affected(count)
    }

    /// An empty response.
    #[must_use]
    pub fn empty() -> Self {
        Self::Affected(0)
    }

    /// A server error response with severity 14.
    #[must_use]
    pub fn error(number: u32, message: impl Into<String>) -> Self {
        Self::Error {
            number,
            class: 14,
            message: message.into(),
        }
    }
}

/// Configuration for the mock server.
pub struct MockServerConfig {
    responses: HashMap<String, MockResponse>,
    param_formats: HashMap<String, Vec<FieldFmt>>,
    default_response: MockResponse,
    /// Password to verify at login; `None` accepts anything.
    password: Option<String>,
    server_name: String,
    /// Answer a cursor close-with-dealloc in two responses instead of
    /// one, as some servers do when the cursor was already closed.
    split_cursor_dealloc: bool,
}

/// Builder for [`MockAseServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                param_formats: HashMap::new(),
                default_response: MockResponse::empty(),
                password: None,
                server_name: "MockASE".to_string(),
                split_cursor_dealloc: false,
            },
        }
    }

    /// Add a response for a specific query.
    #[must_use]
    pub fn with_response(mut self, query: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(query.into(), response);
        self
    }

    /// Describe the parameters of a query, announced when the query is
    /// prepared.
    #[must_use]
    pub fn with_param_formats(
        mut self,
        query: impl Into<String>,
        formats: Vec<FieldFmt>,
    ) -> Self {
        self.config.param_formats.insert(query.into(), formats);
        self
    }

    /// Set the default response for unmatched queries.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Reject logins whose password does not match.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the server name reported in the login acknowledgement.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Answer cursor deallocation in a separate response.
    #[must_use]
    pub fn with_split_cursor_dealloc(mut self) -> Self {
        self.config.split_cursor_dealloc = true;
        self
    }

    /// Build and start the mock server.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn build(self) -> Result<MockAseServer> {
        MockAseServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock ASE server for testing.
pub struct MockAseServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<Mutex<usize>>,
}

impl MockAseServer {
    /// Create a new builder for the mock server.
    #[must_use]
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let config = Arc::clone(&config);
                                let count = Arc::clone(&connection_count);
                                tokio::spawn(async move {
                                    {
                                        let mut c = count.lock().await;
                                        *c += 1;
                                    }
                                    if let Err(err) = handle_connection(stream, config).await {
                                        tracing::debug!("connection error: {err}");
                                    }
                                    {
                                        let mut c = count.lock().await;
                                        *c = c.saturating_sub(1);
                                    }
                                });
                            }
                            Err(err) => {
                                tracing::error!("accept error: {err}");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// The server's listening address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host string for connection configuration.
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Port number.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of currently connected clients.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockAseServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Offsets into the fixed-layout login record.
const RECORD_USERNAME: usize = 31;
const RECORD_PASSWORD: usize = 62;
const RECORD_SECLOGIN: usize = 514;
const RECORD_LEN: usize = 568;
const NAME_WIDTH: usize = 30;
const NONCE_LEN: usize = 16;

/// A cursor the connection has declared.
struct CursorSession {
    id: i32,
    formats: Arc<Vec<FieldFmt>>,
    rows: Vec<Vec<Value>>,
    pos: usize,
    fetch_rows: usize,
}

/// Per-connection state.
struct Session {
    stream: TcpStream,
    config: Arc<MockServerConfig>,
    cursors: HashMap<String, CursorSession>,
    cursor_names: HashMap<i32, String>,
    next_cursor_id: i32,
    statements: HashMap<String, String>,
}

/// One reassembled client message.
struct ClientMessage {
    packet_type: PacketType,
    payload: BytesMut,
}

async fn handle_connection(stream: TcpStream, config: Arc<MockServerConfig>) -> Result<()> {
    let mut session = Session {
        stream,
        config,
        cursors: HashMap::new(),
        cursor_names: HashMap::new(),
        next_cursor_id: 0,
        statements: HashMap::new(),
    };

    session.handle_login().await?;

    loop {
        let message = match session.read_message().await {
            Ok(message) => message,
            Err(MockServerError::Io(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(err),
        };

        match message.packet_type {
            PacketType::Attn => {
                session
                    .send_response(&[
                        Package::Done(DonePackage {
                            status: DoneStatus::ATTN,
                            tran_state: TranState::NotInTran,
                            count: 0,
                        }),
                        final_done(),
                    ])
                    .await?;
            }
            PacketType::Setup | PacketType::Close => {}
            _ => {
                let packages = parse_packages(&message.payload)?;
                if session.handle_request(packages).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

impl Session {
    /// Read packets up to an end-of-message marker. A packet with the
    /// attention bit short-circuits into an attention message.
    async fn read_message(&mut self) -> Result<ClientMessage> {
        let mut payload = BytesMut::new();
        let mut packet_type = None;

        loop {
            let mut header_buf = [0u8; PACKET_HEADER_SIZE];
            self.stream.read_exact(&mut header_buf).await?;
            let header = PacketHeader::decode(&header_buf)?;

            let body_len = (header.length as usize).saturating_sub(PACKET_HEADER_SIZE);
            let mut body = vec![0u8; body_len];
            if body_len > 0 {
                self.stream.read_exact(&mut body).await?;
            }

            if header.packet_type == PacketType::Attn
                || header.status.contains(PacketStatus::ATTN)
            {
                return Ok(ClientMessage {
                    packet_type: PacketType::Attn,
                    payload: BytesMut::new(),
                });
            }

            packet_type.get_or_insert(header.packet_type);
            payload.extend_from_slice(&body);

            if header.is_end_of_message() {
                break;
            }
        }

        Ok(ClientMessage {
            packet_type: packet_type.unwrap_or(PacketType::Normal),
            payload,
        })
    }

    /// Serialize packages and send them as one message of RESPONSE
    /// packets, chunked at the default packet size.
    async fn send_response(&mut self, packages: &[Package]) -> Result<()> {
        let mut body = BytesMut::new();
        for package in packages {
            package.write_to(&mut body)?;
        }

        let max_payload = DEFAULT_PACKET_SIZE - PACKET_HEADER_SIZE;
        loop {
            let last = body.len() <= max_payload;
            let chunk = if last {
                body.split()
            } else {
                body.split_to(max_payload)
            };

            let mut header = PacketHeader::new(
                PacketType::Response,
                if last {
                    PacketStatus::END_OF_MESSAGE
                } else {
                    PacketStatus::empty()
                },
                0,
            );
            header.length = (PACKET_HEADER_SIZE + chunk.len()) as u16;

            let mut packet = BytesMut::with_capacity(header.length as usize);
            header.encode(&mut packet);
            packet.extend_from_slice(&chunk);
            self.stream.write_all(&packet).await?;

            if last {
                break;
            }
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn handle_login(&mut self) -> Result<()> {
        let message = self.read_message().await?;
        if message.packet_type != PacketType::Login {
            return Err(MockServerError::Unexpected(format!(
                "expected a login message, got {:?} packets",
                message.packet_type
            )));
        }
        if message.payload.len() < RECORD_LEN {
            return Err(MockServerError::Unexpected(format!(
                "login record of {} bytes is too short",
                message.payload.len()
            )));
        }

        let username = padded_string(&message.payload, RECORD_USERNAME);
        let record_password = padded_string(&message.payload, RECORD_PASSWORD);
        let encrypted = message.payload[RECORD_SECLOGIN] != 0;

        let mut reader = Reader::new(&message.payload[RECORD_LEN..]);
        let mut ctx = PackageContext::default();
        let capabilities = match Package::read(&mut reader, &mut ctx)? {
            Package::Capability(caps) => caps,
            other => {
                return Err(MockServerError::Unexpected(format!(
                    "expected capabilities after the login record, got {other:?}"
                )));
            }
        };

        tracing::debug!(%username, encrypted, "login request");

        if encrypted {
            self.negotiate_encrypted_login(capabilities).await
        } else {
            if let Some(expected) = &self.config.password {
                if record_password != *expected {
                    return self.reject_login().await;
                }
            }
            self.accept_login(capabilities).await
        }
    }

    /// Run the server side of the ENCRYPT4 handshake.
    async fn negotiate_encrypted_login(
        &mut self,
        capabilities: CapabilityPackage,
    ) -> Result<()> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|err| MockServerError::Unexpected(format!("RSA keygen failed: {err}")))?;
        let pem = private_key
            .to_public_key()
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .map_err(|err| MockServerError::Unexpected(format!("PEM encoding failed: {err}")))?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let fmt = ParamFmtPackage::new(vec![
            FieldFmt::new(DataType::Int4),
            FieldFmt::new(DataType::LongBinary),
            FieldFmt::new(DataType::LongBinary),
        ]);
        let params = DataPackage::from_values(
            Arc::clone(&fmt.fields),
            vec![
                Value::Int(1),
                Value::Binary(pem.into_bytes()),
                Value::Binary(nonce.to_vec()),
            ],
        )?;

        self.send_response(&[
            Package::LoginAck(login_ack(LoginAckStatus::Negotiate, &self.config.server_name)),
            Package::Msg(MsgPackage::new(MsgStatus::HasArgs, MsgId::SecEncrypt4)),
            Package::ParamFmt(fmt),
            Package::Params(params),
            final_done(),
        ])
        .await?;

        // The reply carries the encrypted password, remote passwords and
        // the symmetric session key as MSG/PARAMFMT/PARAMS triples.
        let reply = self.read_message().await?;
        let packages = parse_packages(&reply.payload)?;

        let mut current_msg = None;
        let mut password = None;
        let mut session_key_seen = false;
        for package in packages {
            match package {
                Package::Msg(msg) => current_msg = Some(msg.msg_id),
                Package::Params(params) => match current_msg {
                    Some(MsgId::SecLogPwd3) => {
                        let encrypted = binary_param(&params, 0)?;
                        password = Some(self.decrypt(&private_key, &nonce, &encrypted)?);
                    }
                    Some(MsgId::SecSymKey) => {
                        let encrypted = binary_param(&params, 0)?;
                        let key = self.decrypt(&private_key, &nonce, &encrypted)?;
                        if key.len() != 32 {
                            return Err(MockServerError::Unexpected(format!(
                                "session key of {} bytes instead of 32",
                                key.len()
                            )));
                        }
                        session_key_seen = true;
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        let Some(password) = password else {
            return Err(MockServerError::Unexpected(
                "client sent no encrypted password".to_string(),
            ));
        };
        if !session_key_seen {
            return Err(MockServerError::Unexpected(
                "client sent no session key".to_string(),
            ));
        }
        if let Some(expected) = &self.config.password {
            if password != expected.as_bytes() {
                return self.reject_login().await;
            }
        }

        self.accept_login(capabilities).await
    }

    /// Decrypt an RSA-OAEP payload and strip the leading nonce.
    fn decrypt(
        &self,
        private_key: &RsaPrivateKey,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let plaintext = private_key
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|err| MockServerError::Unexpected(format!("RSA decryption failed: {err}")))?;
        if plaintext.len() < nonce.len() || &plaintext[..nonce.len()] != nonce {
            return Err(MockServerError::Unexpected(
                "decrypted payload does not start with the nonce".to_string(),
            ));
        }
        Ok(plaintext[nonce.len()..].to_vec())
    }

    async fn accept_login(&mut self, capabilities: CapabilityPackage) -> Result<()> {
        self.send_response(&[
            Package::EnvChange(EnvChangePackage {
                changes: vec![EnvChange {
                    change_type: EnvChangeType::Database,
                    new_value: "master".to_string(),
                    old_value: String::new(),
                }],
            }),
            Package::LoginAck(login_ack(LoginAckStatus::Succeed, &self.config.server_name)),
            Package::Capability(capabilities),
            Package::Done(DonePackage {
                status: DoneStatus::empty(),
                tran_state: TranState::Completed,
                count: 0,
            }),
        ])
        .await
    }

    async fn reject_login(&mut self) -> Result<()> {
        self.send_response(&[
            Package::LoginAck(login_ack(LoginAckStatus::Fail, &self.config.server_name)),
            final_done(),
        ])
        .await?;
        Err(MockServerError::Unexpected("login rejected".to_string()))
    }

    /// Dispatch one parsed client message. Returns `true` on logout.
    async fn handle_request(&mut self, packages: Vec<Package>) -> Result<bool> {
        let Some(first) = packages.first() else {
            return Ok(false);
        };

        match first.clone() {
            Package::Language(lang) => {
                let response = self.lookup(&lang.cmd);
                let packages = response_packages(&response)?;
                self.send_response(&packages).await?;
            }
            Package::Logout(_) => {
                self.send_response(&[final_done()]).await?;
                return Ok(true);
            }
            Package::CurDeclare(declare) => self.cursor_declare(declare.name, declare.stmt).await?,
            Package::CurInfo(info) if info.command == CursorInfoCommand::SetRows => {
                self.cursor_set_rows(&info).await?;
            }
            Package::CurOpen(open) => self.cursor_open(&open.name).await?,
            Package::CurFetch(fetch) => self.cursor_fetch(fetch.cursor_id).await?,
            Package::CurClose(close) => self.cursor_close(close.cursor_id).await?,
            Package::Dynamic(dynamic) => self.dynamic(dynamic).await?,
            other => {
                tracing::debug!("unhandled client package: {other:?}");
                self.send_response(&[final_done()]).await?;
            }
        }
        Ok(false)
    }

    fn lookup(&self, query: &str) -> MockResponse {
        self.config
            .responses
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone())
    }

    async fn cursor_declare(&mut self, name: String, stmt: String) -> Result<()> {
        let (formats, rows) = match self.lookup(&stmt) {
            MockResponse::ResultSets(mut sets) if !sets.is_empty() => {
                let set = sets.remove(0);
                (set.formats, set.rows)
            }
            _ => (Vec::new(), Vec::new()),
        };

        self.next_cursor_id += 1;
        let id = self.next_cursor_id;
        self.cursors.insert(
            name.clone(),
            CursorSession {
                id,
                formats: Arc::new(formats),
                rows,
                pos: 0,
                fetch_rows: 1,
            },
        );
        self.cursor_names.insert(id, name.clone());

        self.send_response(&[
            Package::CurInfo(inform(id, &name, CursorInfoStatus::DECLARED, 0)),
            final_done(),
        ])
        .await
    }

    async fn cursor_set_rows(&mut self, info: &CurInfoPackage) -> Result<()> {
        let name = if info.name.is_empty() {
            self.cursor_names
                .get(&info.cursor_id)
                .cloned()
                .unwrap_or_default()
        } else {
            info.name.clone()
        };
        let Some(cursor) = self.cursors.get_mut(&name) else {
            return self.cursor_error(&name).await;
        };
        cursor.fetch_rows = info.row_count.max(1) as usize;
        let id = cursor.id;
        let rows = cursor.fetch_rows as i32;

        self.send_response(&[
            Package::CurInfo(inform(
                id,
                &name,
                CursorInfoStatus::DECLARED | CursorInfoStatus::ROW_COUNT,
                rows,
            )),
            final_done(),
        ])
        .await
    }

    async fn cursor_open(&mut self, name: &str) -> Result<()> {
        let Some(cursor) = self.cursors.get(name) else {
            return self.cursor_error(name).await;
        };
        let id = cursor.id;
        let formats = Arc::clone(&cursor.formats);

        self.send_response(&[
            Package::CurInfo(inform(id, name, CursorInfoStatus::OPEN, 0)),
            Package::RowFmt(RowFmtPackage {
                fields: formats,
                wide: false,
            }),
            final_done(),
        ])
        .await
    }

    async fn cursor_fetch(&mut self, cursor_id: i32) -> Result<()> {
        let Some(name) = self.cursor_names.get(&cursor_id).cloned() else {
            return self.cursor_error(&format!("id {cursor_id}")).await;
        };
        let Some(cursor) = self.cursors.get_mut(&name) else {
            return self.cursor_error(&name).await;
        };

        let end = (cursor.pos + cursor.fetch_rows).min(cursor.rows.len());
        let batch: Vec<Vec<Value>> = cursor.rows[cursor.pos..end].to_vec();
        cursor.pos = end;
        let exhausted = cursor.pos >= cursor.rows.len();
        let formats = Arc::clone(&cursor.formats);
        let id = cursor.id;

        let mut packages = Vec::new();
        for row in &batch {
            packages.push(Package::Row(DataPackage::from_values(
                Arc::clone(&formats),
                row.clone(),
            )?));
        }
        if exhausted {
            packages.push(Package::CurInfo(inform(
                id,
                &name,
                CursorInfoStatus::CLOSED,
                0,
            )));
        }
        packages.push(Package::Done(DonePackage {
            status: DoneStatus::COUNT,
            tran_state: TranState::NotInTran,
            count: batch.len() as i32,
        }));
        packages.push(final_done());

        self.send_response(&packages).await
    }

    async fn cursor_close(&mut self, cursor_id: i32) -> Result<()> {
        let Some(name) = self.cursor_names.remove(&cursor_id) else {
            return self.cursor_error(&format!("id {cursor_id}")).await;
        };
        self.cursors.remove(&name);

        if self.config.split_cursor_dealloc {
            self.send_response(&[
                Package::CurInfo(inform(cursor_id, &name, CursorInfoStatus::CLOSED, 0)),
                final_done(),
            ])
            .await?;
            self.send_response(&[
                Package::CurInfo(inform(cursor_id, &name, CursorInfoStatus::DEALLOC, 0)),
                final_done(),
            ])
            .await
        } else {
            self.send_response(&[
                Package::CurInfo(inform(
                    cursor_id,
                    &name,
                    CursorInfoStatus::CLOSED | CursorInfoStatus::DEALLOC,
                    0,
                )),
                final_done(),
            ])
            .await
        }
    }

    async fn cursor_error(&mut self, name: &str) -> Result<()> {
        let response = MockResponse::error(16100, format!("unknown cursor {name}"));
        let packages = response_packages(&response)?;
        self.send_response(&packages).await
    }

    async fn dynamic(&mut self, dynamic: DynamicPackage) -> Result<()> {
        if dynamic.operation.contains(DynamicOperation::PREPARE) {
            let prefix = format!("create proc {} as ", dynamic.id);
            let query = dynamic
                .stmt
                .strip_prefix(&prefix)
                .unwrap_or(&dynamic.stmt)
                .to_string();
            self.statements.insert(dynamic.id.clone(), query.clone());

            let mut packages = vec![Package::Dynamic(ack(
                DynamicOperation::PREPARE,
                &dynamic.id,
            ))];
            if let Some(formats) = self.config.param_formats.get(&query) {
                packages.push(Package::ParamFmt(ParamFmtPackage::new(formats.clone())));
            }
            if let MockResponse::ResultSets(sets) = self.lookup(&query) {
                if let Some(set) = sets.first() {
                    packages.push(Package::RowFmt(RowFmtPackage::new(set.formats.clone())));
                }
            }
            packages.push(final_done());
            return self.send_response(&packages).await;
        }

        if dynamic.operation.contains(DynamicOperation::EXEC) {
            let Some(query) = self.statements.get(&dynamic.id).cloned() else {
                return self
                    .send_response(&response_packages(&MockResponse::error(
                        10331,
                        format!("unknown statement {}", dynamic.id),
                    ))?)
                    .await;
            };
            let mut packages = vec![Package::Dynamic(ack(DynamicOperation::EXEC, &dynamic.id))];
            packages.extend(response_packages(&self.lookup(&query))?);
            return self.send_response(&packages).await;
        }

        if dynamic.operation.contains(DynamicOperation::EXEC_IMMED) {
            let mut packages = vec![Package::Dynamic(ack(
                DynamicOperation::EXEC_IMMED,
                &dynamic.id,
            ))];
            packages.extend(response_packages(&self.lookup(&dynamic.stmt))?);
            return self.send_response(&packages).await;
        }

        if dynamic.operation.contains(DynamicOperation::DEALLOC) {
            self.statements.remove(&dynamic.id);
            return self
                .send_response(&[
                    Package::Dynamic(ack(DynamicOperation::DEALLOC, &dynamic.id)),
                    final_done(),
                ])
                .await;
        }

        Err(MockServerError::Unexpected(format!(
            "unhandled dynamic operation {:?}",
            dynamic.operation
        )))
    }
}

/// Parse all packages of one message.
fn parse_packages(payload: &[u8]) -> Result<Vec<Package>> {
    let mut reader = Reader::new(payload);
    let mut ctx = PackageContext::default();
    let mut packages = Vec::new();
    while !reader.is_empty() {
        packages.push(Package::read(&mut reader, &mut ctx)?);
    }
    Ok(packages)
}

/// Turn a scripted response into its wire packages.
fn response_packages(response: &MockResponse) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    match response {
        MockResponse::ResultSets(sets) => {
            for set in sets {
                let fmt = RowFmtPackage::new(set.formats.clone());
                let fields = Arc::clone(&fmt.fields);
                packages.push(Package::RowFmt(fmt));
                for row in &set.rows {
                    packages.push(Package::Row(DataPackage::from_values(
                        Arc::clone(&fields),
                        row.clone(),
                    )?));
                }
                packages.push(Package::Done(DonePackage {
                    status: DoneStatus::MORE | DoneStatus::COUNT,
                    tran_state: TranState::NotInTran,
                    count: set.rows.len() as i32,
                }));
            }
            packages.push(final_done());
        }
        MockResponse::Affected(count) => {
            packages.push(Package::Done(DonePackage {
                status: DoneStatus::COUNT,
                tran_state: TranState::NotInTran,
                count: *count,
            }));
            packages.push(final_done());
        }
        MockResponse::Error {
            number,
            class,
            message,
        } => {
            packages.push(Package::Eed(EedPackage {
                msg_number: *number,
                state: 1,
                class: *class,
                msg: message.clone(),
                server_name: "MockASE".to_string(),
                tran_state: TranState::StmtFail,
                ..EedPackage::default()
            }));
            packages.push(Package::Done(DonePackage {
                status: DoneStatus::ERROR,
                tran_state: TranState::StmtFail,
                count: 0,
            }));
            packages.push(final_done());
        }
    }
    Ok(packages)
}

fn final_done() -> Package {
    Package::Done(DonePackage::final_done())
}

fn login_ack(status: LoginAckStatus, server_name: &str) -> LoginAckPackage {
    LoginAckPackage {
        status,
        tds_version: [5, 0, 0, 0],
        program_name: server_name.to_string(),
        program_version: [16, 0, 0, 0],
    }
}

fn inform(id: i32, name: &str, status: CursorInfoStatus, row_count: i32) -> CurInfoPackage {
    CurInfoPackage {
        cursor_id: id,
        name: name.to_string(),
        command: CursorInfoCommand::Inform,
        status,
        row_count,
    }
}

fn ack(operation: DynamicOperation, id: &str) -> DynamicPackage {
    DynamicPackage::new(operation | DynamicOperation::ACK, id, "")
}

/// Read a length-suffixed padded string from the login record.
fn padded_string(record: &[u8], offset: usize) -> String {
    let len = record[offset + NAME_WIDTH] as usize;
    String::from_utf8_lossy(&record[offset..offset + len.min(NAME_WIDTH)]).into_owned()
}

fn binary_param(params: &DataPackage, index: usize) -> Result<Vec<u8>> {
    match params.values().get(index) {
        Some(Value::Binary(data)) => Ok(data.clone()),
        other => Err(MockServerError::Unexpected(format!(
            "expected a binary parameter, got {other:?}"
        ))),
    }
}
