//! The user-facing connection.

use tds5_protocol::capability::CapabilityPackage;
use tds5_protocol::packages::{DoneStatus, EedPackage, LanguagePackage, LogoutPackage, Package};

use ase_codec::{Channel, EedHook, EnvChangeHook};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::login;
use crate::rows::{ExecResult, Rows, check_return_status};

/// An authenticated session with an ASE server.
///
/// A connection runs one command at a time; a command's response must be
/// drained before the next command is sent. [`Connection::cancel`] aborts
/// a running command from the same task.
pub struct Connection<T = TcpStream>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    conn: ase_codec::Connection<T>,
    pub(crate) channel: Channel<T>,
    capabilities: CapabilityPackage,
    session_key: Option<Vec<u8>>,
    pub(crate) cursor_fetch_rows: i32,
    pub(crate) next_stmt_id: u32,
}

impl Connection<TcpStream> {
    /// Open a TCP connection and log in.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a failed connect or
    /// a rejected login.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        Self::handshake(stream, config).await
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Log in over an established transport.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or a rejected login.
    pub async fn handshake(transport: T, config: Config) -> Result<Self> {
        config.validate()?;

        let conn = ase_codec::Connection::new(transport);
        let mut channel = conn.main_channel()?;

        let login_result = login::negotiate(&mut channel, &config.login_config()).await?;
        tracing::debug!(
            username = %config.username,
            encrypted = login_result.session_key.is_some(),
            "login complete"
        );

        let mut connection = Self {
            conn,
            channel,
            capabilities: login_result.capabilities,
            session_key: login_result.session_key,
            cursor_fetch_rows: config.cursor_fetch_rows,
            next_stmt_id: 0,
        };

        if let Some(database) = &config.database {
            connection.execute(&format!("use {database}")).await?;
        }

        Ok(connection)
    }

    /// Run a SQL command and discard any rows it returns.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn execute(&mut self, query: &str) -> Result<ExecResult> {
        self.send_language(query).await?;
        let rows = Rows::start(&mut self.channel).await?;
        let result = rows.into_exec_result().await?;
        check_return_status(&result)?;
        Ok(result)
    }

    /// Run a SQL command and stream its results.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn query(&mut self, query: &str) -> Result<Rows<'_, T>> {
        self.send_language(query).await?;
        Rows::start(&mut self.channel).await
    }

    async fn send_language(&mut self, query: &str) -> Result<()> {
        tracing::debug!(query, "sending language command");
        self.channel
            .send_package(&Package::Language(LanguagePackage::new(query)))
            .await?;
        Ok(())
    }

    /// Cancel the in-flight command and drain its response.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the attention request cannot be sent
    /// or the response cannot be read.
    pub async fn cancel(&mut self) -> Result<()> {
        self.channel.cancel().await?;

        // Drain the aborted response completely so the channel is ready
        // for the next command.
        let mut acked = false;
        loop {
            match self.channel.next_package().await? {
                Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
                    if done.status.contains(DoneStatus::ATTN) {
                        acked = true;
                    }
                    if done.status.is_empty() {
                        break;
                    }
                }
                _ => {}
            }
            if self.channel.take_attention_ack() {
                acked = true;
            }
        }

        if !acked {
            tracing::debug!("response drained without an attention acknowledgement");
        }
        Ok(())
    }

    /// Log out and close the connection.
    ///
    /// # Errors
    ///
    /// Returns a transport error; the connection is closed regardless.
    pub async fn logout(mut self) -> Result<()> {
        let result = async {
            self.channel
                .send_package(&Package::Logout(LogoutPackage::default()))
                .await?;
            self.channel.drain_to_final_done().await?;
            Ok::<_, Error>(())
        }
        .await;

        self.conn.close();
        result
    }

    /// Skip the rest of a failed response so the channel sits at a
    /// message boundary again, then build the error from the collected
    /// server messages.
    pub(crate) async fn fail_response(&mut self, eeds: Vec<EedPackage>) -> Error {
        if let Err(drain_err) = self.channel.drain_to_final_done().await {
            tracing::debug!("draining a failed response: {drain_err}");
        }
        Error::from_eeds(eeds)
    }

    /// The capabilities active for this session.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityPackage {
        &self.capabilities
    }

    /// Whether the session negotiated a symmetric key for on demand
    /// command encryption.
    #[must_use]
    pub fn has_session_key(&self) -> bool {
        self.session_key.is_some()
    }

    /// The packet size currently in effect.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.conn.packet_size()
    }

    /// Register a hook for environment changes (database, language,
    /// charset, packet size).
    pub fn add_env_change_hook(&self, hook: EnvChangeHook) {
        self.conn.add_env_change_hook(hook);
    }

    /// Register a hook for server messages.
    pub fn add_eed_hook(&self, hook: EedHook) {
        self.conn.add_eed_hook(hook);
    }
}
