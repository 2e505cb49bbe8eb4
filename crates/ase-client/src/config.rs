//! Connection configuration.

use tds5_protocol::login::{LoginConfig, RemoteServer};
use tds5_protocol::msg::MsgId;
use tds5_protocol::packet::{DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE};

use crate::error::{Error, Result};

/// Default number of rows requested per cursor fetch.
pub const DEFAULT_CURSOR_FETCH_ROWS: i32 = 100;

/// Connection configuration.
///
/// ```rust
/// use ase_client::Config;
///
/// let config = Config::new("localhost", "sa", "secret")
///     .port(5000)
///     .database("pubs2")
///     .appname("reporting");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Database selected after login, if any.
    pub database: Option<String>,
    /// Application name announced to the server.
    pub appname: String,
    /// Client hostname announced to the server. Empty picks nothing up
    /// automatically; the server accepts an empty name.
    pub hostname: String,
    /// Session language.
    pub language: String,
    /// Session character set.
    pub charset: String,
    /// Requested packet size. The server may settle on a smaller one.
    pub packet_size: u16,
    /// Whether to negotiate password encryption instead of sending the
    /// password in the login record.
    pub encrypt: bool,
    /// Passwords for remote servers, used for server-to-server requests.
    pub remote_servers: Vec<RemoteServer>,
    /// Rows requested per cursor fetch.
    pub cursor_fetch_rows: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5000,
            username: String::new(),
            password: String::new(),
            database: None,
            appname: String::from("ase-rs"),
            hostname: String::new(),
            language: String::from("us_english"),
            charset: String::from("utf8"),
            packet_size: DEFAULT_PACKET_SIZE as u16,
            encrypt: true,
            remote_servers: Vec::new(),
            cursor_fetch_rows: DEFAULT_CURSOR_FETCH_ROWS,
        }
    }
}

impl Config {
    /// Create a configuration with the required fields.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Select a database after login.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn appname(mut self, appname: impl Into<String>) -> Self {
        self.appname = appname.into();
        self
    }

    /// Set the client hostname announced to the server.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the session language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the session character set.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn packet_size(mut self, packet_size: u16) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Enable or disable password encryption negotiation.
    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Add a remote server password.
    #[must_use]
    pub fn remote_server(
        mut self,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.remote_servers.push(RemoteServer {
            name: name.into(),
            password: password.into(),
        });
        self
    }

    /// Set the number of rows requested per cursor fetch.
    #[must_use]
    pub fn cursor_fetch_rows(mut self, rows: i32) -> Self {
        self.cursor_fetch_rows = rows;
        self
    }

    /// Check the configuration for values the server would reject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on an empty host or username, or a
    /// packet size outside the protocol bounds.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.username.is_empty() {
            return Err(Error::Config("username must not be empty".into()));
        }
        let size = self.packet_size as usize;
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(Error::Config(format!(
                "packet size {size} outside {MIN_PACKET_SIZE}..={MAX_PACKET_SIZE}"
            )));
        }
        if self.cursor_fetch_rows <= 0 {
            return Err(Error::Config("cursor fetch rows must be positive".into()));
        }
        Ok(())
    }

    /// Build the login record configuration.
    pub(crate) fn login_config(&self) -> LoginConfig {
        LoginConfig {
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            host_proc: std::process::id().to_string(),
            app_name: self.appname.clone(),
            server_name: self.host.clone(),
            language: self.language.clone(),
            charset: self.charset.clone(),
            packet_size: self.packet_size,
            remote_servers: self.remote_servers.clone(),
            encrypt: self.encrypt.then_some(MsgId::SecEncrypt4),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = Config::new("db1", "sa", "secret")
            .port(5025)
            .database("pubs2")
            .encrypt(false)
            .remote_server("ASE2", "other");

        assert_eq!(config.port, 5025);
        assert_eq!(config.database.as_deref(), Some("pubs2"));
        assert_eq!(config.remote_servers.len(), 1);
        config.validate().unwrap();

        let login = config.login_config();
        assert_eq!(login.username, "sa");
        assert_eq!(login.server_name, "db1");
        assert_eq!(login.encrypt, None);
    }

    #[test]
    fn test_validate_rejects_empty_username() {
        let config = Config::new("db1", "", "secret");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_packet_size() {
        let config = Config::new("db1", "sa", "secret").packet_size(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encrypt_selects_scheme() {
        let config = Config::new("db1", "sa", "secret");
        assert_eq!(config.login_config().encrypt, Some(MsgId::SecEncrypt4));
    }
}
