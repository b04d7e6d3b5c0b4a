//! Discovery configuration.
//!
//! Everything a collection pass needs is carried explicitly in a
//! [`DiscoveryConfig`]:
//! - Gateway address and REST credentials
//! - The overall wall-clock budget
//! - Optional OS login used only for host enrichment

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default gateway HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Default overall collection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix of the synthesized certificate name.
pub const CERTNAME_PREFIX: &str = "vxflexos";

/// Gateway REST credentials. Immutable for the lifetime of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Gateway host name or address.
    pub host: String,
    /// Gateway HTTPS port.
    pub port: u16,
    /// REST API user.
    pub username: String,
    /// REST API password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Create credentials for the gateway at `host:port`.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Validate the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is empty or the host is not a bare host.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("server cannot be empty".to_string()));
        }

        if self.host.contains('/') || self.host.contains('@') || self.host.contains(' ') {
            return Err(Error::Config(format!(
                "server must be a host name or address, got '{}'",
                self.host
            )));
        }

        if self.port == 0 {
            return Err(Error::Config("port cannot be 0".to_string()));
        }

        if self.username.is_empty() {
            return Err(Error::Config("username cannot be empty".to_string()));
        }

        if self.password.is_empty() {
            return Err(Error::Config("password cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Login used by the OS enrichment source for the gateway host.
#[derive(Clone, PartialEq, Eq)]
pub struct OsLogin {
    /// Credential identifier understood by the enrichment source.
    pub credential_id: Option<String>,
    /// OS user.
    pub username: String,
    /// OS password.
    pub password: Option<String>,
}

impl fmt::Debug for OsLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsLogin")
            .field("credential_id", &self.credential_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Gateway credentials.
    pub credentials: Credentials,
    /// Wall-clock budget for the whole collection pass.
    pub timeout: Duration,
    /// OS login for host enrichment, if any.
    pub os_login: Option<OsLogin>,
}

impl DiscoveryConfig {
    /// Create a configuration with the default timeout and no OS login.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            timeout: DEFAULT_TIMEOUT,
            os_login: None,
        }
    }

    /// Set the overall collection timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the OS login used for enrichment.
    #[must_use]
    pub fn with_os_login(mut self, os_login: OsLogin) -> Self {
        self.os_login = Some(os_login);
        self
    }

    /// Certificate name reported for this gateway.
    #[must_use]
    pub fn certname(&self) -> String {
        format!("{CERTNAME_PREFIX}-{}", self.credentials.host)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are invalid, the timeout is zero
    /// or the OS login has an empty user.
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;

        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than 0".to_string()));
        }

        if let Some(login) = &self.os_login {
            if login.username.is_empty() {
                return Err(Error::Config("OS username cannot be empty".to_string()));
            }
        }

        Ok(())
    }
}
