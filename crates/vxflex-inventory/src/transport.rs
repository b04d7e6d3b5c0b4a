//! HTTP transport to the gateway REST API.
//!
//! The [`GatewayTransport`] trait is the seam between the session and
//! resource layers and the network. [`HttpTransport`] is the production
//! implementation on top of `reqwest`.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;
use url::Url;

use crate::config::Credentials;
use crate::error::{Error, Result};

/// Connect timeout for individual gateway requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw status and body of a gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl GatewayResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP response.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Issues GET requests against the gateway.
///
/// This trait allows for testing with fake implementations.
pub trait GatewayTransport: Send + Sync {
    /// GET `url` with JSON content negotiation.
    ///
    /// Any HTTP status is a successful return; only failures to obtain a
    /// response are errors.
    fn get(
        &self,
        url: &Url,
    ) -> impl std::future::Future<Output = std::result::Result<GatewayResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport.
///
/// Certificate verification is disabled: gateways ship self-signed
/// certificates.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl GatewayTransport for HttpTransport {
    async fn get(&self, url: &Url) -> std::result::Result<GatewayResponse, TransportError> {
        // reqwest moves URL userinfo into a basic auth header.
        let response = self
            .client
            .get(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("failed to read body: {}", e.without_url())))?;

        Ok(GatewayResponse { status, body })
    }
}

/// Build `https://<user>:<secret>@<host>:<port>/<endpoint>`.
///
/// `secret` is the password for the login call and the session token
/// afterwards. A query string in `endpoint` is preserved.
///
/// # Errors
///
/// Returns an error if the host does not form a valid URL.
pub fn gateway_url(credentials: &Credentials, secret: &str, endpoint: &str) -> Result<Url> {
    let host = if credentials.host.contains(':') && !credentials.host.starts_with('[') {
        format!("[{}]", credentials.host)
    } else {
        credentials.host.clone()
    };

    let mut url = Url::parse(&format!("https://{host}:{}/", credentials.port)).map_err(|e| {
        Error::Config(format!("invalid gateway address '{}': {e}", credentials.host))
    })?;

    url.set_username(&credentials.username)
        .map_err(|()| Error::Config("gateway URL cannot carry a username".to_string()))?;
    url.set_password(Some(secret))
        .map_err(|()| Error::Config("gateway URL cannot carry a password".to_string()))?;

    let endpoint = endpoint.trim_start_matches('/');
    let (path, query) = match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    };
    url.set_path(path);
    url.set_query(query);

    Ok(url)
}

/// Endpoint key of `url`: path without the leading slash, plus the query.
#[must_use]
pub fn endpoint_of(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}
