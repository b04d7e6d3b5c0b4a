//! Gateway session management.
//!
//! The gateway hands out an opaque token from `api/login` that replaces the
//! password in every later request. [`SessionManager`] performs that login
//! once per process and remembers the outcome, including the special case of
//! a gateway that has no MDM cluster configured yet.

use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::transport::{GatewayResponse, GatewayTransport, gateway_url};

/// Login endpoint.
pub const LOGIN_ENDPOINT: &str = "api/login";

/// Error message fragment returned by a gateway with no cluster behind it.
pub const NO_MDM_MESSAGE: &str = "no MDM IP is set";

/// Outcome of a gateway login.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionToken {
    /// Token to present in place of the password.
    Active(String),
    /// The gateway answered but manages no cluster.
    NoCluster,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(_) => f.write_str("Active(<redacted>)"),
            Self::NoCluster => f.write_str("NoCluster"),
        }
    }
}

impl SessionToken {
    /// Whether the gateway has no configured cluster.
    #[must_use]
    pub const fn is_no_cluster(&self) -> bool {
        matches!(self, Self::NoCluster)
    }
}

/// Owns the gateway credentials and the memoized session token.
pub struct SessionManager {
    credentials: Credentials,
    token: OnceCell<SessionToken>,
    login_attempts: AtomicU32,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("credentials", &self.credentials)
            .field("token", &self.token.get())
            .field("login_attempts", &self.login_attempts())
            .finish()
    }
}

impl SessionManager {
    /// Create a session manager. No request is made until [`Self::token`].
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token: OnceCell::new(),
            login_attempts: AtomicU32::new(0),
        }
    }

    /// Gateway credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Number of login requests issued so far.
    #[must_use]
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    /// The token, if a login already succeeded.
    #[must_use]
    pub fn cached(&self) -> Option<&SessionToken> {
        self.token.get()
    }

    /// Return the session token, logging in on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the login fails for any reason other than
    /// a gateway without a configured cluster.
    pub async fn token<T: GatewayTransport>(&self, transport: &T) -> Result<&SessionToken> {
        self.token.get_or_try_init(|| self.login(transport)).await
    }

    async fn login<T: GatewayTransport>(&self, transport: &T) -> Result<SessionToken> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);

        let url = gateway_url(&self.credentials, &self.credentials.password, LOGIN_ENDPOINT)?;
        debug!(
            host = %self.credentials.host,
            port = self.credentials.port,
            user = %self.credentials.username,
            "logging in to gateway"
        );

        let response = transport
            .get(&url)
            .await
            .map_err(|e| Error::Auth(format!("failed to get the token: {e}")))?;

        let token = interpret_login(&response)?;
        if !token.is_no_cluster() {
            info!(host = %self.credentials.host, "gateway session established");
        }
        Ok(token)
    }
}

/// Map a login response to a token.
fn interpret_login(response: &GatewayResponse) -> Result<SessionToken> {
    if response.is_success() {
        let token: String = response.body.trim().chars().filter(|c| *c != '"').collect();
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Auth("gateway returned an empty token".to_string()));
        }
        return Ok(SessionToken::Active(token.to_string()));
    }

    let message = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string));

    match message {
        Some(message) if message.contains(NO_MDM_MESSAGE) => {
            warn!(status = response.status, %message, "gateway has no MDM configured");
            Ok(SessionToken::NoCluster)
        }
        Some(message) => Err(Error::Auth(format!("status {}: {message}", response.status))),
        None => Err(Error::Auth(format!(
            "status {}: {}",
            response.status,
            response.body.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeGateway;
    use test_case::test_case;

    fn manager() -> SessionManager {
        SessionManager::new(Credentials::new("gw", 443, "admin", "Password1"))
    }

    #[test_case("\"YWRtaW46MTYw\"", "YWRtaW46MTYw" ; "quoted")]
    #[test_case("YWRtaW46MTYw\n", "YWRtaW46MTYw" ; "trailing newline")]
    #[test_case("  \"YWRtaW46MTYw\"  \r\n", "YWRtaW46MTYw" ; "quoted and padded")]
    fn test_successful_login_strips_quoting(body: &str, expected: &str) {
        let token = interpret_login(&GatewayResponse::new(200, body)).unwrap();
        assert_eq!(token, SessionToken::Active(expected.to_string()));
    }

    #[test]
    fn test_empty_token_is_auth_error() {
        let err = interpret_login(&GatewayResponse::new(200, "\"\"")).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_no_mdm_message_is_degraded_marker() {
        let body = r#"{"message":"Failed to login: no MDM IP is set for the gateway","httpStatusCode":500,"errorCode":0}"#;
        let token = interpret_login(&GatewayResponse::new(500, body)).unwrap();
        assert!(token.is_no_cluster());
    }

    #[test]
    fn test_other_error_message_is_auth_error() {
        let body = r#"{"message":"Unauthorized","httpStatusCode":401}"#;
        let err = interpret_login(&GatewayResponse::new(401, body)).unwrap_err();
        assert_eq!(err.to_string(), "authentication failed: status 401: Unauthorized");
    }

    #[test]
    fn test_unparseable_error_body_is_auth_error() {
        let err = interpret_login(&GatewayResponse::new(503, "Service Unavailable")).unwrap_err();
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[tokio::test]
    async fn test_login_sends_password_once() {
        let gateway = FakeGateway::new().with_login("TOKEN");
        let session = manager();

        for _ in 0..3 {
            let token = session.token(&gateway).await.unwrap();
            assert_eq!(*token, SessionToken::Active("TOKEN".to_string()));
        }

        assert_eq!(session.login_attempts(), 1);
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint, "api/login");
        assert_eq!(requests[0].username, "admin");
        assert_eq!(requests[0].secret.as_deref(), Some("Password1"));
    }

    #[tokio::test]
    async fn test_no_cluster_is_memoized() {
        let gateway = FakeGateway::new().route(
            "api/login",
            500,
            r#"{"message":"no MDM IP is set"}"#,
        );
        let session = manager();

        assert!(session.token(&gateway).await.unwrap().is_no_cluster());
        assert!(session.token(&gateway).await.unwrap().is_no_cluster());
        assert_eq!(gateway.count("api/login"), 1);
        assert_eq!(session.cached(), Some(&SessionToken::NoCluster));
    }

    #[tokio::test]
    async fn test_transport_failure_is_auth_error() {
        let gateway = FakeGateway::new().unreachable("api/login");
        let session = manager();

        let err = session.token(&gateway).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(session.cached().is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::Active("TOKEN".to_string());
        assert_eq!(format!("{token:?}"), "Active(<redacted>)");
    }
}
