//! Authenticated access to gateway REST resources.
//!
//! ```rust,no_run
//! use vxflex_inventory::client::ResourceClient;
//! use vxflex_inventory::config::Credentials;
//! use vxflex_inventory::transport::HttpTransport;
//!
//! # async fn example() -> vxflex_inventory::Result<()> {
//! let credentials = Credentials::new("10.1.1.5", 443, "admin", "Password1");
//! let client = ResourceClient::new(HttpTransport::new()?, credentials);
//! let systems = client.get_list("api/types/System/instances").await?;
//! println!("systems: {}", systems.len());
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::Credentials;
use crate::document::JsonMap;
use crate::error::{Error, Result};
use crate::session::{SessionManager, SessionToken};
use crate::transport::{GatewayTransport, gateway_url};

/// Longest response body excerpt carried in an error.
const MAX_ERROR_BODY: usize = 512;

/// Issues authenticated GET requests and parses JSON responses.
#[derive(Debug)]
pub struct ResourceClient<T> {
    transport: T,
    session: SessionManager,
}

impl<T: GatewayTransport> ResourceClient<T> {
    /// Create a client. The first request triggers the login.
    #[must_use]
    pub fn new(transport: T, credentials: Credentials) -> Self {
        Self {
            transport,
            session: SessionManager::new(credentials),
        }
    }

    /// The session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Log in if needed and return the session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the login fails.
    pub async fn authenticate(&self) -> Result<&SessionToken> {
        self.session.token(&self.transport).await
    }

    /// Absolute URL of `endpoint` carrying the username and session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCluster`] when the gateway manages no cluster, or
    /// the login error.
    pub async fn url_for(&self, endpoint: &str) -> Result<Url> {
        match self.authenticate().await? {
            SessionToken::Active(token) => {
                gateway_url(self.session.credentials(), token, endpoint)
            }
            SessionToken::NoCluster => Err(Error::NoCluster),
        }
    }

    /// GET `endpoint` and parse the body as JSON. An empty body is `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] on transport failure, a non-2xx status or
    /// an unparseable body.
    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        let url = self.url_for(endpoint).await?;
        debug!(endpoint, "GET");

        let response = self
            .transport
            .get(&url)
            .await
            .map_err(|e| Error::request(endpoint, e.to_string()))?;

        if !response.is_success() {
            return Err(Error::request(
                endpoint,
                format!("HTTP {}: {}", response.status, excerpt(&response.body)),
            ));
        }

        let body = response.body.trim();
        trace!(endpoint, bytes = body.len(), "response received");
        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(body).map_err(|e| Error::request(endpoint, format!("invalid JSON: {e}")))
    }

    /// GET a list of objects. A `null` or empty body is an empty list.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`Error::UnexpectedPayload`] if the body
    /// is not an array of objects.
    pub async fn get_list(&self, endpoint: &str) -> Result<Vec<JsonMap>> {
        let value = self.get(endpoint).await?;
        into_list(endpoint, value)
    }

    /// GET an object. A `null` or empty body is an empty object.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`Error::UnexpectedPayload`] if the body
    /// is not an object.
    pub async fn get_map(&self, endpoint: &str) -> Result<JsonMap> {
        match self.get(endpoint).await? {
            Value::Null => Ok(JsonMap::new()),
            Value::Object(map) => Ok(map),
            _ => Err(Error::unexpected(endpoint, "an object")),
        }
    }
}

fn into_list(endpoint: &str, value: Value) -> Result<Vec<JsonMap>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(Error::unexpected(endpoint, "an array of objects")),
            })
            .collect(),
        _ => Err(Error::unexpected(endpoint, "an array of objects")),
    }
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeGateway;
    use serde_json::json;
    use test_case::test_case;

    const SYSTEMS: &str = "api/types/System/instances";

    fn client(gateway: FakeGateway) -> ResourceClient<FakeGateway> {
        ResourceClient::new(gateway, Credentials::new("gw", 443, "admin", "Password1"))
    }

    #[tokio::test]
    async fn test_requests_carry_username_and_token() {
        let client = client(
            FakeGateway::new()
                .with_login("TOKEN")
                .json(SYSTEMS, json!([{"id": "sys1"}])),
        );

        client.get(SYSTEMS).await.unwrap();

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].endpoint, SYSTEMS);
        assert_eq!(requests[1].username, "admin");
        assert_eq!(requests[1].secret.as_deref(), Some("TOKEN"));
    }

    #[tokio::test]
    async fn test_many_calls_login_once() {
        let client = client(
            FakeGateway::new()
                .with_login("TOKEN")
                .json(SYSTEMS, json!([])),
        );

        for _ in 0..5 {
            client.get_list(SYSTEMS).await.unwrap();
        }

        assert_eq!(client.session().login_attempts(), 1);
        assert_eq!(client.transport().count("api/login"), 1);
        assert_eq!(client.transport().count(SYSTEMS), 5);
    }

    #[test_case("" ; "empty body")]
    #[test_case("  \n" ; "whitespace body")]
    #[test_case("null" ; "null body")]
    #[test_case("[]" ; "empty array")]
    #[tokio::test]
    async fn test_missing_list_is_empty(body: &str) {
        let client = client(FakeGateway::new().with_login("T").route(SYSTEMS, 200, body));
        assert!(client.get_list(SYSTEMS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_map_is_empty() {
        let endpoint = "api/instances/System::sys1/relationships/Statistics";
        let client = client(FakeGateway::new().with_login("T").route(endpoint, 200, ""));
        assert!(client.get_map(endpoint).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_of_scalars_is_unexpected() {
        let client = client(FakeGateway::new().with_login("T").json(SYSTEMS, json!([1, 2])));
        let err = client.get_list(SYSTEMS).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedPayload { .. }));
    }

    #[tokio::test]
    async fn test_object_for_list_is_unexpected() {
        let client = client(FakeGateway::new().with_login("T").json(SYSTEMS, json!({"id": "x"})));
        assert!(client.get_list(SYSTEMS).await.is_err());
    }

    #[tokio::test]
    async fn test_non_success_status_is_request_error() {
        let client = client(FakeGateway::new().with_login("T").route(
            SYSTEMS,
            500,
            r#"{"message":"internal error"}"#,
        ));

        match client.get(SYSTEMS).await.unwrap_err() {
            Error::Request { endpoint, reason } => {
                assert_eq!(endpoint, SYSTEMS);
                assert!(reason.contains("HTTP 500"));
                assert!(reason.contains("internal error"));
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_request_error() {
        let client = client(FakeGateway::new().with_login("T").unreachable(SYSTEMS));
        let err = client.get(SYSTEMS).await.unwrap_err();
        assert!(matches!(err, Error::Request { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_request_error() {
        let client = client(FakeGateway::new().with_login("T").route(SYSTEMS, 200, "<html>"));
        let err = client.get(SYSTEMS).await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_no_cluster_refuses_requests() {
        let client = client(FakeGateway::new().route(
            "api/login",
            500,
            r#"{"message":"no MDM IP is set"}"#,
        ));

        let err = client.get(SYSTEMS).await.unwrap_err();
        assert!(matches!(err, Error::NoCluster));
        assert_eq!(client.transport().count(SYSTEMS), 0);
    }

    #[tokio::test]
    async fn test_login_failure_propagates() {
        let client = client(FakeGateway::new().route("api/login", 401, r#"{"message":"Unauthorized"}"#));
        let err = client.get(SYSTEMS).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(MAX_ERROR_BODY);
        let cut = excerpt(&body);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
