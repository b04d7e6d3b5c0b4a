//! Error types for gateway inventory collection.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an inventory collection pass.
#[derive(Debug, Error)]
pub enum Error {
    /// The gateway rejected the login for a reason other than a missing cluster.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A REST call failed after authentication.
    #[error("request to '{endpoint}' failed: {reason}")]
    Request {
        /// Endpoint path relative to the gateway root.
        endpoint: String,
        /// Transport error or HTTP status and body.
        reason: String,
    },

    /// The gateway answered with JSON of the wrong shape.
    #[error("unexpected payload from '{endpoint}': expected {expected}")]
    UnexpectedPayload {
        /// Endpoint path relative to the gateway root.
        endpoint: String,
        /// Description of the expected shape.
        expected: &'static str,
    },

    /// The gateway listed no system instances.
    #[error("gateway returned no system instances")]
    NoSystem,

    /// A resource was requested from a gateway with no configured cluster.
    #[error("gateway has no configured cluster")]
    NoCluster,

    /// The overall collection budget elapsed.
    #[error("inventory collection timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Request`] for `endpoint`.
    pub fn request(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::Request {
            endpoint: endpoint.to_owned(),
            reason: reason.into(),
        }
    }

    /// Build a [`Error::UnexpectedPayload`] for `endpoint`.
    #[must_use]
    pub fn unexpected(endpoint: &str, expected: &'static str) -> Self {
        Self::UnexpectedPayload {
            endpoint: endpoint.to_owned(),
            expected,
        }
    }

    /// Whether this error is the overall timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = Error::Auth("status 401: Unauthorized".to_string());
        assert_eq!(
            err.to_string(),
            "authentication failed: status 401: Unauthorized"
        );
    }

    #[test]
    fn test_request_error_carries_endpoint() {
        let err = Error::request("api/types/System/instances", "HTTP 500");
        assert_eq!(
            err.to_string(),
            "request to 'api/types/System/instances' failed: HTTP 500"
        );
    }

    #[test]
    fn test_unexpected_payload_display() {
        let err = Error::unexpected("api/login", "an object");
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn test_timeout_display_and_predicate() {
        let err = Error::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "inventory collection timed out after 300s");
        assert!(err.is_timeout());
        assert!(!Error::NoSystem.is_timeout());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("serialization error"));
    }
}
