//! OS-level enrichment of the gateway host.
//!
//! Package and network facts come from an [`OsFactsSource`]. How a source
//! reaches the host (SSH, Ansible, an agent) is its own business; the
//! collector only sees the parsed [`OsFacts`]. Failures here never abort a
//! run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::document::JsonMap;

/// Package whose version is reported as the gateway version.
pub const GATEWAY_PACKAGE: &str = "EMC-ScaleIO-gateway";

/// Environment variable carrying the OS password to a facts command.
pub const OS_PASSWORD_ENV: &str = "OS_PASSWORD";

/// Longest stderr excerpt carried in an error.
const MAX_STDERR: usize = 512;

/// Reasons enrichment produced nothing.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// No OS login or source was configured.
    #[error("OS enrichment is not configured")]
    NotConfigured,

    /// The facts command could not be started.
    #[error("failed to start facts command: {0}")]
    Spawn(String),

    /// The facts command exited unsuccessfully.
    #[error("facts command failed with status {status:?}: {stderr}")]
    CommandFailed {
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Standard error excerpt.
        stderr: String,
    },

    /// The facts did not have the expected shape.
    #[error("invalid OS facts: {0}")]
    InvalidOutput(String),
}

/// What a source needs to reach the gateway host.
#[derive(Clone, PartialEq, Eq)]
pub struct OsFactsRequest {
    /// Gateway host.
    pub server: String,
    /// Credential identifier.
    pub credential_id: Option<String>,
    /// OS user.
    pub username: String,
    /// OS password.
    pub password: Option<String>,
}

impl fmt::Debug for OsFactsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsFactsRequest")
            .field("server", &self.server)
            .field("credential_id", &self.credential_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One installed package record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package version.
    #[serde(default)]
    pub version: Option<String>,
    /// Package release.
    #[serde(default)]
    pub release: Option<String>,
    /// Remaining attributes (arch, epoch, source...).
    #[serde(flatten)]
    pub other: JsonMap,
}

/// Parsed OS facts of the gateway host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsFacts {
    /// Installed packages by name.
    pub packages: BTreeMap<String, Vec<PackageRecord>>,
    /// `ansible_all_ipv4_addresses`, when reported.
    pub ipv4_addresses: Option<Vec<String>>,
    /// The facts object as received.
    pub raw: JsonMap,
}

impl OsFacts {
    /// Parse facts from a JSON value. Accepts the facts object itself or an
    /// Ansible-style `{"ansible_facts": {...}}` wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError::InvalidOutput`] if the value is not an
    /// object or `packages` / `ansible_all_ipv4_addresses` are malformed.
    pub fn from_value(value: Value) -> Result<Self, EnrichmentError> {
        let Value::Object(mut map) = value else {
            return Err(EnrichmentError::InvalidOutput(
                "expected a JSON object".to_string(),
            ));
        };

        let raw = match map.remove("ansible_facts") {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                map.insert("ansible_facts".to_string(), other);
                map
            }
            None => map,
        };

        let packages = match raw.get("packages") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| EnrichmentError::InvalidOutput(format!("packages: {e}")))?,
            None => BTreeMap::new(),
        };

        let ipv4_addresses = match raw.get("ansible_all_ipv4_addresses") {
            Some(value) => Some(serde_json::from_value(value.clone()).map_err(|e| {
                EnrichmentError::InvalidOutput(format!("ansible_all_ipv4_addresses: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            packages,
            ipv4_addresses,
            raw,
        })
    }

    /// `<version>-<release>` of the first record of `package`.
    #[must_use]
    pub fn package_version(&self, package: &str) -> Option<String> {
        let record = self.packages.get(package)?.first()?;
        let version = record.version.as_deref().filter(|v| !v.is_empty())?;
        match record.release.as_deref() {
            Some(release) if !release.is_empty() => Some(format!("{version}-{release}")),
            _ => Some(version.to_string()),
        }
    }
}

/// Enrichment fields merged into the fact document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsEnrichment {
    /// Installed gateway package version.
    pub gateway_version: Option<String>,
    /// Host IPv4 addresses.
    pub ip_addresses: Option<Vec<String>>,
    /// Raw OS facts.
    pub os_facts: Option<JsonMap>,
}

impl OsEnrichment {
    /// Derive the document fields from parsed facts.
    #[must_use]
    pub fn from_facts(facts: OsFacts) -> Self {
        Self {
            gateway_version: facts.package_version(GATEWAY_PACKAGE),
            ip_addresses: facts.ipv4_addresses,
            os_facts: Some(facts.raw),
        }
    }
}

/// Supplies OS facts for the gateway host.
///
/// This trait allows for testing with fake implementations.
pub trait OsFactsSource: Send + Sync {
    /// Gather facts for `request.server`.
    ///
    /// # Errors
    ///
    /// Returns an [`EnrichmentError`]; callers treat it as missing facts.
    fn gather(
        &self,
        request: &OsFactsRequest,
    ) -> impl std::future::Future<Output = Result<OsFacts, EnrichmentError>> + Send;
}

// `None` means enrichment is not configured.
impl<S: OsFactsSource> OsFactsSource for Option<S> {
    async fn gather(&self, request: &OsFactsRequest) -> Result<OsFacts, EnrichmentError> {
        match self {
            Some(source) => source.gather(request).await,
            None => Err(EnrichmentError::NotConfigured),
        }
    }
}

/// Runs an external program that prints the host's facts as JSON.
///
/// Invoked as `<program> --server <host> [--credential-id <id>] --username
/// <user>` with the password in [`OS_PASSWORD_ENV`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOsFacts {
    program: PathBuf,
}

impl CommandOsFacts {
    /// Create a source running `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program path.
    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl OsFactsSource for CommandOsFacts {
    async fn gather(&self, request: &OsFactsRequest) -> Result<OsFacts, EnrichmentError> {
        let mut command = Command::new(&self.program);
        command
            .arg("--server")
            .arg(&request.server)
            .arg("--username")
            .arg(&request.username)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(id) = &request.credential_id {
            command.arg("--credential-id").arg(id);
        }
        if let Some(password) = &request.password {
            command.env(OS_PASSWORD_ENV, password);
        }

        debug!(program = %self.program.display(), server = %request.server, "gathering OS facts");
        let output = command
            .output()
            .await
            .map_err(|e| EnrichmentError::Spawn(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let stderr = stderr
                .char_indices()
                .nth(MAX_STDERR)
                .map_or(stderr, |(end, _)| &stderr[..end]);
            return Err(EnrichmentError::CommandFailed {
                status: output.status.code(),
                stderr: stderr.to_string(),
            });
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| EnrichmentError::InvalidOutput(format!("stdout is not JSON: {e}")))?;
        OsFacts::from_value(value)
    }
}

/// Source returning fixed facts, for tests.
#[cfg(test)]
pub(crate) struct FakeOsFacts {
    facts: Option<Value>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FakeOsFacts {
    pub(crate) fn returning(facts: Value) -> Self {
        Self {
            facts: Some(facts),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            facts: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl OsFactsSource for FakeOsFacts {
    async fn gather(&self, _request: &OsFactsRequest) -> Result<OsFacts, EnrichmentError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.facts {
            Some(facts) => OsFacts::from_value(facts.clone()),
            None => Err(EnrichmentError::CommandFailed {
                status: Some(255),
                stderr: "ssh: connect to host gw port 22: Connection refused".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn request() -> OsFactsRequest {
        OsFactsRequest {
            server: "10.1.1.5".to_string(),
            credential_id: Some("cred-1".to_string()),
            username: "root".to_string(),
            password: Some("hunter2".to_string()),
        }
    }

    fn sample_facts() -> Value {
        json!({
            "packages": {
                "EMC-ScaleIO-gateway": [
                    {"name": "EMC-ScaleIO-gateway", "version": "3.0", "release": "1000.208", "arch": "x86_64"}
                ],
                "openssh": [{"version": "7.4", "release": "21.el7"}]
            },
            "ansible_all_ipv4_addresses": ["10.1.1.5", "192.168.10.5"],
            "ansible_os_family": "RedHat"
        })
    }

    #[test]
    fn test_enrichment_from_facts() {
        let facts = OsFacts::from_value(sample_facts()).unwrap();
        let enrichment = OsEnrichment::from_facts(facts);

        assert_eq!(enrichment.gateway_version.as_deref(), Some("3.0-1000.208"));
        assert_eq!(
            enrichment.ip_addresses,
            Some(vec!["10.1.1.5".to_string(), "192.168.10.5".to_string()])
        );
        let raw = enrichment.os_facts.unwrap();
        assert_eq!(raw["ansible_os_family"], json!("RedHat"));
    }

    #[test]
    fn test_ansible_wrapper_is_unwrapped() {
        let facts = OsFacts::from_value(json!({"ansible_facts": sample_facts(), "changed": false})).unwrap();
        assert!(facts.packages.contains_key(GATEWAY_PACKAGE));
        assert!(!facts.raw.contains_key("changed"));
    }

    #[test]
    fn test_missing_keys_yield_empty_enrichment() {
        let facts = OsFacts::from_value(json!({"ansible_hostname": "gw"})).unwrap();
        let enrichment = OsEnrichment::from_facts(facts);
        assert!(enrichment.gateway_version.is_none());
        assert!(enrichment.ip_addresses.is_none());
        assert!(enrichment.os_facts.is_some());
    }

    #[test_case(json!({"version": "2.6"}), Some("2.6") ; "no release")]
    #[test_case(json!({"version": "2.6", "release": ""}), Some("2.6") ; "empty release")]
    #[test_case(json!({"release": "11"}), None ; "no version")]
    #[test_case(json!({"version": "3.5", "release": "4500.104"}), Some("3.5-4500.104") ; "version and release")]
    fn test_package_version(record: Value, expected: Option<&str>) {
        let facts = OsFacts::from_value(json!({"packages": {GATEWAY_PACKAGE: [record]}})).unwrap();
        assert_eq!(facts.package_version(GATEWAY_PACKAGE).as_deref(), expected);
    }

    #[test_case(json!([1, 2]) ; "not an object")]
    #[test_case(json!({"packages": ["a"]}) ; "packages not a map")]
    #[test_case(json!({"ansible_all_ipv4_addresses": "10.0.0.1"}) ; "addresses not a list")]
    fn test_malformed_facts_rejected(value: Value) {
        assert!(matches!(
            OsFacts::from_value(value),
            Err(EnrichmentError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_request_debug_redacts_password() {
        let debug = format!("{:?}", request());
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unconfigured_source() {
        let source: Option<CommandOsFacts> = None;
        let err = source.gather(&request()).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::NotConfigured));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let source = CommandOsFacts::new("/nonexistent/vxflex-os-facts");
        let err = source.gather(&request()).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_command_error() {
        let source = CommandOsFacts::new("false");
        let err = source.gather(&request()).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::CommandFailed { status: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_fake_source_counts_calls() {
        let source = FakeOsFacts::returning(sample_facts());
        assert!(source.gather(&request()).await.is_ok());
        assert_eq!(source.calls(), 1);
        assert!(FakeOsFacts::failing().gather(&request()).await.is_err());
    }
}
