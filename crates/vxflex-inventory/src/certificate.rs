//! Gateway certificate probe.
//!
//! Gateways usually present a self-signed certificate whose issuer common
//! name is the name the appliance was installed under. The probe performs a
//! bare TLS handshake, independent of the REST session, to read it.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Default bound on the whole probe, connect and handshake included.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Looks up the issuer common name of the gateway certificate.
///
/// This trait allows for testing with fake implementations.
pub trait CertificateProbe: Send + Sync {
    /// Issuer CN presented at `host:port`, or `None` on any failure.
    fn issuer_common_name(
        &self,
        host: &str,
        port: u16,
    ) -> impl std::future::Future<Output = Option<String>> + Send;
}

/// Probe using a native TLS handshake with verification disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsCertificateProbe {
    timeout: Duration,
}

impl Default for TlsCertificateProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl TlsCertificateProbe {
    /// Create a probe bounded by `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CertificateProbe for TlsCertificateProbe {
    async fn issuer_common_name(&self, host: &str, port: u16) -> Option<String> {
        let target = host.to_string();
        let timeout = self.timeout;
        let handshake =
            tokio::task::spawn_blocking(move || fetch_peer_certificate(&target, port, timeout));

        // Socket timeouts bound each read, not the handshake as a whole.
        let der = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(Ok(der))) => der,
            Ok(Ok(Err(reason))) => {
                debug!(host, port, %reason, "certificate probe failed");
                return None;
            }
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "certificate probe task failed");
                return None;
            }
            Err(_) => {
                debug!(host, port, timeout_ms = timeout.as_millis() as u64, "certificate probe timed out");
                return None;
            }
        };

        let name = issuer_common_name(&der);
        debug!(host, port, issuer = ?name, "certificate probe finished");
        name
    }
}

/// DER bytes of the certificate presented at `host:port`.
fn fetch_peer_certificate(host: &str, port: u16, timeout: Duration) -> Result<Vec<u8>, String> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| format!("failed to build TLS connector: {e}"))?;

    let address = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("failed to resolve {host}: {e}"))?
        .next()
        .ok_or_else(|| format!("no address for {host}"))?;

    let stream = TcpStream::connect_timeout(&address, timeout)
        .map_err(|e| format!("failed to connect to {address}: {e}"))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|()| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| format!("failed to set socket timeout: {e}"))?;

    let tls = connector
        .connect(host, stream)
        .map_err(|e| format!("TLS handshake failed: {e}"))?;

    let certificate = tls
        .peer_certificate()
        .map_err(|e| format!("failed to read peer certificate: {e}"))?
        .ok_or_else(|| "gateway presented no certificate".to_string())?;

    certificate
        .to_der()
        .map_err(|e| format!("failed to encode certificate: {e}"))
}

/// Issuer common name of a DER-encoded certificate.
#[must_use]
pub fn issuer_common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    for rdn in cert.issuer().iter() {
        for attr in rdn.iter() {
            if attr.attr_type() == &x509_parser::oid_registry::OID_X509_COMMON_NAME {
                return attr
                    .as_str()
                    .ok()
                    .map(str::trim)
                    .filter(|cn| !cn.is_empty())
                    .map(String::from);
            }
        }
    }
    None
}

/// Probe returning a fixed answer, for tests.
#[cfg(test)]
pub(crate) struct FixedProbe {
    name: Option<String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FixedProbe {
    pub(crate) fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(String::from),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CertificateProbe for FixedProbe {
    async fn issuer_common_name(&self, _host: &str, _port: u16) -> Option<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.name.clone()
    }
}
