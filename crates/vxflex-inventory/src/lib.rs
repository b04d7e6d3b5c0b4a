//! # vxflex-inventory
//!
//! Inventory collection for VxFlex OS (`ScaleIO`) gateways.
//!
//! Logs in to the gateway REST API, walks the storage hierarchy and
//! assembles a single [`FactDocument`] describing the cluster:
//!
//! ```text
//! ┌──────────────┐  login / GET   ┌──────────────────┐
//! │  Collector   │───────────────►│  VxFlex gateway  │
//! │  (session,   │◄───────────────│  /api/...        │
//! │   client)    │      JSON      └──────────────────┘
//! └──────┬───────┘
//!        │ optional
//!        ▼
//! ┌──────────────┐
//! │  OS facts    │  external command
//! └──────────────┘
//! ```
//!
//! A gateway that manages no cluster ("no MDM IP is set") still yields a
//! minimal document naming the appliance.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vxflex_inventory::{discover, Credentials, DiscoveryConfig};
//! use vxflex_inventory::enrichment::CommandOsFacts;
//!
//! # async fn example() -> vxflex_inventory::Result<()> {
//! let config = DiscoveryConfig::new(Credentials::new("10.1.1.5", 443, "admin", "Password1"));
//! let document = discover(&config, None::<CommandOsFacts>).await?;
//! println!("{}", document.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod client;
pub mod collector;
pub mod config;
pub mod document;
pub mod enrichment;
pub mod error;
pub mod session;
pub mod transport;

pub use certificate::{CertificateProbe, TlsCertificateProbe};
pub use client::ResourceClient;
pub use collector::Collector;
pub use config::{Credentials, DiscoveryConfig, OsLogin};
pub use document::{FactDocument, JsonMap, ProtectionDomainFacts, StoragePoolFacts};
pub use enrichment::{CommandOsFacts, EnrichmentError, OsFactsSource};
pub use error::{Error, Result};
pub use session::{SessionManager, SessionToken};
pub use transport::{GatewayTransport, HttpTransport};

/// Collect the inventory of the gateway described by `config`.
///
/// Uses the HTTPS transport and TLS certificate probe. `os_facts` is
/// consulted only when `config.os_login` is set; pass `None` to skip it.
///
/// # Errors
///
/// Returns [`Error::Config`] for an invalid configuration,
/// [`Error::Timeout`] when `config.timeout` elapses, or the collection error.
pub async fn discover<S: OsFactsSource>(config: &DiscoveryConfig, os_facts: S) -> Result<FactDocument> {
    config.validate()?;
    let transport = HttpTransport::new()?;
    let collector = Collector::new(config.clone(), transport, TlsCertificateProbe::default(), os_facts);
    collector.collect_with_timeout().await
}
