//! The fact document produced by a discovery run.
//!
//! Gateway objects and statistics are kept as open JSON maps: their shape
//! depends on the gateway version and is passed through untouched.
//!
//! ```text
//! FactDocument
//! ├── general            (System object)
//! ├── statistics
//! ├── sdc_list[]
//! ├── fault_sets[]
//! └── protection_domain_list[]
//!     ├── general, statistics, sds_list[]
//!     ├── acceleration_pool[], acceleration_pool_devices[]
//!     └── storage_pool_list[]
//!         └── <pool attributes>, statistics, disk_list[], volume_list[]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enrichment::OsEnrichment;
use crate::error::Result;

/// Open JSON object.
pub type JsonMap = Map<String, Value>;

/// Device type reported to the orchestrator.
pub const DEVICE_TYPE: &str = "script";

/// Keys a storage pool carries alongside its own attributes.
const STORAGE_POOL_FIELDS: [&str; 3] = ["statistics", "disk_list", "volume_list"];

/// Names the document is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable certificate name derived from the gateway address.
    pub certname: String,
    /// Display name.
    pub name: String,
    /// Collection time.
    pub update_time: DateTime<Utc>,
}

/// Root inventory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDocument {
    /// Certificate name.
    pub certname: String,
    /// Display name.
    pub name: String,
    /// Collection time.
    pub update_time: DateTime<Utc>,
    /// Device type marker.
    pub device_type: String,
    /// The System object.
    #[serde(default)]
    pub general: JsonMap,
    /// System statistics.
    #[serde(default)]
    pub statistics: JsonMap,
    /// SDC (client) nodes.
    #[serde(default)]
    pub sdc_list: Vec<JsonMap>,
    /// Protection domains in gateway order.
    #[serde(default)]
    pub protection_domain_list: Vec<ProtectionDomainFacts>,
    /// Fault sets.
    #[serde(default)]
    pub fault_sets: Vec<JsonMap>,
    /// Installed gateway package version.
    #[serde(default)]
    pub gateway_version: Option<String>,
    /// IPv4 addresses of the gateway host.
    #[serde(default)]
    pub ip_addresses: Option<Vec<String>>,
    /// Raw OS facts of the gateway host.
    #[serde(default)]
    pub os_facts: Option<JsonMap>,
}

impl FactDocument {
    /// Start a document for `system`. Collections begin empty.
    #[must_use]
    pub fn new(identity: Identity, system: JsonMap) -> Self {
        Self {
            certname: identity.certname,
            name: identity.name,
            update_time: identity.update_time,
            device_type: DEVICE_TYPE.to_string(),
            general: system,
            statistics: JsonMap::new(),
            sdc_list: Vec::new(),
            protection_domain_list: Vec::new(),
            fault_sets: Vec::new(),
            gateway_version: None,
            ip_addresses: None,
            os_facts: None,
        }
    }

    /// Minimal document for a gateway without a configured cluster.
    #[must_use]
    pub fn degraded(identity: Identity) -> Self {
        let mut general = JsonMap::new();
        general.insert("name".to_string(), Value::String(identity.name.clone()));
        Self::new(identity, general)
    }

    /// Merge OS enrichment into the document.
    #[must_use]
    pub fn with_enrichment(mut self, enrichment: OsEnrichment) -> Self {
        self.gateway_version = enrichment.gateway_version;
        self.ip_addresses = enrichment.ip_addresses;
        self.os_facts = enrichment.os_facts;
        self
    }

    /// Whether the document identifies nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.general.is_empty()
    }

    /// Total number of storage pools across all protection domains.
    #[must_use]
    pub fn storage_pool_count(&self) -> usize {
        self.protection_domain_list
            .iter()
            .map(|pd| pd.storage_pool_list.len())
            .sum()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One protection domain with everything collected beneath it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtectionDomainFacts {
    /// The ProtectionDomain object.
    #[serde(default)]
    pub general: JsonMap,
    /// Domain statistics.
    #[serde(default)]
    pub statistics: JsonMap,
    /// Storage pools in gateway order.
    #[serde(default)]
    pub storage_pool_list: Vec<StoragePoolFacts>,
    /// SDS (server) nodes.
    #[serde(default)]
    pub sds_list: Vec<JsonMap>,
    /// Acceleration pool, empty when the domain has none.
    #[serde(default)]
    pub acceleration_pool: Vec<JsonMap>,
    /// Devices of the acceleration pool.
    #[serde(default)]
    pub acceleration_pool_devices: Vec<JsonMap>,
}

/// One storage pool. Serialized flat: the pool's own attributes sit next to
/// `statistics`, `disk_list` and `volume_list`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoragePoolFacts {
    /// The StoragePool object.
    #[serde(flatten)]
    pub general: JsonMap,
    /// Pool statistics.
    #[serde(default)]
    pub statistics: JsonMap,
    /// Devices backing the pool.
    #[serde(default)]
    pub disk_list: Vec<JsonMap>,
    /// Volumes carved from the pool.
    #[serde(default)]
    pub volume_list: Vec<JsonMap>,
}

impl StoragePoolFacts {
    /// Assemble a pool. Attributes that would shadow the collected fields
    /// are dropped.
    #[must_use]
    pub fn new(
        mut general: JsonMap,
        statistics: JsonMap,
        disk_list: Vec<JsonMap>,
        volume_list: Vec<JsonMap>,
    ) -> Self {
        for key in STORAGE_POOL_FIELDS {
            general.remove(key);
        }
        Self {
            general,
            statistics,
            disk_list,
            volume_list,
        }
    }
}
