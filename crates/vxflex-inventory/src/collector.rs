//! Hierarchy collector.
//!
//! Walks the gateway resources in a fixed order and assembles one
//! [`FactDocument`]:
//!
//! ```text
//! System ──┬── Statistics, Sdc, FaultSet
//!          └── ProtectionDomain ──┬── Statistics, Sds
//!                                 ├── AccelerationPool ── Device
//!                                 └── StoragePool ── Statistics, Device, Volume
//! ```
//!
//! Every request is awaited before the next is issued. Only the
//! acceleration pool lookup and OS enrichment are allowed to fail without
//! aborting the pass.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::certificate::CertificateProbe;
use crate::client::ResourceClient;
use crate::config::DiscoveryConfig;
use crate::document::{FactDocument, Identity, JsonMap, ProtectionDomainFacts, StoragePoolFacts};
use crate::enrichment::{EnrichmentError, OsEnrichment, OsFactsRequest, OsFactsSource};
use crate::error::{Error, Result};
use crate::transport::GatewayTransport;

/// System listing endpoint.
pub const SYSTEMS_ENDPOINT: &str = "api/types/System/instances";

/// `api/instances/<kind>::<id>/relationships/<relation>`.
#[must_use]
pub fn relationship(kind: &str, id: &str, relation: &str) -> String {
    format!("api/instances/{kind}::{id}/relationships/{relation}")
}

/// Fault sets of a system.
#[must_use]
pub fn fault_sets_endpoint(system_id: &str) -> String {
    format!("api/types/FaultSet/instances?systemId={system_id}")
}

/// Drives one collection pass against a gateway.
#[derive(Debug)]
pub struct Collector<T, P, S> {
    config: DiscoveryConfig,
    client: ResourceClient<T>,
    probe: P,
    os_facts: S,
}

impl<T, P, S> Collector<T, P, S>
where
    T: GatewayTransport,
    P: CertificateProbe,
    S: OsFactsSource,
{
    /// Create a collector.
    #[must_use]
    pub fn new(config: DiscoveryConfig, transport: T, probe: P, os_facts: S) -> Self {
        let client = ResourceClient::new(transport, config.credentials.clone());
        Self {
            config,
            client,
            probe,
            os_facts,
        }
    }

    /// The resource client.
    #[must_use]
    pub fn client(&self) -> &ResourceClient<T> {
        &self.client
    }

    /// Run [`Self::collect`] within the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the budget elapses, otherwise the
    /// collection error.
    pub async fn collect_with_timeout(&self) -> Result<FactDocument> {
        let budget = self.config.timeout;
        tokio::time::timeout(budget, self.collect())
            .await
            .map_err(|_| Error::Timeout(budget))?
    }

    /// Collect the full inventory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the login is rejected, [`Error::NoSystem`]
    /// if the gateway lists no system, or the first failing request.
    pub async fn collect(&self) -> Result<FactDocument> {
        let certname = self.config.certname();
        let update_time = Utc::now();

        if self.client.authenticate().await?.is_no_cluster() {
            let name = self.certificate_name().await.unwrap_or_else(|| certname.clone());
            info!(%name, "gateway has no configured cluster, reporting minimal inventory");
            return Ok(FactDocument::degraded(Identity {
                certname,
                name,
                update_time,
            }));
        }

        let mut system = self
            .client
            .get_list(SYSTEMS_ENDPOINT)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoSystem)?;
        let system_id = object_id(&system, SYSTEMS_ENDPOINT)?;

        let name = match non_empty_str(&system, "name") {
            Some(name) => name.to_string(),
            None => {
                let name = self.certificate_name().await.unwrap_or_else(|| certname.clone());
                system.insert("name".to_string(), Value::String(name.clone()));
                name
            }
        };
        debug!(system = %system_id, %name, "resolved system");

        let mut document = FactDocument::new(
            Identity {
                certname,
                name,
                update_time,
            },
            system,
        );

        document.statistics = self
            .client
            .get_map(&relationship("System", &system_id, "Statistics"))
            .await?;
        document.sdc_list = adopt(
            self.client
                .get_list(&relationship("System", &system_id, "Sdc"))
                .await?,
            "systemId",
            &system_id,
        );
        document.fault_sets = adopt(
            self.client.get_list(&fault_sets_endpoint(&system_id)).await?,
            "systemId",
            &system_id,
        );

        let domains_endpoint = relationship("System", &system_id, "ProtectionDomain");
        let domains = adopt(
            self.client.get_list(&domains_endpoint).await?,
            "systemId",
            &system_id,
        );
        for domain in domains {
            let facts = self
                .collect_protection_domain(domain, &domains_endpoint)
                .await?;
            document.protection_domain_list.push(facts);
        }

        if let Some(enrichment) = self.enrichment().await {
            document = document.with_enrichment(enrichment);
        }

        info!(
            system = %system_id,
            protection_domains = document.protection_domain_list.len(),
            storage_pools = document.storage_pool_count(),
            sdcs = document.sdc_list.len(),
            "inventory collected"
        );
        Ok(document)
    }

    /// `source` is the endpoint `general` was listed from.
    async fn collect_protection_domain(
        &self,
        general: JsonMap,
        source: &str,
    ) -> Result<ProtectionDomainFacts> {
        let id = object_id(&general, source)?;
        debug!(protection_domain = %id, "collecting protection domain");

        let statistics = self
            .client
            .get_map(&relationship("ProtectionDomain", &id, "Statistics"))
            .await?;
        let pools_endpoint = relationship("ProtectionDomain", &id, "StoragePool");
        let pools = adopt(
            self.client.get_list(&pools_endpoint).await?,
            "protectionDomainId",
            &id,
        );
        let sds_list = adopt(
            self.client
                .get_list(&relationship("ProtectionDomain", &id, "Sds"))
                .await?,
            "protectionDomainId",
            &id,
        );

        let (acceleration_pool, acceleration_pool_devices) =
            match self.collect_acceleration_pools(&id).await {
                Ok(collected) => collected,
                Err(e) => {
                    warn!(protection_domain = %id, error = %e, "acceleration pool lookup failed, treating as absent");
                    (Vec::new(), Vec::new())
                }
            };

        let mut storage_pool_list = Vec::with_capacity(pools.len());
        for pool in pools {
            storage_pool_list.push(self.collect_storage_pool(pool, &pools_endpoint).await?);
        }

        Ok(ProtectionDomainFacts {
            general,
            statistics,
            storage_pool_list,
            sds_list,
            acceleration_pool,
            acceleration_pool_devices,
        })
    }

    /// Acceleration pools of a protection domain and their devices. Any
    /// failure here discards both lists.
    async fn collect_acceleration_pools(
        &self,
        domain_id: &str,
    ) -> Result<(Vec<JsonMap>, Vec<JsonMap>)> {
        let endpoint = relationship("ProtectionDomain", domain_id, "AccelerationPool");
        let pools = adopt(
            self.client.get_list(&endpoint).await?,
            "protectionDomainId",
            domain_id,
        );

        let mut devices = Vec::new();
        for pool in &pools {
            let pool_id = object_id(pool, &endpoint)?;
            let listed = self
                .client
                .get_list(&relationship("AccelerationPool", &pool_id, "Device"))
                .await?;
            devices.extend(adopt(listed, "accelerationPoolId", &pool_id));
        }
        Ok((pools, devices))
    }

    async fn collect_storage_pool(&self, general: JsonMap, source: &str) -> Result<StoragePoolFacts> {
        let id = object_id(&general, source)?;
        debug!(storage_pool = %id, "collecting storage pool");

        let statistics = self
            .client
            .get_map(&relationship("StoragePool", &id, "Statistics"))
            .await?;
        let disk_list = adopt(
            self.client
                .get_list(&relationship("StoragePool", &id, "Device"))
                .await?,
            "storagePoolId",
            &id,
        );
        let volume_list = adopt(
            self.client
                .get_list(&relationship("StoragePool", &id, "Volume"))
                .await?,
            "storagePoolId",
            &id,
        );

        Ok(StoragePoolFacts::new(general, statistics, disk_list, volume_list))
    }

    async fn certificate_name(&self) -> Option<String> {
        let credentials = &self.config.credentials;
        self.probe
            .issuer_common_name(&credentials.host, credentials.port)
            .await
    }

    async fn enrichment(&self) -> Option<OsEnrichment> {
        let login = self.config.os_login.as_ref()?;
        let request = OsFactsRequest {
            server: self.config.credentials.host.clone(),
            credential_id: login.credential_id.clone(),
            username: login.username.clone(),
            password: login.password.clone(),
        };

        match self.os_facts.gather(&request).await {
            Ok(facts) => Some(OsEnrichment::from_facts(facts)),
            Err(EnrichmentError::NotConfigured) => {
                debug!("no OS facts source configured");
                None
            }
            Err(e) => {
                warn!(server = %request.server, error = %e, "OS enrichment failed, continuing without it");
                None
            }
        }
    }
}

/// String `id` of a gateway object.
fn object_id(object: &JsonMap, endpoint: &str) -> Result<String> {
    non_empty_str(object, "id")
        .map(str::to_string)
        .ok_or_else(|| Error::unexpected(endpoint, "objects with a string id"))
}

fn non_empty_str<'a>(object: &'a JsonMap, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Fill in the parent back-reference where the gateway left it out.
fn adopt(mut children: Vec<JsonMap>, key: &str, parent_id: &str) -> Vec<JsonMap> {
    for child in &mut children {
        if non_empty_str(child, key).is_none() {
            child.insert(key.to_string(), Value::String(parent_id.to_string()));
        }
    }
    children
}
