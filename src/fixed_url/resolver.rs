//! Replica discovery and resolution.
//!
//! Replica sets are never cached: membership of a domain can change between two
//! mappings, so every propagation asks discovery again.

use super::types::{ReplicaEndpoint, ReplicaSet};
use crate::error::{MappingError, MappingResult};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Source of the base URLs hosting a domain's alias registry.
#[async_trait]
pub trait ReplicaDiscovery: Send + Sync {
    async fn anchoring_services(&self, domain: &str) -> Result<Vec<String>>;
}

/// Discovery backed by a fixed domain -> replicas table, usually loaded from configuration.
#[derive(Default)]
pub struct StaticDiscovery {
    services: DashMap<String, Vec<String>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(self, domain: &str, urls: Vec<String>) -> Self {
        self.set_domain(domain, urls);
        self
    }

    pub fn set_domain(&self, domain: &str, urls: Vec<String>) {
        self.services.insert(domain.to_string(), urls);
    }

    /// Adds one replica at the end of a domain's list.
    pub fn add_replica(&self, domain: &str, url: &str) {
        self.services
            .entry(domain.to_string())
            .or_default()
            .push(url.to_string());
    }
}

#[async_trait]
impl ReplicaDiscovery for StaticDiscovery {
    async fn anchoring_services(&self, domain: &str) -> Result<Vec<String>> {
        self.services
            .get(domain)
            .map(|urls| urls.value().clone())
            .ok_or_else(|| anyhow::anyhow!("Unknown domain: {}", domain))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainEntry {
    #[serde(default)]
    anchoring_services: Vec<String>,
}

/// Discovery reading a BDNS-style document (`{"<domain>": {"anchoringServices": [...]}}`)
/// over HTTP on every lookup.
pub struct HttpDiscovery {
    http_client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDiscovery {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ReplicaDiscovery for HttpDiscovery {
    async fn anchoring_services(&self, domain: &str) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("BDNS request failed {}", response.status()));
        }

        let mut document: HashMap<String, DomainEntry> = response.json().await?;
        document
            .remove(domain)
            .map(|entry| entry.anchoring_services)
            .ok_or_else(|| anyhow::anyhow!("Domain {} not present in BDNS", domain))
    }
}

/// Extracts the logical domain from an anchoring identifier (`ssi:<type>:<domain>:...`).
pub fn logical_domain(anchor_id: &str) -> MappingResult<String> {
    let mut segments = anchor_id.split(':');
    let scheme = segments.next();
    let _type = segments.next();
    let domain = segments.next();

    match (scheme, domain) {
        (Some("ssi"), Some(domain)) if !domain.is_empty() => Ok(domain.to_string()),
        _ => Err(MappingError::DomainResolution {
            domain: String::new(),
            reason: format!("malformed anchoring identifier '{}'", anchor_id),
        }),
    }
}

pub struct ReplicaResolver {
    discovery: Arc<dyn ReplicaDiscovery>,
}

impl ReplicaResolver {
    pub fn new(discovery: Arc<dyn ReplicaDiscovery>) -> Self {
        Self { discovery }
    }

    /// Maps a logical domain to its replicas, in discovery order.
    ///
    /// # Errors
    /// `DomainResolution` if discovery fails or returns no replica.
    pub async fn resolve(&self, domain: &str) -> MappingResult<ReplicaSet> {
        let urls = self
            .discovery
            .anchoring_services(domain)
            .await
            .map_err(|e| MappingError::DomainResolution {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;

        if urls.is_empty() {
            return Err(MappingError::DomainResolution {
                domain: domain.to_string(),
                reason: "no replicas".to_string(),
            });
        }

        tracing::debug!("Resolved {} replica(s) for domain {}", urls.len(), domain);

        Ok(ReplicaSet {
            domain: domain.to_string(),
            endpoints: urls.into_iter().map(ReplicaEndpoint).collect(),
        })
    }
}
