//! Node configuration.
//!
//! Every flag falls back to a `MAPPING_*` environment variable.

use crate::fixed_url::resolver::{HttpDiscovery, ReplicaDiscovery, StaticDiscovery};
use crate::mapping::MappingOptions;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "mapping-node", about = "Leaflet mapping engine node")]
pub struct Config {
    /// Address the HTTP API listens on.
    #[arg(long, env = "MAPPING_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Domain this node maps messages for.
    #[arg(long, env = "MAPPING_DOMAIN", default_value = "default")]
    pub domain: String,

    #[arg(long, env = "MAPPING_SUBDOMAIN", default_value = "default")]
    pub subdomain: String,

    /// Replica serving a domain's alias registry, as `DOMAIN=URL`. Repeatable; order is
    /// the fallback order.
    #[arg(long = "replica", env = "MAPPING_REPLICAS", value_delimiter = ',', value_parser = parse_replica)]
    pub replicas: Vec<(String, String)>,

    /// BDNS document URL. Takes precedence over `--replica`.
    #[arg(long, env = "MAPPING_BDNS_URL")]
    pub bdns_url: Option<String>,

    /// Per-attempt timeout of replica and discovery calls.
    #[arg(long, env = "MAPPING_REPLICA_TIMEOUT_MS", default_value_t = 2000)]
    pub replica_timeout_ms: u64,
}

fn parse_replica(raw: &str) -> Result<(String, String)> {
    let (domain, url) = raw
        .split_once('=')
        .with_context(|| format!("replica '{}' must be DOMAIN=URL", raw))?;
    let (domain, url) = (domain.trim(), url.trim());
    if domain.is_empty() || url.is_empty() {
        anyhow::bail!("replica '{}' must be DOMAIN=URL", raw);
    }
    Ok((domain.to_string(), url.to_string()))
}

impl Config {
    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }

    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions {
            domain: self.domain.clone(),
            subdomain: self.subdomain.clone(),
        }
    }

    /// The replica discovery selected by this configuration.
    pub fn discovery(&self) -> Arc<dyn ReplicaDiscovery> {
        if let Some(url) = &self.bdns_url {
            tracing::info!("Replica discovery via BDNS at {}", url);
            return Arc::new(HttpDiscovery::new(url, self.replica_timeout()));
        }

        let discovery = StaticDiscovery::new();
        for (domain, url) in &self.replicas {
            discovery.add_replica(domain, url);
        }
        tracing::info!("Static replica discovery with {} replica(s)", self.replicas.len());
        Arc::new(discovery)
    }
}
