//! Fixed-URL Propagator
//!
//! Sends alias calls to a domain's replicas with a sequential fallback policy: one
//! PUT per replica, in resolver order, no retry, stopping at the first 2xx. When no
//! replica accepts, the call fails after exactly one attempt per replica.
//!
//! Idempotency is the replica's job; registering the same path twice is expected
//! to be harmless there.

use super::types::{AliasAction, AliasDescriptor, PropagationOutcome, ReplicaSet};
use crate::error::{MappingError, MappingResult};

use anyhow::Result;
use std::time::Duration;

pub struct FixedUrlPropagator {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl FixedUrlPropagator {
    /// # Arguments
    /// * `timeout` - Deadline of each individual replica call.
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    pub async fn propagate(
        &self,
        action: AliasAction,
        descriptor: &AliasDescriptor,
        replicas: &ReplicaSet,
    ) -> MappingResult<PropagationOutcome> {
        let path = descriptor.canonical_path(action, &replicas.domain);

        let mut attempts = 0;
        for replica in &replicas.endpoints {
            attempts += 1;
            let url = replica.url_for(&path);

            match self.put(&url, descriptor.kind.as_str()).await {
                Ok(()) => {
                    tracing::debug!(
                        "{:?} {} accepted by {} after {} attempt(s)",
                        action,
                        descriptor.kind.as_str(),
                        replica,
                        attempts
                    );
                    return Ok(PropagationOutcome {
                        replica: replica.clone(),
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Not able to fix the url for {} endpoint: {} domain: {}: {}",
                        descriptor.kind.as_str(),
                        replica,
                        replicas.domain,
                        e
                    );
                }
            }
        }

        Err(MappingError::AllReplicasFailed { attempts })
    }

    async fn put(&self, url: &str, body: &'static str) -> Result<()> {
        let response = self
            .http_client
            .put(url)
            .body(body)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Replica answered {}", response.status()));
        }
        Ok(())
    }
}

impl Default for FixedUrlPropagator {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

