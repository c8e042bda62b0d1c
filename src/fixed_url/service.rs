//! Alias synchronisation seam.
//!
//! `AliasSync` is what mappings and the commit interceptor talk to. The production
//! implementation derives the domain from the anchoring identifier, resolves its
//! replicas and hands the call to the propagator; tests substitute their own.

use super::propagator::FixedUrlPropagator;
use super::resolver::{ReplicaResolver, logical_domain};
use super::types::{AliasStep, PropagationOutcome};
use crate::error::MappingResult;

use async_trait::async_trait;

#[async_trait]
pub trait AliasSync: Send + Sync {
    /// Applies one alias step for the content anchored at `anchor_id`.
    async fn apply(&self, anchor_id: &str, step: &AliasStep) -> MappingResult<PropagationOutcome>;
}

pub struct FixedUrlService {
    resolver: ReplicaResolver,
    propagator: FixedUrlPropagator,
}

impl FixedUrlService {
    pub fn new(resolver: ReplicaResolver, propagator: FixedUrlPropagator) -> Self {
        Self {
            resolver,
            propagator,
        }
    }
}

#[async_trait]
impl AliasSync for FixedUrlService {
    async fn apply(&self, anchor_id: &str, step: &AliasStep) -> MappingResult<PropagationOutcome> {
        let domain = logical_domain(anchor_id)?;
        let replicas = self.resolver.resolve(&domain).await?;
        self.propagator
            .propagate(step.action, &step.descriptor, &replicas)
            .await
    }
}
