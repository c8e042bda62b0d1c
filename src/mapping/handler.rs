//! Handler contract and per-dispatch context.

use super::languages::LanguageCache;
use super::validation::ContentSanitizer;
use crate::content::{ContentHandle, ContentStore};
use crate::error::{MappingError, MappingResult};
use crate::fixed_url::interceptor::CommitInterceptor;
use crate::fixed_url::service::AliasSync;
use crate::fixed_url::types::AliasPlan;
use crate::message::Message;
use crate::records::audit::AuditLogger;
use crate::records::store::EntityStore;
use crate::records::types::{Diff, EntityKey};
use crate::records::version::VersionLedger;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Deployment settings visible to mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingOptions {
    pub domain: String,
    pub subdomain: String,
}

/// Everything a mapping may touch. Built fresh for every dispatch; it only holds
/// shared handles to the service's collaborators, never per-message state.
#[derive(Clone)]
pub struct MappingContext {
    pub content: Arc<dyn ContentStore>,
    pub records: Arc<dyn EntityStore>,
    pub aliases: Arc<dyn AliasSync>,
    pub interceptor: Arc<CommitInterceptor>,
    pub ledger: Arc<VersionLedger>,
    pub audit: Arc<AuditLogger>,
    pub languages: Arc<LanguageCache>,
    pub sanitizer: Arc<dyn ContentSanitizer>,
    pub options: MappingOptions,
}

impl MappingContext {
    /// Commits `handle` and schedules `plan` once the commit is durable.
    pub async fn commit_with_aliases(
        &self,
        handle: Arc<dyn ContentHandle>,
        plan: AliasPlan,
    ) -> MappingResult<()> {
        self.interceptor.wrap(handle, plan).commit().await
    }

    /// Loads the persisted metadata of an entity, failing when it does not exist.
    pub async fn require_record(&self, entity: &EntityKey) -> MappingResult<Value> {
        self.records
            .get_record(entity.table(), &entity.pk())
            .await?
            .ok_or_else(|| MappingError::EntityNotFound(entity.to_string()))
    }
}

/// What a mapping changed, handed back to the framework for versioning and audit.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub entity: EntityKey,
    /// Metadata of the entity as it was before the mapping.
    pub metadata: Value,
    pub existed_before: bool,
    pub diff: Diff,
    pub anchor_id: String,
}

/// A validate-then-mutate unit of work for one family of messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks the message without touching any store.
    fn validate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<()>;

    /// Applies the message to the content store and commits it.
    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation>;
}
