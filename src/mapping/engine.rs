//! Mapping Engine
//!
//! Front door of the mapping layer. Owns the registry and the shared collaborators,
//! builds a `MappingContext` for each incoming message and records failed mappings
//! in the audit log.

use super::handler::{MappingContext, MappingOptions};
use super::languages::LanguageCache;
use super::registry::{MappingRegistry, MappingReport};
use super::validation::{ContentSanitizer, ForbiddenTagSanitizer};
use crate::content::ContentStore;
use crate::error::{MappingError, MappingResult};
use crate::fixed_url::interceptor::CommitInterceptor;
use crate::fixed_url::service::AliasSync;
use crate::message::Message;
use crate::records::audit::{AuditContext, AuditLogger};
use crate::records::store::EntityStore;
use crate::records::types::{AuditLogEntry, EntityKey};
use crate::records::version::VersionLedger;

use serde_json::Value;
use std::sync::Arc;

pub struct MappingEngine {
    registry: Arc<MappingRegistry>,
    content: Arc<dyn ContentStore>,
    records: Arc<dyn EntityStore>,
    aliases: Arc<dyn AliasSync>,
    interceptor: Arc<CommitInterceptor>,
    ledger: Arc<VersionLedger>,
    audit: Arc<AuditLogger>,
    languages: Arc<LanguageCache>,
    sanitizer: Arc<dyn ContentSanitizer>,
    options: MappingOptions,
}

impl MappingEngine {
    /// Creates an engine with the default mappings and the forbidden-tag sanitizer.
    pub fn new(
        content: Arc<dyn ContentStore>,
        records: Arc<dyn EntityStore>,
        aliases: Arc<dyn AliasSync>,
        options: MappingOptions,
    ) -> Arc<Self> {
        Self::with_registry(
            MappingRegistry::with_default_mappings(),
            content,
            records,
            aliases,
            Arc::new(ForbiddenTagSanitizer::new()),
            options,
        )
    }

    /// Creates an engine around a caller-built registry and sanitizer.
    pub fn with_registry(
        registry: MappingRegistry,
        content: Arc<dyn ContentStore>,
        records: Arc<dyn EntityStore>,
        aliases: Arc<dyn AliasSync>,
        sanitizer: Arc<dyn ContentSanitizer>,
        options: MappingOptions,
    ) -> Arc<Self> {
        tracing::info!(
            "Mapping engine for {}/{} with {} mapping(s): {:?}",
            options.domain,
            options.subdomain,
            registry.handler_count(),
            registry.list_handlers()
        );

        Arc::new(Self {
            registry: Arc::new(registry),
            interceptor: Arc::new(CommitInterceptor::new(aliases.clone())),
            ledger: Arc::new(VersionLedger::new(records.clone())),
            audit: Arc::new(AuditLogger::new(records.clone())),
            languages: Arc::new(LanguageCache::new()),
            content,
            records,
            aliases,
            sanitizer,
            options,
        })
    }

    fn context(&self) -> MappingContext {
        MappingContext {
            content: self.content.clone(),
            records: self.records.clone(),
            aliases: self.aliases.clone(),
            interceptor: self.interceptor.clone(),
            ledger: self.ledger.clone(),
            audit: self.audit.clone(),
            languages: self.languages.clone(),
            sanitizer: self.sanitizer.clone(),
            options: self.options.clone(),
        }
    }

    /// Maps one message. Failures other than an unroutable message are audited
    /// before being returned.
    pub async fn dispatch(&self, message: Message) -> MappingResult<MappingReport> {
        let ctx = self.context();
        match self.registry.dispatch(&ctx, &message).await {
            Ok(report) => {
                tracing::info!(
                    "Mapped {} {} via '{}' -> {} v{}",
                    message.kind().as_str(),
                    message.action().as_str(),
                    report.handler,
                    report.entity,
                    report.version
                );
                Ok(report)
            }
            Err(e @ MappingError::NoMatchingHandler { .. }) => {
                tracing::warn!("Message {:?} dropped: {}", message.header.message_id, e);
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    "Mapping of {} {} for {} failed: {}",
                    message.kind().as_str(),
                    message.action().as_str(),
                    message.product_code(),
                    e
                );
                self.audit
                    .log_failure(
                        &message,
                        AuditContext {
                            domain: Some(&self.options.domain),
                            anchor_id: None,
                            metadata: &Value::Null,
                            existed_before: false,
                        },
                        &e,
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Audit entries, newest first. `None` returns every domain.
    pub async fn audit_entries(&self, domain: Option<&str>) -> Vec<AuditLogEntry> {
        self.audit.entries(domain).await
    }

    pub fn languages(&self, entity: &EntityKey) -> Vec<(String, Vec<String>)> {
        self.languages.all_for(entity)
    }

    pub async fn current_version(&self, entity: &EntityKey) -> MappingResult<Option<u64>> {
        self.ledger.current_version(entity).await
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }
}
