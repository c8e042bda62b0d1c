//! Audit Logger
//!
//! Appends one immutable entry per mapping to the `logs` table. The audit trail is
//! supplementary: nothing here can fail a mapping, store errors are only reported
//! through tracing.

use super::store::EntityStore;
use super::types::{AuditLogEntry, Diff, LOGS_TABLE, now_ms};
use crate::error::MappingError;
use crate::message::Message;

use serde_json::Value;
use std::sync::Arc;

const TIMESTAMP_INDEX: &str = "__timestamp";

pub struct AuditLogger {
    store: Arc<dyn EntityStore>,
}

/// Where a mapping ended up, as far as the audit trail is concerned.
pub struct AuditContext<'a> {
    pub domain: Option<&'a str>,
    pub anchor_id: Option<&'a str>,
    pub metadata: &'a Value,
    pub existed_before: bool,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Records a successful mapping.
    pub async fn log_action(&self, message: &Message, ctx: AuditContext<'_>, diff: &Diff) {
        let entry = build_entry(message, &ctx, Some(diff.clone()), None);
        self.append(entry).await;
    }

    /// Records a mapping that was rejected or failed part way.
    pub async fn log_failure(&self, message: &Message, ctx: AuditContext<'_>, error: &MappingError) {
        let entry = build_entry(message, &ctx, None, Some(error));
        self.append(entry).await;
    }

    async fn append(&self, entry: AuditLogEntry) {
        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize audit entry {}: {}", entry.id, e);
                return;
            }
        };

        if let Err(e) = self.store.add_index(LOGS_TABLE, TIMESTAMP_INDEX).await {
            tracing::error!("Failed to index audit table: {}", e);
        }

        match self.store.insert_record(LOGS_TABLE, &entry.id, value).await {
            Ok(()) => tracing::debug!(
                "Audit entry {} stored for {} {}",
                entry.id,
                entry.message_type,
                entry.action
            ),
            Err(e) => tracing::error!("Failed to store audit entry {}: {}", entry.id, e),
        }
    }

    /// Audit entries, newest first, optionally restricted to one domain.
    pub async fn entries(&self, domain: Option<&str>) -> Vec<AuditLogEntry> {
        let records = match self.store.list_records(LOGS_TABLE).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to list audit entries: {}", e);
                return Vec::new();
            }
        };

        let mut entries: Vec<AuditLogEntry> = records
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .filter(|entry: &AuditLogEntry| {
                domain.is_none() || entry.domain.as_deref() == domain
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

fn build_entry(
    message: &Message,
    ctx: &AuditContext<'_>,
    diff: Option<Diff>,
    error: Option<&MappingError>,
) -> AuditLogEntry {
    AuditLogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        message_id: message.header.message_id.clone(),
        sender_id: message.header.sender_id.clone(),
        message_type: message.kind().as_str().to_string(),
        action: message.action().as_str().to_string(),
        item_code: message.entity_key().pk(),
        domain: ctx.domain.map(str::to_string),
        anchor_id: ctx.anchor_id.map(str::to_string),
        existed_before: ctx.existed_before,
        before: ctx.metadata.clone(),
        diff,
        success: error.is_none(),
        error: error.map(|e| format!("{}: {}", e.code(), e)),
        timestamp: now_ms(),
    }
}
