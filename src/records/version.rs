//! Version Ledger
//!
//! Every successful mutating mapping bumps the integer `version` of the entity it
//! touched. The increment is an optimistic read-modify-write: the new record is only
//! written if the stored version is still the one that was read.

use super::store::{EntityStore, record_version};
use super::types::EntityKey;
use crate::error::{MappingError, MappingResult};

use serde_json::Value;
use std::sync::Arc;

/// Attempts made before a contended increment gives up with `VersionConflict`.
pub const MAX_VERSION_ATTEMPTS: usize = 3;

pub struct VersionLedger {
    store: Arc<dyn EntityStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Increments the persisted version of `entity` by one and returns the new value.
    ///
    /// # Errors
    /// * `EntityNotFound` if the entity has no record.
    /// * `VersionConflict` if every attempt lost the race against a concurrent writer.
    pub async fn increase_version(&self, entity: &EntityKey) -> MappingResult<u64> {
        let table = entity.table();
        let pk = entity.pk();

        let mut last_error = None;
        for attempt in 0..MAX_VERSION_ATTEMPTS {
            let mut record = self
                .store
                .get_record(table, &pk)
                .await?
                .ok_or_else(|| MappingError::EntityNotFound(entity.to_string()))?;

            let current = record_version(&record);
            let next = current + 1;
            match record.as_object_mut() {
                Some(fields) => {
                    fields.insert("version".to_string(), Value::from(next));
                }
                None => {
                    return Err(MappingError::StorageWrite(format!(
                        "record {} is not an object",
                        entity
                    )));
                }
            }

            match self
                .store
                .update_record_versioned(table, &pk, current, record)
                .await
            {
                Ok(()) => {
                    tracing::debug!("Version of {} is now {}", entity, next);
                    return Ok(next);
                }
                Err(e @ MappingError::VersionConflict { .. }) => {
                    tracing::debug!(
                        "Version conflict on {} (attempt {}), re-reading",
                        entity,
                        attempt + 1
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| MappingError::VersionConflict {
            table: table.to_string(),
            pk,
            expected: 0,
        }))
    }

    /// Current persisted version, `None` when the entity does not exist.
    pub async fn current_version(&self, entity: &EntityKey) -> MappingResult<Option<u64>> {
        Ok(self
            .store
            .get_record(entity.table(), &entity.pk())
            .await?
            .map(|record| record_version(&record)))
    }
}
