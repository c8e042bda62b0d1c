//! Entity Record Store
//!
//! The persisted-entity capability consumed by the ledger, the audit logger and the
//! mappings. Records are JSON objects addressed by `(table, pk)`.
//!
//! `InMemoryEntityStore` keeps every table in a `DashMap`. The versioned update
//! holds the entry lock while comparing, so it is atomic per key.

use crate::error::{MappingError, MappingResult};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_record(&self, table: &str, pk: &str) -> MappingResult<Option<Value>>;

    /// Fails if a record with the same key already exists.
    async fn insert_record(&self, table: &str, pk: &str, record: Value) -> MappingResult<()>;

    /// Fails if no record with this key exists.
    async fn update_record(&self, table: &str, pk: &str, record: Value) -> MappingResult<()>;

    /// Replaces the record only if its current `version` equals `expected_version`.
    async fn update_record_versioned(
        &self,
        table: &str,
        pk: &str,
        expected_version: u64,
        record: Value,
    ) -> MappingResult<()>;

    async fn add_index(&self, table: &str, field: &str) -> MappingResult<()>;

    async fn list_records(&self, table: &str) -> MappingResult<Vec<Value>>;
}

/// Reads a record and deserializes it into `T`.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn EntityStore,
    table: &str,
    pk: &str,
) -> MappingResult<Option<T>> {
    match store.get_record(table, pk).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Inserts the record, or overwrites it when the key is already present.
pub async fn upsert<T: Serialize>(
    store: &dyn EntityStore,
    table: &str,
    pk: &str,
    record: &T,
) -> MappingResult<()> {
    let value = serde_json::to_value(record)?;
    if store.get_record(table, pk).await?.is_some() {
        store.update_record(table, pk, value).await
    } else {
        store.insert_record(table, pk, value).await
    }
}

/// Version field of a JSON record, `0` when absent.
pub fn record_version(record: &Value) -> u64 {
    record.get("version").and_then(Value::as_u64).unwrap_or(0)
}

pub struct InMemoryEntityStore {
    tables: Arc<DashMap<String, DashMap<String, Value>>>,
    indexes: Arc<DashMap<String, DashSet<String>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn has_index(&self, table: &str, field: &str) -> bool {
        self.indexes
            .get(table)
            .map(|fields| fields.contains(field))
            .unwrap_or(false)
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            indexes: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get_record(&self, table: &str, pk: &str) -> MappingResult<Option<Value>> {
        Ok(self
            .tables
            .get(table)
            .and_then(|t| t.get(pk).map(|record| record.value().clone())))
    }

    async fn insert_record(&self, table: &str, pk: &str, record: Value) -> MappingResult<()> {
        let table_map = self.tables.entry(table.to_string()).or_default();
        if table_map.contains_key(pk) {
            return Err(MappingError::StorageWrite(format!(
                "record {}/{} already exists",
                table, pk
            )));
        }
        table_map.insert(pk.to_string(), record);
        tracing::trace!("Inserted record {}/{}", table, pk);
        Ok(())
    }

    async fn update_record(&self, table: &str, pk: &str, record: Value) -> MappingResult<()> {
        let table_map = self
            .tables
            .get(table)
            .ok_or_else(|| MappingError::StorageWrite(format!("unknown table {}", table)))?;
        match table_map.get_mut(pk) {
            Some(mut existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(MappingError::StorageWrite(format!(
                "record {}/{} does not exist",
                table, pk
            ))),
        }
    }

    async fn update_record_versioned(
        &self,
        table: &str,
        pk: &str,
        expected_version: u64,
        record: Value,
    ) -> MappingResult<()> {
        let table_map = self
            .tables
            .get(table)
            .ok_or_else(|| MappingError::EntityNotFound(format!("{}/{}", table, pk)))?;
        let mut existing = table_map
            .get_mut(pk)
            .ok_or_else(|| MappingError::EntityNotFound(format!("{}/{}", table, pk)))?;

        if record_version(&existing) != expected_version {
            return Err(MappingError::VersionConflict {
                table: table.to_string(),
                pk: pk.to_string(),
                expected: expected_version,
            });
        }
        *existing = record;
        Ok(())
    }

    async fn add_index(&self, table: &str, field: &str) -> MappingResult<()> {
        self.indexes
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string());
        Ok(())
    }

    async fn list_records(&self, table: &str) -> MappingResult<Vec<Value>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default())
    }
}
