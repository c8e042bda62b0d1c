//! Content Store Capability
//!
//! A content handle is the versioned, file-tree-like object holding one entity's
//! files. Writes are staged on the handle and become durable on `commit`; staged
//! state is never visible through another handle.

use crate::error::MappingResult;
use crate::records::types::EntityKey;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
}

#[async_trait]
pub trait ContentHandle: Send + Sync {
    /// Content-addressed identifier the logical domain is derived from.
    fn anchor_id(&self) -> &str;

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> MappingResult<()>;

    /// Removes a file or a whole subtree. With `ignore_error` a missing path is not an error.
    async fn delete(&self, path: &str, ignore_error: bool) -> MappingResult<()>;

    async fn list_folders(&self, path: &str) -> MappingResult<Vec<String>>;

    async fn list_files(&self, path: &str) -> MappingResult<Vec<String>>;

    /// `None` when nothing exists at `path`.
    async fn stat(&self, path: &str) -> MappingResult<Option<EntryType>>;

    async fn read_file(&self, path: &str) -> MappingResult<Vec<u8>>;

    /// Makes every staged change durable.
    async fn commit(&self) -> MappingResult<()>;

    async fn commit_batch(&self) -> MappingResult<()> {
        self.commit().await
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Opens (creating on first use) the content of an entity. Each call gets its own
    /// staging area.
    async fn open(&self, entity: &EntityKey) -> MappingResult<Arc<dyn ContentHandle>>;
}

/// Normalizes a content path to `/a/b` form.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}
