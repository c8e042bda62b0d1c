use super::store::{ContentHandle, ContentStore, EntryType, normalize_path};
use crate::error::{MappingError, MappingResult};
use crate::records::types::EntityKey;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct CommittedTree {
    files: BTreeMap<String, Vec<u8>>,
    revision: u64,
}

/// Durable content of one entity.
///
/// Mutations go through a [`ContentTransaction`] opened with [`begin`](Self::begin);
/// only committed state is stored here.
pub struct MemoryContentHandle {
    anchor_id: String,
    committed: RwLock<CommittedTree>,
}

impl MemoryContentHandle {
    pub fn new(anchor_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            anchor_id: anchor_id.into(),
            committed: RwLock::new(CommittedTree::default()),
        })
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    /// Opens a private staging area seeded from the committed files.
    pub async fn begin(self: &Arc<Self>) -> ContentTransaction {
        let view = self.committed.read().await.files.clone();
        ContentTransaction {
            content: self.clone(),
            staging: RwLock::new(Staging {
                view,
                changes: BTreeMap::new(),
            }),
        }
    }

    /// Number of successful commits.
    pub async fn revision(&self) -> u64 {
        self.committed.read().await.revision
    }

    pub async fn committed_file(&self, path: &str) -> Option<Vec<u8>> {
        self.committed
            .read()
            .await
            .files
            .get(&normalize_path(path))
            .cloned()
    }

    pub async fn committed_paths(&self) -> Vec<String> {
        self.committed.read().await.files.keys().cloned().collect()
    }
}

struct Staging {
    /// Committed files as of `begin`, with this transaction's changes applied.
    view: BTreeMap<String, Vec<u8>>,
    /// Path -> new bytes, or `None` for a removal.
    changes: BTreeMap<String, Option<Vec<u8>>>,
}

/// One mapping's uncommitted view of an entity's content.
///
/// Reads see the committed files plus this transaction's own writes. `commit`
/// applies the recorded changes to the latest committed tree, so concurrent
/// transactions on the same entity keep each other's committed files.
pub struct ContentTransaction {
    content: Arc<MemoryContentHandle>,
    staging: RwLock<Staging>,
}

/// Immediate children of `dir` among `paths`, split into (folders, files).
fn children<'a>(
    paths: impl Iterator<Item = &'a String>,
    dir: &str,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let prefix = if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    };

    let mut folders = BTreeSet::new();
    let mut files = BTreeSet::new();
    for path in paths {
        if let Some(rest) = path.strip_prefix(&prefix) {
            match rest.split_once('/') {
                Some((folder, _)) => {
                    folders.insert(folder.to_string());
                }
                None => {
                    files.insert(rest.to_string());
                }
            }
        }
    }
    (folders, files)
}

#[async_trait]
impl ContentHandle for ContentTransaction {
    fn anchor_id(&self) -> &str {
        &self.content.anchor_id
    }

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> MappingResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(MappingError::StorageWrite("cannot write to root".to_string()));
        }
        let mut staging = self.staging.write().await;
        staging.view.insert(path.clone(), bytes.clone());
        staging.changes.insert(path, Some(bytes));
        Ok(())
    }

    async fn delete(&self, path: &str, ignore_error: bool) -> MappingResult<()> {
        let path = normalize_path(path);
        let subtree = format!("{}/", path.trim_end_matches('/'));

        let mut staging = self.staging.write().await;
        let removed: Vec<String> = staging
            .view
            .keys()
            .filter(|key| *key == &path || key.starts_with(&subtree))
            .cloned()
            .collect();

        if removed.is_empty() && !ignore_error {
            return Err(MappingError::StorageWrite(format!(
                "nothing to delete at {}",
                path
            )));
        }
        for key in removed {
            staging.view.remove(&key);
            staging.changes.insert(key, None);
        }
        Ok(())
    }

    async fn list_folders(&self, path: &str) -> MappingResult<Vec<String>> {
        let staging = self.staging.read().await;
        let (folders, _) = children(staging.view.keys(), &normalize_path(path));
        Ok(folders.into_iter().collect())
    }

    async fn list_files(&self, path: &str) -> MappingResult<Vec<String>> {
        let staging = self.staging.read().await;
        let (_, files) = children(staging.view.keys(), &normalize_path(path));
        Ok(files.into_iter().collect())
    }

    async fn stat(&self, path: &str) -> MappingResult<Option<EntryType>> {
        let path = normalize_path(path);
        if path == "/" {
            return Ok(Some(EntryType::Folder));
        }

        let staging = self.staging.read().await;
        if staging.view.contains_key(&path) {
            return Ok(Some(EntryType::File));
        }
        let subtree = format!("{}/", path);
        if staging.view.keys().any(|key| key.starts_with(&subtree)) {
            return Ok(Some(EntryType::Folder));
        }
        Ok(None)
    }

    async fn read_file(&self, path: &str) -> MappingResult<Vec<u8>> {
        let path = normalize_path(path);
        self.staging
            .read()
            .await
            .view
            .get(&path)
            .cloned()
            .ok_or(MappingError::EntityNotFound(path))
    }

    async fn commit(&self) -> MappingResult<()> {
        let changes = std::mem::take(&mut self.staging.write().await.changes);

        let mut committed = self.content.committed.write().await;
        for (path, change) in changes {
            match change {
                Some(bytes) => {
                    committed.files.insert(path, bytes);
                }
                None => {
                    committed.files.remove(&path);
                }
            }
        }
        committed.revision += 1;
        tracing::debug!(
            "Committed revision {} of {} ({} files)",
            committed.revision,
            self.content.anchor_id,
            committed.files.len()
        );
        Ok(())
    }
}

/// Content store keeping one in-memory tree per entity.
///
/// Every `open` returns a fresh [`ContentTransaction`]. Anchoring identifiers are
/// minted as `ssi:anchor:<domain>:<uuid>` so the replica resolver can derive the
/// logical domain from them.
pub struct MemoryContentStore {
    domain: String,
    handles: Arc<DashMap<EntityKey, Arc<MemoryContentHandle>>>,
}

impl MemoryContentStore {
    pub fn new(domain: &str) -> Arc<Self> {
        Arc::new(Self {
            domain: domain.to_string(),
            handles: Arc::new(DashMap::new()),
        })
    }

    /// Committed content of an entity, if it was ever opened.
    pub fn handle(&self, entity: &EntityKey) -> Option<Arc<MemoryContentHandle>> {
        self.handles.get(entity).map(|h| h.value().clone())
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    fn open_local(&self, entity: &EntityKey) -> Arc<MemoryContentHandle> {
        self.handles
            .entry(entity.clone())
            .or_insert_with(|| {
                let anchor_id = format!("ssi:anchor:{}:{}", self.domain, uuid::Uuid::new_v4());
                tracing::debug!("Created content handle {} for {}", anchor_id, entity);
                MemoryContentHandle::new(anchor_id)
            })
            .value()
            .clone()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn open(&self, entity: &EntityKey) -> MappingResult<Arc<dyn ContentHandle>> {
        let content = self.open_local(entity);
        Ok(Arc::new(content.begin().await))
    }
}
