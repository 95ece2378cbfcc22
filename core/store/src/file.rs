//! File-backed local store.
//!
//! Both collections are persisted as JSON registry files under a base
//! directory, loaded at open and rewritten after every mutation. A
//! write-temp-then-rename step gives entry-level atomicity: a crashed
//! write leaves the previous registry intact.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use outpost_common::{CacheKey, Error, Result};

use crate::entry::{CacheEntry, OperationPatch, PendingOperation};
use crate::store::LocalStore;

const CACHE_REGISTRY: &str = "cache.json";
const OPERATIONS_REGISTRY: &str = "operations.json";

/// File-backed implementation of [`LocalStore`].
pub struct FileStore {
    cache_path: PathBuf,
    operations_path: PathBuf,
    cache: RwLock<HashMap<String, CacheEntry>>,
    operations: RwLock<Vec<PendingOperation>>,
}

impl FileStore {
    /// Open a store rooted at the given directory, creating it if needed
    /// and loading any registries persisted by a previous session.
    ///
    /// # Errors
    /// - `StorageUnavailable` if the directory cannot be created or a
    ///   registry cannot be read or parsed.
    pub async fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", base_dir.display(), e)))?;

        let cache_path = base_dir.join(CACHE_REGISTRY);
        let operations_path = base_dir.join(OPERATIONS_REGISTRY);

        let cache: HashMap<String, CacheEntry> = load_registry(&cache_path).await?;
        let operations: Vec<PendingOperation> = load_registry(&operations_path).await?;

        debug!(
            cache_entries = cache.len(),
            pending_operations = operations.len(),
            "Opened file store at {}",
            base_dir.display()
        );

        Ok(Self {
            cache_path,
            operations_path,
            cache: RwLock::new(cache),
            operations: RwLock::new(operations),
        })
    }

    async fn persist_cache(&self, cache: &HashMap<String, CacheEntry>) -> Result<()> {
        persist_registry(&self.cache_path, cache).await
    }

    async fn persist_operations(&self, operations: &[PendingOperation]) -> Result<()> {
        persist_registry(&self.operations_path, &operations).await
    }
}

async fn load_registry<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            Error::StorageUnavailable(format!("Corrupt registry {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::StorageUnavailable(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}

async fn persist_registry<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("{}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl LocalStore for FileStore {
    async fn put_cache(&self, key: &CacheKey, data: Value) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), CacheEntry::new(key.clone(), data));
        self.persist_cache(&cache).await
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<Value>> {
        Ok(self
            .cache
            .read()
            .await
            .get(&key.to_string())
            .map(|e| e.data.clone()))
    }

    async fn delete_cache(&self, key: &CacheKey) -> Result<()> {
        let mut cache = self.cache.write().await;
        if cache.remove(&key.to_string()).is_some() {
            self.persist_cache(&cache).await?;
        }
        Ok(())
    }

    async fn clear_cache(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.clear();
        self.persist_cache(&cache).await
    }

    async fn cache_keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .cache
            .read()
            .await
            .values()
            .map(|e| e.key.clone())
            .collect())
    }

    async fn enqueue_operation(&self, op: PendingOperation) -> Result<String> {
        let id = op.id.clone();
        let mut operations = self.operations.write().await;
        operations.push(op);
        self.persist_operations(&operations).await?;
        Ok(id)
    }

    async fn list_operations(&self) -> Result<Vec<PendingOperation>> {
        let mut ops = self.operations.read().await.clone();
        // Stable sort keeps insertion order for equal timestamps.
        ops.sort_by_key(|op| op.enqueued_at);
        Ok(ops)
    }

    async fn remove_operation(&self, id: &str) -> Result<()> {
        let mut operations = self.operations.write().await;
        let position = operations
            .iter()
            .position(|op| op.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pending operation not found: {}", id)))?;
        operations.remove(position);
        self.persist_operations(&operations).await
    }

    async fn update_operation(&self, id: &str, patch: OperationPatch) -> Result<()> {
        let mut operations = self.operations.write().await;
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pending operation not found: {}", id)))?;
        patch.apply(op);
        self.persist_operations(&operations).await
    }

    async fn operation_count(&self) -> Result<usize> {
        Ok(self.operations.read().await.len())
    }
}
