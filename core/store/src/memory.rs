//! In-memory local store.
//!
//! Used as the degraded-mode store when persistent storage is unavailable,
//! and as a test fixture. All data is lost on drop.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use outpost_common::{CacheKey, Error, Result};

use crate::entry::{CacheEntry, OperationPatch, PendingOperation};
use crate::store::LocalStore;

/// In-memory implementation of [`LocalStore`]. Never fails with
/// `StorageUnavailable`.
#[derive(Default)]
pub struct MemoryStore {
    cache: RwLock<HashMap<String, CacheEntry>>,
    operations: RwLock<Vec<PendingOperation>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn put_cache(&self, key: &CacheKey, data: Value) -> Result<()> {
        let entry = CacheEntry::new(key.clone(), data);
        self.cache.write().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<Value>> {
        Ok(self
            .cache
            .read()
            .unwrap()
            .get(&key.to_string())
            .map(|e| e.data.clone()))
    }

    async fn delete_cache(&self, key: &CacheKey) -> Result<()> {
        self.cache.write().unwrap().remove(&key.to_string());
        Ok(())
    }

    async fn clear_cache(&self) -> Result<()> {
        self.cache.write().unwrap().clear();
        Ok(())
    }

    async fn cache_keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .cache
            .read()
            .unwrap()
            .values()
            .map(|e| e.key.clone())
            .collect())
    }

    async fn enqueue_operation(&self, op: PendingOperation) -> Result<String> {
        let id = op.id.clone();
        self.operations.write().unwrap().push(op);
        Ok(id)
    }

    async fn list_operations(&self) -> Result<Vec<PendingOperation>> {
        let mut ops = self.operations.read().unwrap().clone();
        // Stable sort keeps insertion order for equal timestamps.
        ops.sort_by_key(|op| op.enqueued_at);
        Ok(ops)
    }

    async fn remove_operation(&self, id: &str) -> Result<()> {
        let mut ops = self.operations.write().unwrap();
        let position = ops
            .iter()
            .position(|op| op.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pending operation not found: {}", id)))?;
        ops.remove(position);
        Ok(())
    }

    async fn update_operation(&self, id: &str, patch: OperationPatch) -> Result<()> {
        let mut ops = self.operations.write().unwrap();
        let op = ops
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pending operation not found: {}", id)))?;
        patch.apply(op);
        Ok(())
    }

    async fn operation_count(&self) -> Result<usize> {
        Ok(self.operations.read().unwrap().len())
    }
}
