//! Local store trait definition.

use async_trait::async_trait;
use serde_json::Value;

use outpost_common::{CacheKey, Result};

use crate::entry::{OperationPatch, PendingOperation};

/// Key-indexed on-device store with two independent collections: a
/// cached-entity table and a pending-operation log.
///
/// Pure storage primitive; no sync or gateway logic. All operations are
/// atomic at single-entry granularity. No multi-key transactions are
/// provided, and none are needed: writes to the same key serialize
/// last-write-wins.
///
/// # Errors
/// If the underlying storage is unavailable, every call fails with
/// `StorageUnavailable`; callers must treat that as "offline persistence
/// disabled" and degrade to in-memory-only caching for the session.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or replace the cache entry for a key.
    async fn put_cache(&self, key: &CacheKey, data: Value) -> Result<()>;

    /// Get the cached payload for a key, if present.
    async fn get_cache(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Remove the cache entry for a key. Removing an absent key is a no-op.
    async fn delete_cache(&self, key: &CacheKey) -> Result<()>;

    /// Remove all cache entries. The operation log is untouched.
    async fn clear_cache(&self) -> Result<()>;

    /// All keys currently present in the cache table.
    async fn cache_keys(&self) -> Result<Vec<CacheKey>>;

    /// Append an operation to the pending log.
    ///
    /// # Postconditions
    /// - Returns the operation's id.
    async fn enqueue_operation(&self, op: PendingOperation) -> Result<String>;

    /// All pending operations in FIFO order (non-decreasing `enqueued_at`,
    /// ties broken by insertion order).
    async fn list_operations(&self) -> Result<Vec<PendingOperation>>;

    /// Remove an operation after it has been confirmed or discarded.
    ///
    /// # Errors
    /// - `NotFound` if no operation has the given id.
    async fn remove_operation(&self, id: &str) -> Result<()>;

    /// Apply a partial update to a stored operation.
    ///
    /// # Errors
    /// - `NotFound` if no operation has the given id.
    async fn update_operation(&self, id: &str, patch: OperationPatch) -> Result<()>;

    /// Number of operations in the pending log, in any status.
    async fn operation_count(&self) -> Result<usize>;
}
