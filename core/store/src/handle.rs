//! Degrading store handle.
//!
//! Wraps a primary store with an in-memory fallback. The first
//! `StorageUnavailable` from the primary flips the handle into degraded
//! mode for the rest of the session: the warning is logged once, the
//! degraded flag is queryable so the host application can tell the user
//! offline support is reduced, and every later call is served from memory.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use outpost_common::{CacheKey, Error, Result};

use crate::entry::{OperationPatch, PendingOperation};
use crate::memory::MemoryStore;
use crate::store::LocalStore;

/// [`LocalStore`] wrapper that degrades to in-memory-only caching when
/// persistent storage fails.
pub struct StoreHandle {
    primary: Arc<dyn LocalStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

impl StoreHandle {
    /// Wrap a primary store.
    pub fn new(primary: Arc<dyn LocalStore>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the session has degraded to memory-only caching.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, reason: &str) {
        if self
            .degraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                "Persistent storage unavailable, degrading to memory-only caching: {}",
                reason
            );
        }
    }
}

macro_rules! route {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {{
        if !$self.is_degraded() {
            match $self.primary.$method($($arg),*).await {
                Err(Error::StorageUnavailable(reason)) => $self.degrade(&reason),
                other => return other,
            }
        }
        $self.fallback.$method($($arg),*).await
    }};
}

#[async_trait]
impl LocalStore for StoreHandle {
    async fn put_cache(&self, key: &CacheKey, data: Value) -> Result<()> {
        route!(self, put_cache(key, data.clone()))
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<Value>> {
        route!(self, get_cache(key))
    }

    async fn delete_cache(&self, key: &CacheKey) -> Result<()> {
        route!(self, delete_cache(key))
    }

    async fn clear_cache(&self) -> Result<()> {
        route!(self, clear_cache())
    }

    async fn cache_keys(&self) -> Result<Vec<CacheKey>> {
        route!(self, cache_keys())
    }

    async fn enqueue_operation(&self, op: PendingOperation) -> Result<String> {
        route!(self, enqueue_operation(op.clone()))
    }

    async fn list_operations(&self) -> Result<Vec<PendingOperation>> {
        route!(self, list_operations())
    }

    async fn remove_operation(&self, id: &str) -> Result<()> {
        route!(self, remove_operation(id))
    }

    async fn update_operation(&self, id: &str, patch: OperationPatch) -> Result<()> {
        route!(self, update_operation(id, patch.clone()))
    }

    async fn operation_count(&self) -> Result<usize> {
        route!(self, operation_count())
    }
}
