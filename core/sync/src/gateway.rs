//! Offline-aware data gateway.
//!
//! The single entry point application code uses for reads and writes.
//! Writes go to the remote backend when it is reachable and fall back to
//! the pending-operation log plus an optimistic cache update otherwise;
//! reads fall back to the cache. A caller never hard-fails purely due to
//! lost connectivity while either a remote response or a cache entry
//! exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use outpost_common::{
    temp_id, CacheKey, Error, Result, WriteAction, DELETED_MARKER, ID_FIELD, OFFLINE_MARKER,
};
use outpost_remote::RemoteBackend;
use outpost_store::{LocalStore, PendingOperation};

use crate::monitor::NetworkMonitor;
use crate::trigger::SyncTrigger;

/// Configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Client-side timeout for a single remote call. On expiry the call
    /// is treated as failed and falls through to the offline path once;
    /// retries are the sync engine's responsibility.
    pub remote_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a gateway call.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// The affected or fetched data, when available.
    pub data: Option<Value>,
    /// Whether this call was served by the offline path.
    pub offline: bool,
}

impl GatewayResponse {
    fn online(data: Option<Value>) -> Self {
        Self {
            data,
            offline: false,
        }
    }

    fn offline(data: Option<Value>) -> Self {
        Self {
            data,
            offline: true,
        }
    }
}

/// Online/offline-aware data access over a store and a remote backend.
pub struct Gateway {
    store: Arc<dyn LocalStore>,
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<NetworkMonitor>,
    trigger: SyncTrigger,
    config: GatewayConfig,
}

impl Gateway {
    /// Create a new gateway.
    pub fn new(
        store: Arc<dyn LocalStore>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<NetworkMonitor>,
        trigger: SyncTrigger,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            backend,
            monitor,
            trigger,
            config,
        }
    }

    /// Insert a record into a collection.
    ///
    /// Online: the stored record (with its server-assigned id) is cached
    /// and returned. Offline or on remote failure: the write is queued
    /// and a synthesized record with a temp id and an `_offline` marker
    /// is cached optimistically.
    pub async fn insert(&self, collection: &str, payload: Value) -> Result<GatewayResponse> {
        let action = WriteAction::Insert {
            record: payload.clone(),
        };

        match self.remote_execute(collection, &action).await {
            Ok(result) => {
                if let Some(record) = &result {
                    if let Err(e) = self.cache_record(collection, record).await {
                        warn!("Cache write-through failed after insert: {}", e);
                    }
                }
                Ok(GatewayResponse::online(result))
            }
            Err(e) => {
                debug!(collection, "Remote insert failed, queueing: {}", e);
                self.queue_insert(collection, payload).await
            }
        }
    }

    /// Patch records matching the criteria.
    pub async fn update(
        &self,
        collection: &str,
        patch: Value,
        criteria: Value,
    ) -> Result<GatewayResponse> {
        let action = WriteAction::Update {
            criteria: criteria.clone(),
            patch: patch.clone(),
        };

        match self.remote_execute(collection, &action).await {
            Ok(result) => {
                if let Some(Value::Array(rows)) = &result {
                    for row in rows {
                        if let Err(e) = self.cache_record(collection, row).await {
                            warn!("Cache write-through failed after update: {}", e);
                        }
                    }
                }
                Ok(GatewayResponse::online(result))
            }
            Err(e) => {
                debug!(collection, "Remote update failed, queueing: {}", e);
                self.queue_update(collection, patch, criteria).await
            }
        }
    }

    /// Delete records matching the criteria.
    ///
    /// Cache eviction is id-driven: when the criteria carry no `id`,
    /// rows removed remotely stay cached until the next `select`
    /// refreshes the affected keys.
    pub async fn delete(&self, collection: &str, criteria: Value) -> Result<GatewayResponse> {
        let action = WriteAction::Delete {
            criteria: criteria.clone(),
        };

        match self.remote_execute(collection, &action).await {
            Ok(_) => {
                if let Some(id) = criteria.get(ID_FIELD).and_then(Value::as_str) {
                    if let Err(e) = self.evict_record(collection, id).await {
                        warn!("Cache eviction failed after delete: {}", e);
                    }
                }
                Ok(GatewayResponse::online(None))
            }
            Err(e) => {
                debug!(collection, "Remote delete failed, queueing: {}", e);
                self.queue_delete(collection, criteria).await
            }
        }
    }

    /// Fetch rows from a collection, with stale-read fallback.
    ///
    /// # Errors
    /// - `NotFoundOffline` if the remote call fails and the cache holds
    ///   nothing for this query.
    pub async fn select(
        &self,
        collection: &str,
        filter: Option<Value>,
    ) -> Result<GatewayResponse> {
        let target = select_target(collection, filter.as_ref());

        match self.remote_query(collection, filter.as_ref()).await {
            Ok(rows) => {
                if let Err(e) = self.refresh_cache(&target, &rows).await {
                    warn!("Cache refresh failed after select: {}", e);
                }
                Ok(GatewayResponse::online(Some(Value::Array(rows))))
            }
            Err(e) => {
                debug!(collection, "Remote select failed, using cache: {}", e);
                let Some(target) = target else {
                    return Err(Error::NotFoundOffline(format!(
                        "No cacheable key for filtered select on {}",
                        collection
                    )));
                };
                match self.store.get_cache(target.key()).await? {
                    Some(data) => {
                        self.trigger.request();
                        Ok(GatewayResponse::offline(Some(data)))
                    }
                    None => Err(Error::NotFoundOffline(target.key().to_string())),
                }
            }
        }
    }

    async fn remote_execute(
        &self,
        collection: &str,
        action: &WriteAction,
    ) -> Result<Option<Value>> {
        if !self.monitor.is_online() {
            return Err(Error::RemoteUnavailable("device is offline".to_string()));
        }
        match timeout(
            self.config.remote_timeout,
            self.backend.execute(collection, action),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::RemoteUnavailable(format!(
                "Remote call timed out after {:?}",
                self.config.remote_timeout
            ))),
        }
    }

    async fn remote_query(
        &self,
        collection: &str,
        filter: Option<&Value>,
    ) -> Result<Vec<Value>> {
        if !self.monitor.is_online() {
            return Err(Error::RemoteUnavailable("device is offline".to_string()));
        }
        match timeout(
            self.config.remote_timeout,
            self.backend.query(collection, filter),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::RemoteUnavailable(format!(
                "Remote call timed out after {:?}",
                self.config.remote_timeout
            ))),
        }
    }

    async fn queue_insert(&self, collection: &str, payload: Value) -> Result<GatewayResponse> {
        let tid = temp_id();
        let mut synthesized = payload.clone();
        if let Some(obj) = synthesized.as_object_mut() {
            obj.insert(ID_FIELD.to_string(), Value::String(tid.clone()));
            obj.insert(OFFLINE_MARKER.to_string(), Value::Bool(true));
        }

        let op = PendingOperation::new(
            collection,
            WriteAction::Insert { record: payload },
            Some(tid.clone()),
        );
        self.store.enqueue_operation(op).await?;

        self.store
            .put_cache(&CacheKey::entity(collection, &tid), synthesized.clone())
            .await?;
        self.merge_into_list(collection, &synthesized).await?;

        self.trigger.request();
        Ok(GatewayResponse::offline(Some(synthesized)))
    }

    async fn queue_update(
        &self,
        collection: &str,
        patch: Value,
        criteria: Value,
    ) -> Result<GatewayResponse> {
        let entity_id = criteria
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        let op = PendingOperation::new(
            collection,
            WriteAction::Update {
                criteria,
                patch: patch.clone(),
            },
            entity_id.clone(),
        );
        self.store.enqueue_operation(op).await?;

        // Patch the cached entry when the criteria identify one; a no-op
        // patch is still queued either way.
        let mut patched = None;
        if let Some(id) = &entity_id {
            let key = CacheKey::entity(collection, id);
            if let Some(mut cached) = self.store.get_cache(&key).await? {
                if let (Some(target), Some(fields)) = (cached.as_object_mut(), patch.as_object())
                {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                    target.insert(OFFLINE_MARKER.to_string(), Value::Bool(true));
                }
                self.store.put_cache(&key, cached.clone()).await?;
                self.merge_into_list(collection, &cached).await?;
                patched = Some(cached);
            }
        }

        self.trigger.request();
        Ok(GatewayResponse::offline(patched))
    }

    async fn queue_delete(&self, collection: &str, criteria: Value) -> Result<GatewayResponse> {
        let entity_id = criteria
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        let op = PendingOperation::new(
            collection,
            WriteAction::Delete { criteria },
            entity_id.clone(),
        );
        self.store.enqueue_operation(op).await?;

        // Tombstone the entry and drop it from the list view immediately;
        // the entry itself stays until the delete replay confirms.
        if let Some(id) = &entity_id {
            let key = CacheKey::entity(collection, id);
            if let Some(mut cached) = self.store.get_cache(&key).await? {
                if let Some(obj) = cached.as_object_mut() {
                    obj.insert(DELETED_MARKER.to_string(), Value::Bool(true));
                }
                self.store.put_cache(&key, cached).await?;
            }
            self.remove_from_list(collection, id).await?;
        }

        self.trigger.request();
        Ok(GatewayResponse::offline(None))
    }

    /// Cache a record under its entity key and refresh the list view.
    async fn cache_record(&self, collection: &str, record: &Value) -> Result<()> {
        if let Some(id) = record.get(ID_FIELD).and_then(Value::as_str) {
            self.store
                .put_cache(&CacheKey::entity(collection, id), record.clone())
                .await?;
        }
        self.merge_into_list(collection, record).await
    }

    async fn evict_record(&self, collection: &str, id: &str) -> Result<()> {
        self.store
            .delete_cache(&CacheKey::entity(collection, id))
            .await?;
        self.remove_from_list(collection, id).await
    }

    /// Append-or-replace a record by id in the collection's `:all` view.
    async fn merge_into_list(&self, collection: &str, record: &Value) -> Result<()> {
        let Some(id) = record.get(ID_FIELD).and_then(Value::as_str) else {
            return Ok(());
        };

        let key = CacheKey::all(collection);
        let mut rows = match self.store.get_cache(&key).await? {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        };

        match rows
            .iter_mut()
            .find(|r| r.get(ID_FIELD).and_then(Value::as_str) == Some(id))
        {
            Some(existing) => *existing = record.clone(),
            None => rows.push(record.clone()),
        }

        self.store.put_cache(&key, Value::Array(rows)).await
    }

    async fn remove_from_list(&self, collection: &str, id: &str) -> Result<()> {
        let key = CacheKey::all(collection);
        if let Some(Value::Array(mut rows)) = self.store.get_cache(&key).await? {
            rows.retain(|r| r.get(ID_FIELD).and_then(Value::as_str) != Some(id));
            self.store.put_cache(&key, Value::Array(rows)).await?;
        }
        Ok(())
    }

    async fn refresh_cache(&self, target: &Option<SelectTarget>, rows: &[Value]) -> Result<()> {
        match target {
            Some(SelectTarget::Rows(key)) => {
                self.store
                    .put_cache(key, Value::Array(rows.to_vec()))
                    .await
            }
            Some(SelectTarget::Record(key)) => {
                if let Some(first) = rows.first() {
                    self.store.put_cache(key, first.clone()).await?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Cache slot a select refreshes and falls back to.
enum SelectTarget {
    /// A row-set entry: the `:all` view, or a scope-keyed subset such as
    /// one user's rows.
    Rows(CacheKey),
    /// A single record, fetched by id.
    Record(CacheKey),
}

impl SelectTarget {
    fn key(&self) -> &CacheKey {
        match self {
            SelectTarget::Rows(key) | SelectTarget::Record(key) => key,
        }
    }
}

/// Target for a select: the `:all` view for unfiltered selects, a single
/// record for by-id lookups, a scope-keyed row set for other single-field
/// filters, nothing for multi-field filters.
fn select_target(collection: &str, filter: Option<&Value>) -> Option<SelectTarget> {
    match filter {
        None => Some(SelectTarget::Rows(CacheKey::all(collection))),
        Some(f) => {
            let obj = f.as_object()?;
            if obj.len() != 1 {
                return None;
            }
            let (field, value) = obj.iter().next()?;
            let key = CacheKey::entity(collection, value.as_str()?);
            if field == ID_FIELD {
                Some(SelectTarget::Record(key))
            } else {
                Some(SelectTarget::Rows(key))
            }
        }
    }
}
