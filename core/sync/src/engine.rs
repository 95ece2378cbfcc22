//! Sync engine that drains the pending-operation log against the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use outpost_common::{is_temp_id, CacheKey, Error, Result, WriteAction, ID_FIELD};
use outpost_remote::RemoteBackend;
use outpost_store::{LocalStore, OperationPatch, OperationStatus, PendingOperation};

use crate::backoff::BackoffConfig;

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry ceiling: an operation reaching this many failed attempts is
    /// marked sync-failed and excluded from automatic replay.
    pub max_retries: u32,
    /// Backoff policy applied before retrying an operation.
    pub backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

/// One unresolved operation surfaced by a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub operation_id: String,
    pub collection: String,
    pub kind: String,
    pub error: String,
    /// Whether the operation has hit the retry ceiling and now awaits
    /// manual resolution.
    pub exhausted: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// True when no operation failed during this run.
    pub success: bool,
    /// Operations confirmed and removed from the log.
    pub synced: usize,
    /// Operations that failed during this run.
    pub failed: usize,
    /// This run's failures plus any previously exhausted operations.
    pub details: Vec<SyncFailure>,
}

/// Snapshot of the engine's sync-status interface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Operations awaiting automatic replay.
    pub pending_operations: usize,
    /// Operations that exhausted their retries.
    pub failed_operations: usize,
    /// Completion time of the most recent drain.
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether a drain is currently running.
    pub sync_in_progress: bool,
}

/// Replays queued writes against the remote backend.
///
/// Operations are applied strictly one at a time in FIFO order; one
/// operation's failure never aborts the drain of the ones behind it. A
/// run token enforces that at most one drain runs at a time.
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    backend: Arc<dyn RemoteBackend>,
    config: EngineConfig,
    running: AtomicBool,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    // Temp id -> server id mappings from reconciled inserts. Kept for
    // the engine's lifetime so an operation enqueued mid-drain with a
    // stale temp reference is still rewritten on its replay turn.
    id_map: RwLock<HashMap<String, String>>,
}

impl SyncEngine {
    /// Create a new engine over the given store and backend.
    pub fn new(
        store: Arc<dyn LocalStore>,
        backend: Arc<dyn RemoteBackend>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            backend,
            config,
            running: AtomicBool::new(false),
            last_sync: RwLock::new(None),
            id_map: RwLock::new(HashMap::new()),
        }
    }

    /// Drain the pending-operation log against the backend.
    ///
    /// # Errors
    /// - `SyncInProgress` if another drain is running.
    /// - `StorageUnavailable` if the operation log cannot be read.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SyncInProgress);
        }

        let result = self.drain().await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn drain(&self) -> Result<SyncReport> {
        let operations = self.store.list_operations().await?;
        info!(pending = operations.len(), "Starting sync drain");

        let mut synced = 0;
        let mut failed = 0;
        let mut details = Vec::new();
        // Single-flight, so the map is uncontended for the whole drain.
        let mut id_map = self.id_map.write().await;

        for mut op in operations {
            if op.status == OperationStatus::SyncFailed {
                let reason = op
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "retry ceiling reached".to_string());
                details.push(SyncFailure {
                    operation_id: op.id.clone(),
                    collection: op.collection.clone(),
                    kind: op.action.kind().to_string(),
                    error: Error::SyncExhausted(reason).to_string(),
                    exhausted: true,
                });
                continue;
            }

            if !id_map.is_empty() && remap_temp_ids(&mut op, &id_map) {
                let patch = OperationPatch {
                    action: Some(op.action.clone()),
                    entity_id: Some(op.entity_id.clone()),
                    ..Default::default()
                };
                match self.store.update_operation(&op.id, patch).await {
                    Ok(()) => {}
                    Err(Error::NotFound(_)) => {
                        debug!(id = %op.id, "Operation removed mid-drain, skipping");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            if op.retry_count > 0 {
                let delay = self.config.backoff.delay_for(op.retry_count);
                if !delay.is_zero() {
                    debug!(id = %op.id, ?delay, "Backing off before retry");
                    sleep(delay).await;
                }
            }

            debug!(
                id = %op.id,
                collection = %op.collection,
                kind = op.action.kind(),
                "Applying pending operation"
            );

            match self.backend.execute(&op.collection, &op.action).await {
                Ok(result) => {
                    if let Err(e) = self.reconcile_insert(&op, result.as_ref(), &mut id_map).await
                    {
                        warn!("Cache reconciliation failed for {}: {}", op.id, e);
                    }
                    // A concurrent discard may have removed the op already;
                    // the write itself was applied either way.
                    match self.store.remove_operation(&op.id).await {
                        Ok(()) | Err(Error::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                    synced += 1;
                }
                Err(e) => {
                    failed += 1;
                    let retry_count = op.retry_count + 1;
                    let exhausted = retry_count >= self.config.max_retries;

                    let patch = if exhausted {
                        warn!(
                            id = %op.id,
                            collection = %op.collection,
                            "Operation exhausted {} retries, needs manual resolution",
                            retry_count
                        );
                        OperationPatch::exhausted(retry_count, e.to_string())
                    } else {
                        // Re-enqueued behind still-pending peers: eventual
                        // progress over strict original ordering.
                        OperationPatch::retry(retry_count, e.to_string())
                    };
                    match self.store.update_operation(&op.id, patch).await {
                        Ok(()) => {}
                        Err(Error::NotFound(_)) => {
                            debug!(id = %op.id, "Operation removed mid-drain, skipping");
                            continue;
                        }
                        Err(e) => return Err(e),
                    }

                    details.push(SyncFailure {
                        operation_id: op.id.clone(),
                        collection: op.collection.clone(),
                        kind: op.action.kind().to_string(),
                        error: e.to_string(),
                        exhausted,
                    });
                }
            }
        }

        *self.last_sync.write().await = Some(Utc::now());
        info!(synced, failed, "Sync drain finished");

        Ok(SyncReport {
            success: failed == 0,
            synced,
            failed,
            details,
        })
    }

    /// After a successful offline-insert replay, swap the client temp id
    /// for the server-assigned id in the cache and the id map.
    async fn reconcile_insert(
        &self,
        op: &PendingOperation,
        result: Option<&Value>,
        id_map: &mut HashMap<String, String>,
    ) -> Result<()> {
        let Some(temp) = op.entity_id.as_deref().filter(|id| is_temp_id(id)) else {
            return Ok(());
        };
        let Some(record) = result else {
            return Ok(());
        };
        let Some(real) = record.get(ID_FIELD).and_then(Value::as_str) else {
            return Ok(());
        };

        id_map.insert(temp.to_string(), real.to_string());

        let temp_key = CacheKey::entity(&op.collection, temp);
        let real_key = CacheKey::entity(&op.collection, real);
        self.store.delete_cache(&temp_key).await?;
        self.store.put_cache(&real_key, record.clone()).await?;

        let all_key = CacheKey::all(&op.collection);
        if let Some(Value::Array(mut rows)) = self.store.get_cache(&all_key).await? {
            let mut replaced = false;
            for row in rows.iter_mut() {
                if row.get(ID_FIELD).and_then(Value::as_str) == Some(temp) {
                    *row = record.clone();
                    replaced = true;
                }
            }
            if !replaced {
                rows.push(record.clone());
            }
            self.store.put_cache(&all_key, Value::Array(rows)).await?;
        }

        // Rewrite every queued operation still referencing the temp id,
        // including ones enqueued after this run's snapshot was taken.
        for mut queued in self.store.list_operations().await? {
            if queued.id == op.id || !remap_temp_ids(&mut queued, id_map) {
                continue;
            }
            let patch = OperationPatch {
                action: Some(queued.action.clone()),
                entity_id: Some(queued.entity_id.clone()),
                ..Default::default()
            };
            match self.store.update_operation(&queued.id, patch).await {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!(temp, real, collection = %op.collection, "Reconciled offline insert id");
        Ok(())
    }

    /// Current sync-status snapshot.
    pub async fn status(&self) -> Result<EngineStatus> {
        let operations = self.store.list_operations().await?;
        let failed_operations = operations
            .iter()
            .filter(|op| op.status == OperationStatus::SyncFailed)
            .count();

        Ok(EngineStatus {
            pending_operations: operations.len() - failed_operations,
            failed_operations,
            last_sync: *self.last_sync.read().await,
            sync_in_progress: self.running.load(Ordering::Acquire),
        })
    }

    /// Return an exhausted operation to the automatic replay set.
    ///
    /// # Errors
    /// - `NotFound` if no operation has the given id.
    /// - `InvalidInput` if the operation is not sync-failed.
    pub async fn reset_failed_operation(&self, id: &str) -> Result<()> {
        self.require_failed(id).await?;
        self.store.update_operation(id, OperationPatch::reset()).await
    }

    /// Drop an exhausted operation without replaying it.
    ///
    /// # Errors
    /// - `NotFound` if no operation has the given id.
    /// - `InvalidInput` if the operation is not sync-failed.
    pub async fn discard_failed_operation(&self, id: &str) -> Result<()> {
        self.require_failed(id).await?;
        self.store.remove_operation(id).await
    }

    async fn require_failed(&self, id: &str) -> Result<()> {
        let operations = self.store.list_operations().await?;
        let op = operations
            .iter()
            .find(|op| op.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pending operation not found: {}", id)))?;
        if op.status != OperationStatus::SyncFailed {
            return Err(Error::InvalidInput(format!(
                "Operation {} has not exhausted its retries",
                id
            )));
        }
        Ok(())
    }
}

/// Rewrite temp-id references in an operation using mappings discovered
/// earlier in the same run. Returns whether anything changed.
fn remap_temp_ids(op: &mut PendingOperation, id_map: &HashMap<String, String>) -> bool {
    let mut changed = false;

    if let Some(entity_id) = &op.entity_id {
        if let Some(real) = id_map.get(entity_id) {
            op.entity_id = Some(real.clone());
            changed = true;
        }
    }

    match &mut op.action {
        WriteAction::Update { criteria, .. } | WriteAction::Delete { criteria } => {
            let mapped = criteria
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .and_then(|id| id_map.get(id))
                .cloned();
            if let Some(real) = mapped {
                if let Some(obj) = criteria.as_object_mut() {
                    obj.insert(ID_FIELD.to_string(), Value::String(real));
                    changed = true;
                }
            }
        }
        WriteAction::Insert { .. } | WriteAction::Upsert { .. } => {}
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outpost_common::temp_id;
    use outpost_remote::MemoryBackend;
    use outpost_store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            max_retries: 5,
            backoff: BackoffConfig::none(),
        }
    }

    fn engine_over(
        store: Arc<MemoryStore>,
        backend: Arc<MemoryBackend>,
    ) -> SyncEngine {
        SyncEngine::new(store, backend, test_config())
    }

    async fn enqueue_insert(store: &MemoryStore, collection: &str, record: Value) -> String {
        store
            .enqueue_operation(PendingOperation::new(
                collection,
                WriteAction::Insert { record },
                None,
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_drain_empties_queue_in_fifo_order() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());

        enqueue_insert(&store, "cart_items", json!({"n": 1})).await;
        enqueue_insert(&store, "cart_items", json!({"n": 2})).await;
        store
            .enqueue_operation(PendingOperation::new(
                "cart_items",
                WriteAction::Update {
                    criteria: json!({"n": 1}),
                    patch: json!({"n": 3}),
                },
                None,
            ))
            .await
            .unwrap();

        let engine = engine_over(store.clone(), backend.clone());
        let report = engine.sync_pending().await.unwrap();

        assert!(report.success);
        assert_eq!(report.synced, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(store.operation_count().await.unwrap(), 0);

        let kinds: Vec<String> = backend.journal().into_iter().map(|(_, k)| k).collect();
        assert_eq!(kinds, vec!["insert", "insert", "update"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_following_operations() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_times(1);

        let first = enqueue_insert(&store, "orders", json!({"n": 1})).await;
        enqueue_insert(&store, "orders", json!({"n": 2})).await;

        let engine = engine_over(store.clone(), backend.clone());
        let report = engine.sync_pending().await.unwrap();

        assert!(!report.success);
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].operation_id, first);
        assert!(!report.details[0].exhausted);

        // The failed op stays queued with an incremented retry count.
        let remaining = store.list_operations().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, first);
        assert_eq!(remaining[0].retry_count, 1);
        assert_eq!(remaining[0].status, OperationStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_ceiling_marks_sync_failed() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);

        let id = store
            .enqueue_operation(PendingOperation::new(
                "orders",
                WriteAction::Update {
                    criteria: json!({"id": "1"}),
                    patch: json!({"state": "paid"}),
                },
                Some("1".to_string()),
            ))
            .await
            .unwrap();

        let engine = engine_over(store.clone(), backend.clone());

        for run in 1..=5u32 {
            let report = engine.sync_pending().await.unwrap();
            assert_eq!(report.failed, 1, "run {}", run);
            let op = &store.list_operations().await.unwrap()[0];
            assert_eq!(op.retry_count, run);
        }

        let op = &store.list_operations().await.unwrap()[0];
        assert_eq!(op.status, OperationStatus::SyncFailed);

        // A sixth run only reports the exhausted op; nothing is retried.
        let report = engine.sync_pending().await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.synced, 0);
        assert_eq!(report.details.len(), 1);
        assert!(report.details[0].exhausted);
        assert_eq!(report.details[0].operation_id, id);

        let op = &store.list_operations().await.unwrap()[0];
        assert_eq!(op.retry_count, 5);
    }

    #[tokio::test]
    async fn test_exhausted_operation_does_not_block_peers() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());

        // Already-exhausted op at the head of the queue.
        let mut dead = PendingOperation::new(
            "orders",
            WriteAction::Delete { criteria: json!({"id": "1"}) },
            Some("1".to_string()),
        );
        dead.status = OperationStatus::SyncFailed;
        dead.retry_count = 5;
        store.enqueue_operation(dead).await.unwrap();

        enqueue_insert(&store, "orders", json!({"n": 2})).await;

        let engine = engine_over(store.clone(), backend.clone());
        let report = engine.sync_pending().await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(backend.rows("orders").len(), 1);
    }

    #[tokio::test]
    async fn test_temp_id_reconciliation_rewrites_cache_and_queue() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        let tid = temp_id();

        // Optimistic cache state from an offline insert.
        let synthesized = json!({"id": tid, "name": "widget", "_offline": true});
        store
            .put_cache(&CacheKey::entity("products", &tid), synthesized.clone())
            .await
            .unwrap();
        store
            .put_cache(&CacheKey::all("products"), json!([synthesized]))
            .await
            .unwrap();

        // The queued insert, followed by an offline update that still
        // references the temp id.
        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Insert { record: json!({"name": "widget"}) },
                Some(tid.clone()),
            ))
            .await
            .unwrap();
        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Update {
                    criteria: json!({"id": tid}),
                    patch: json!({"name": "gadget"}),
                },
                Some(tid.clone()),
            ))
            .await
            .unwrap();

        let engine = engine_over(store.clone(), backend.clone());
        let report = engine.sync_pending().await.unwrap();

        assert!(report.success);
        assert_eq!(report.synced, 2);
        assert_eq!(store.operation_count().await.unwrap(), 0);

        // The backend saw the update under the server id.
        let rows = backend.rows("products");
        assert_eq!(rows.len(), 1);
        let real = rows[0]["id"].as_str().unwrap().to_string();
        assert!(!is_temp_id(&real));
        assert_eq!(rows[0]["name"], "gadget");

        // Cache moved from the temp key to the server key.
        assert!(store
            .get_cache(&CacheKey::entity("products", &tid))
            .await
            .unwrap()
            .is_none());
        let cached = store
            .get_cache(&CacheKey::entity("products", &real))
            .await
            .unwrap()
            .unwrap();
        assert!(cached.get("_offline").is_none());

        let all = store
            .get_cache(&CacheKey::all("products"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all[0]["id"], real.as_str());
    }

    #[tokio::test]
    async fn test_temp_id_mapping_survives_across_runs() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        let tid = temp_id();

        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Insert { record: json!({"name": "widget"}) },
                Some(tid.clone()),
            ))
            .await
            .unwrap();

        let engine = engine_over(store.clone(), backend.clone());
        assert_eq!(engine.sync_pending().await.unwrap().synced, 1);

        // A write queued after the drain, still holding the temp id from
        // a stale snapshot of the record.
        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Update {
                    criteria: json!({"id": tid}),
                    patch: json!({"name": "gadget"}),
                },
                Some(tid.clone()),
            ))
            .await
            .unwrap();

        let report = engine.sync_pending().await.unwrap();
        assert_eq!(report.synced, 1);

        let rows = backend.rows("products");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "gadget");
    }

    /// Backend that removes a chosen queued operation from the store
    /// while handling its first call, like a concurrent discard.
    struct DiscardingBackend {
        store: Arc<MemoryStore>,
        victim: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl RemoteBackend for DiscardingBackend {
        fn name(&self) -> &str {
            "discarding"
        }

        async fn execute(
            &self,
            _collection: &str,
            _action: &WriteAction,
        ) -> Result<Option<Value>> {
            let victim = self.victim.lock().unwrap().take();
            if let Some(id) = victim {
                self.store.remove_operation(&id).await?;
            }
            Ok(None)
        }

        async fn query(&self, _collection: &str, _filter: Option<&Value>) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_drain_survives_operation_discarded_mid_run() {
        let store = Arc::new(MemoryStore::new());
        enqueue_insert(&store, "orders", json!({"n": 1})).await;
        let second = enqueue_insert(&store, "orders", json!({"n": 2})).await;

        let backend = Arc::new(DiscardingBackend {
            store: store.clone(),
            victim: std::sync::Mutex::new(Some(second)),
        });

        let engine = SyncEngine::new(store.clone(), backend, test_config());
        let report = engine.sync_pending().await.unwrap();

        assert!(report.success);
        assert_eq!(report.synced, 2);
        assert_eq!(store.operation_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_replays_queued_upsert() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        backend.seed("products", vec![json!({"id": "1", "name": "widget"})]);

        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Upsert { record: json!({"id": "1", "name": "gadget"}) },
                Some("1".to_string()),
            ))
            .await
            .unwrap();
        store
            .enqueue_operation(PendingOperation::new(
                "products",
                WriteAction::Upsert { record: json!({"id": "2", "name": "gizmo"}) },
                Some("2".to_string()),
            ))
            .await
            .unwrap();

        let engine = engine_over(store.clone(), backend.clone());
        let report = engine.sync_pending().await.unwrap();

        assert!(report.success);
        assert_eq!(report.synced, 2);
        assert_eq!(store.operation_count().await.unwrap(), 0);

        let rows = backend.rows("products");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "gadget");
        assert_eq!(rows[1]["name"], "gizmo");
    }

    #[tokio::test]
    async fn test_reset_failed_operation_rejoins_replay() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);

        enqueue_insert(&store, "orders", json!({"n": 1})).await;
        let engine = engine_over(store.clone(), backend.clone());

        for _ in 0..5 {
            engine.sync_pending().await.unwrap();
        }
        let op_id = store.list_operations().await.unwrap()[0].id.clone();
        assert_eq!(engine.status().await.unwrap().failed_operations, 1);

        // Resetting a pending op is rejected; resetting the failed one works.
        engine.reset_failed_operation(&op_id).await.unwrap();
        assert!(matches!(
            engine.reset_failed_operation(&op_id).await,
            Err(Error::InvalidInput(_))
        ));

        backend.set_available(true);
        let report = engine.sync_pending().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(store.operation_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_discard_failed_operation() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);

        enqueue_insert(&store, "orders", json!({"n": 1})).await;
        let engine = engine_over(store.clone(), backend.clone());
        for _ in 0..5 {
            engine.sync_pending().await.unwrap();
        }

        let op_id = store.list_operations().await.unwrap()[0].id.clone();
        engine.discard_failed_operation(&op_id).await.unwrap();
        assert_eq!(store.operation_count().await.unwrap(), 0);
    }

    /// Backend whose calls take long enough to overlap another sync request.
    struct SlowBackend;

    #[async_trait]
    impl RemoteBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn execute(
            &self,
            _collection: &str,
            _action: &WriteAction,
        ) -> Result<Option<Value>> {
            sleep(Duration::from_millis(200)).await;
            Ok(None)
        }

        async fn query(&self, _collection: &str, _filter: Option<&Value>) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_single_flight_guard() {
        let store = Arc::new(MemoryStore::new());
        enqueue_insert(&store, "orders", json!({"n": 1})).await;

        let engine = Arc::new(SyncEngine::new(store, Arc::new(SlowBackend), test_config()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_pending().await })
        };
        sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            engine.sync_pending().await,
            Err(Error::SyncInProgress)
        ));

        assert!(first.await.unwrap().is_ok());

        // The token is released once the run finishes.
        assert!(engine.sync_pending().await.is_ok());
    }
}
