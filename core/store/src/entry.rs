//! Record types for the two persisted collections: cached entities and
//! pending operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use outpost_common::{CacheKey, WriteAction};

/// A cached payload for a single key.
///
/// The payload is a single record, a list of records (for `:all` keys),
/// or a tombstoned record awaiting delete confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Composite key, at most one entry per key.
    pub key: CacheKey,
    /// Cached payload.
    pub data: Value,
    /// Last-write time, monotonic per key.
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(key: CacheKey, data: Value) -> Self {
        Self {
            key,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Replay state of a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for replay.
    Pending,
    /// Exhausted automatic retries; awaits manual resolution.
    SyncFailed,
}

/// A queued, not-yet-confirmed write intended for the remote backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique id, generated at enqueue time, never reused.
    pub id: String,
    /// Target resource collection.
    pub collection: String,
    /// The write to apply.
    pub action: WriteAction,
    /// Record identifier when known. A temp id for offline inserts.
    pub entity_id: Option<String>,
    /// FIFO replay ordering key.
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    pub retry_count: u32,
    /// Current replay state.
    pub status: OperationStatus,
    /// Error from the most recent failed replay.
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// Create a pending operation ready for enqueue.
    pub fn new(
        collection: impl Into<String>,
        action: WriteAction,
        entity_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            collection: collection.into(),
            action,
            entity_id,
            enqueued_at: Utc::now(),
            retry_count: 0,
            status: OperationStatus::Pending,
            last_error: None,
        }
    }
}

/// Partial update applied to a stored operation.
///
/// `entity_id` and `last_error` are doubly optional: the outer `Option`
/// selects the field, the inner one is the new value.
#[derive(Debug, Clone, Default)]
pub struct OperationPatch {
    pub retry_count: Option<u32>,
    pub status: Option<OperationStatus>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub action: Option<WriteAction>,
    pub entity_id: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
}

impl OperationPatch {
    /// Patch recording a failed replay attempt that stays pending.
    pub fn retry(retry_count: u32, error: impl Into<String>) -> Self {
        Self {
            retry_count: Some(retry_count),
            enqueued_at: Some(Utc::now()),
            last_error: Some(Some(error.into())),
            ..Default::default()
        }
    }

    /// Patch marking an operation as having exhausted its retries.
    pub fn exhausted(retry_count: u32, error: impl Into<String>) -> Self {
        Self {
            retry_count: Some(retry_count),
            status: Some(OperationStatus::SyncFailed),
            last_error: Some(Some(error.into())),
            ..Default::default()
        }
    }

    /// Patch returning a failed operation to the replay set.
    pub fn reset() -> Self {
        Self {
            retry_count: Some(0),
            status: Some(OperationStatus::Pending),
            enqueued_at: Some(Utc::now()),
            last_error: Some(None),
            ..Default::default()
        }
    }

    /// Apply this patch to an operation in place.
    pub fn apply(self, op: &mut PendingOperation) {
        if let Some(retry_count) = self.retry_count {
            op.retry_count = retry_count;
        }
        if let Some(status) = self.status {
            op.status = status;
        }
        if let Some(enqueued_at) = self.enqueued_at {
            op.enqueued_at = enqueued_at;
        }
        if let Some(action) = self.action {
            op.action = action;
        }
        if let Some(entity_id) = self.entity_id {
            op.entity_id = entity_id;
        }
        if let Some(last_error) = self.last_error {
            op.last_error = last_error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_operation_defaults() {
        let op = PendingOperation::new(
            "cart_items",
            WriteAction::Insert {
                record: json!({"product_id": "p1"}),
            },
            None,
        );
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.last_error.is_none());
    }

    #[test]
    fn test_operation_ids_unique() {
        let a = PendingOperation::new("c", WriteAction::Delete { criteria: json!({}) }, None);
        let b = PendingOperation::new("c", WriteAction::Delete { criteria: json!({}) }, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_retry_patch() {
        let mut op = PendingOperation::new(
            "orders",
            WriteAction::Update {
                criteria: json!({"id": "1"}),
                patch: json!({"state": "paid"}),
            },
            Some("1".to_string()),
        );
        let before = op.enqueued_at;

        OperationPatch::retry(1, "connection refused").apply(&mut op);
        assert_eq!(op.retry_count, 1);
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.enqueued_at >= before);
        assert_eq!(op.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_exhausted_then_reset() {
        let mut op =
            PendingOperation::new("orders", WriteAction::Delete { criteria: json!({}) }, None);

        OperationPatch::exhausted(5, "still failing").apply(&mut op);
        assert_eq!(op.status, OperationStatus::SyncFailed);
        assert_eq!(op.retry_count, 5);

        OperationPatch::reset().apply(&mut op);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 0);
        assert!(op.last_error.is_none());
    }
}
