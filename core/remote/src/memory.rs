//! In-memory remote backend for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use outpost_common::{Error, Result, WriteAction, ID_FIELD};

use crate::backend::RemoteBackend;

/// In-memory row store behind the [`RemoteBackend`] trait.
///
/// Implements the same match-criteria update/delete semantics as the real
/// service, assigns server ids on insert, and supports failure injection
/// for exercising offline and retry paths. All data is lost on drop.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    available: AtomicBool,
    failures_remaining: AtomicU32,
    journal: RwLock<Vec<(String, String)>>,
}

impl MemoryBackend {
    /// Create a new empty backend, reachable by default.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            failures_remaining: AtomicU32::new(0),
            journal: RwLock::new(Vec::new()),
        }
    }

    /// Simulate the backend being reachable or not.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Fail the next `n` calls with `RemoteUnavailable`, then recover.
    pub fn fail_times(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::Release);
    }

    /// Pre-populate a collection.
    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        self.collections
            .write()
            .unwrap()
            .insert(collection.to_string(), rows);
    }

    /// Current rows of a collection.
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Every successfully dispatched write, in arrival order, as
    /// `(collection, operation kind)` pairs.
    pub fn journal(&self) -> Vec<(String, String)> {
        self.journal.read().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self
            .failures_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::RemoteUnavailable("injected failure".to_string()));
        }
        if !self.available.load(Ordering::Acquire) {
            return Err(Error::RemoteUnavailable("backend offline".to_string()));
        }
        Ok(())
    }

    fn matches(row: &Value, criteria: &Value) -> bool {
        match criteria.as_object() {
            Some(fields) => fields.iter().all(|(k, v)| row.get(k) == Some(v)),
            // Non-object criteria match nothing rather than everything.
            None => false,
        }
    }

    fn ensure_id(record: &mut Value) -> String {
        if let Some(id) = record.get(ID_FIELD).and_then(Value::as_str) {
            return id.to_string();
        }
        let id = Uuid::new_v4().to_string();
        if let Some(obj) = record.as_object_mut() {
            obj.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        id
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, collection: &str, action: &WriteAction) -> Result<Option<Value>> {
        self.check_reachable()?;

        let mut collections = self.collections.write().unwrap();
        let rows = collections.entry(collection.to_string()).or_default();

        let result = match action {
            WriteAction::Insert { record } => {
                let mut stored = record.clone();
                // The server always assigns its own id.
                if let Some(obj) = stored.as_object_mut() {
                    obj.remove(ID_FIELD);
                }
                Self::ensure_id(&mut stored);
                rows.push(stored.clone());
                Some(stored)
            }
            WriteAction::Update { criteria, patch } => {
                let mut updated = Vec::new();
                for row in rows.iter_mut().filter(|r| Self::matches(r, criteria)) {
                    if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object())
                    {
                        for (k, v) in fields {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                    updated.push(row.clone());
                }
                Some(Value::Array(updated))
            }
            WriteAction::Delete { criteria } => {
                rows.retain(|r| !Self::matches(r, criteria));
                None
            }
            WriteAction::Upsert { record } => {
                let mut stored = record.clone();
                let id = Self::ensure_id(&mut stored);
                match rows
                    .iter_mut()
                    .find(|r| r.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()))
                {
                    Some(existing) => *existing = stored.clone(),
                    None => rows.push(stored.clone()),
                }
                Some(stored)
            }
        };

        self.journal
            .write()
            .unwrap()
            .push((collection.to_string(), action.kind().to_string()));

        Ok(result)
    }

    async fn query(&self, collection: &str, filter: Option<&Value>) -> Result<Vec<Value>> {
        self.check_reachable()?;

        let collections = self.collections.read().unwrap();
        let rows = collections.get(collection).cloned().unwrap_or_default();

        Ok(match filter {
            Some(criteria) if criteria != &json!({}) => rows
                .into_iter()
                .filter(|r| Self::matches(r, criteria))
                .collect(),
            _ => rows,
        })
    }
}
