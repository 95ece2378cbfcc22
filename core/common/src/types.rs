//! Common types used throughout Outpost.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Field carrying a record's identifier in backend rows.
pub const ID_FIELD: &str = "id";

/// Marker field set on records written locally while offline.
pub const OFFLINE_MARKER: &str = "_offline";

/// Marker field set on records deleted locally but not yet remotely.
pub const DELETED_MARKER: &str = "_deleted";

/// Prefix for client-generated temporary identifiers.
const TEMP_ID_PREFIX: &str = "temp-";

/// Generate a temporary identifier for an offline insert.
///
/// Temp ids are replaced with the server-assigned id once the insert
/// has been replayed successfully.
pub fn temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Check whether an identifier is a client-generated temp id.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Scope of a cache key within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyScope {
    /// A single record, keyed by its entity id.
    Entity(String),
    /// The materialized list view of the whole collection.
    All,
}

/// Composite identifier for a cache entry.
///
/// Rendered as `"<collection>:<entityId>"` for a single record or
/// `"<collection>:all"` for the list view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub collection: String,
    pub scope: KeyScope,
}

impl CacheKey {
    /// Key for a single record in a collection.
    pub fn entity(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            scope: KeyScope::Entity(id.into()),
        }
    }

    /// Key for the materialized list view of a collection.
    pub fn all(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            scope: KeyScope::All,
        }
    }

    /// Parse a key from its `collection:scope` string form.
    ///
    /// # Errors
    /// - Returns `InvalidInput` if the string has no `:` separator or an
    ///   empty collection.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (collection, scope) = s.split_once(':').ok_or_else(|| {
            crate::Error::InvalidInput(format!("Cache key missing separator: {}", s))
        })?;
        if collection.is_empty() || scope.is_empty() {
            return Err(crate::Error::InvalidInput(format!(
                "Cache key has empty component: {}",
                s
            )));
        }
        let scope = if scope == "all" {
            KeyScope::All
        } else {
            KeyScope::Entity(scope.to_string())
        };
        Ok(Self {
            collection: collection.to_string(),
            scope,
        })
    }

    /// Entity id for single-record keys, `None` for the list view.
    pub fn entity_id(&self) -> Option<&str> {
        match &self.scope {
            KeyScope::Entity(id) => Some(id),
            KeyScope::All => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::Entity(id) => write!(f, "{}:{}", self.collection, id),
            KeyScope::All => write!(f, "{}:all", self.collection),
        }
    }
}

/// A write destined for the remote backend.
///
/// Each variant carries exactly the fields its replay needs, so the
/// dispatcher never inspects payload shape at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteAction {
    /// Insert a full record.
    Insert { record: Value },
    /// Patch fields on records matching the criteria.
    Update { criteria: Value, patch: Value },
    /// Delete records matching the criteria.
    Delete { criteria: Value },
    /// Insert the record, replacing any existing record with the same id.
    Upsert { record: Value },
}

impl WriteAction {
    /// Short name of the operation type, for logging and sync reports.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteAction::Insert { .. } => "insert",
            WriteAction::Update { .. } => "update",
            WriteAction::Delete { .. } => "delete",
            WriteAction::Upsert { .. } => "upsert",
        }
    }
}
