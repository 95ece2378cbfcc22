//! Remote backend trait definition.

use async_trait::async_trait;
use serde_json::Value;

use outpost_common::{Result, WriteAction};

/// The row-oriented data service this layer replays writes against.
///
/// The backend itself is an external collaborator; this trait is the
/// interface it presents. Authentication context is attached per call by
/// the implementation (supplied by a collaborator outside this layer).
///
/// Replay safety: `update` and `delete` are expressed via match criteria,
/// so re-applying an already-applied write is a server-side no-op. The
/// sync engine relies on this for at-least-once delivery.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Backend name (e.g. "http", "memory"), for logging.
    fn name(&self) -> &str;

    /// Apply a write to a collection.
    ///
    /// # Postconditions
    /// - `Insert`/`Upsert` return the stored record, including the
    ///   server-assigned id.
    /// - `Update` returns the updated rows as a JSON array (possibly
    ///   empty when nothing matched).
    /// - `Delete` returns `None`; deleting nothing is a success.
    ///
    /// # Errors
    /// - `RemoteUnavailable` for network or backend failures.
    async fn execute(&self, collection: &str, action: &WriteAction) -> Result<Option<Value>>;

    /// Fetch rows from a collection, optionally filtered by field equality.
    ///
    /// # Errors
    /// - `RemoteUnavailable` for network or backend failures.
    async fn query(&self, collection: &str, filter: Option<&Value>) -> Result<Vec<Value>>;
}
