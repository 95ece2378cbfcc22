//! Persistent local store for Outpost.
//!
//! Two independent key-indexed collections live here: the cached-entity
//! table and the pending-operation log. This crate is a pure storage
//! primitive; gateway and sync logic live in `outpost-sync`.
//!
//! # Design Principles
//! - Entry-level atomicity: a single key's write is never partially applied
//! - No multi-key transactions: none are required by the callers
//! - Graceful degradation: `StoreHandle` falls back to memory-only caching
//!   when persistent storage is unavailable

pub mod entry;
pub mod file;
pub mod handle;
pub mod memory;
pub mod store;

pub use entry::{CacheEntry, OperationPatch, OperationStatus, PendingOperation};
pub use file::FileStore;
pub use handle::StoreHandle;
pub use memory::MemoryStore;
pub use store::LocalStore;
