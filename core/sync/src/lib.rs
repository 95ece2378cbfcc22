//! Offline-first synchronization layer.
//!
//! Builds on [`outpost_store`] and [`outpost_remote`] to give
//! applications continuous data access across connectivity loss:
//!
//! - [`Gateway`] serves reads and writes, falling back to the cache and
//!   the pending-operation log when the remote is unreachable
//! - [`SyncEngine`] replays the queued backlog in FIFO order with
//!   exponential backoff and temp-id reconciliation
//! - [`NetworkMonitor`] tracks connectivity, notifies subscribers, and
//!   requests sync runs when a backlog exists
//! - [`Warmer`] prefetches configured collections at session start
//!
//! Sync runs are requested through a coalescing [`SyncTrigger`] and
//! executed by a single [`SyncWorker`] task, so concurrent triggers
//! never produce overlapping replays.

pub mod backoff;
pub mod engine;
pub mod gateway;
pub mod monitor;
pub mod trigger;
pub mod warmer;

pub use backoff::BackoffConfig;
pub use engine::{EngineConfig, EngineStatus, SyncEngine, SyncFailure, SyncReport};
pub use gateway::{Gateway, GatewayConfig, GatewayResponse};
pub use monitor::{MonitorConfig, NetworkMonitor, Subscription};
pub use trigger::{SyncTrigger, SyncWorker};
pub use warmer::{WarmJob, WarmReport, WarmScope, Warmer, WarmerConfig};
