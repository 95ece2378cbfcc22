//! Background-sync request plumbing.
//!
//! A [`SyncTrigger`] is the fire-and-forget "run the sync engine soon"
//! signal consumed by gateway and monitor. Requests coalesce: while one
//! signal is queued, further requests are dropped. The [`SyncWorker`]
//! drains the signal channel into [`SyncEngine::sync_pending`], the
//! direct-invocation path used when no platform background-sync facility
//! is available.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use outpost_common::Error;

use crate::engine::SyncEngine;

/// Fire-and-forget request for a sync run "soon".
#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Create a trigger and the receiving end of its signal channel.
    ///
    /// Most callers want [`SyncWorker::new`] instead, which keeps the
    /// receiver paired with the engine that drains it.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a background sync. Never blocks; a request while one is
    /// already queued is coalesced into it.
    pub fn request(&self) {
        match self.tx.try_send(()) {
            Ok(()) => debug!("Background sync requested"),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Background sync already requested, coalescing")
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Sync worker not running, request dropped")
            }
        }
    }
}

/// Background task that runs the sync engine on demand.
pub struct SyncWorker {
    rx: mpsc::Receiver<()>,
    engine: Arc<SyncEngine>,
}

impl SyncWorker {
    /// Create a worker for the engine and the trigger that drives it.
    pub fn new(engine: Arc<SyncEngine>) -> (SyncTrigger, Self) {
        let (trigger, rx) = SyncTrigger::channel();
        (trigger, Self { rx, engine })
    }

    /// Run until every trigger handle has been dropped.
    ///
    /// This should be spawned in a tokio task.
    pub async fn run(mut self) {
        info!("Sync worker started");

        while self.rx.recv().await.is_some() {
            match self.engine.sync_pending().await {
                Ok(report) => {
                    info!(
                        synced = report.synced,
                        failed = report.failed,
                        "Background sync completed"
                    );
                }
                Err(Error::SyncInProgress) => {
                    debug!("Sync already in progress, skipping trigger");
                }
                Err(e) => {
                    error!("Background sync failed: {}", e);
                }
            }
        }

        info!("Sync worker shutting down");
    }
}
