//! Network state monitor.
//!
//! Tracks the online/offline state reported by the platform connectivity
//! signal, notifies subscribers on every edge, and requests a background
//! sync whenever the device is online with a pending-operation backlog.
//! There is no debouncing: every edge may trigger a sync, which is safe
//! because the engine is single-flight and replay is idempotent-safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use outpost_store::LocalStore;

use crate::trigger::SyncTrigger;

/// Configuration for the network monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How often the poller checks for a pending backlog.
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

type EdgeCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Observes connectivity transitions and the pending-operation backlog.
pub struct NetworkMonitor {
    online: AtomicBool,
    store: Arc<dyn LocalStore>,
    trigger: SyncTrigger,
    config: MonitorConfig,
    subscribers: Arc<Mutex<HashMap<u64, EdgeCallback>>>,
    next_subscription: AtomicU64,
}

impl NetworkMonitor {
    /// Create a monitor over the given store and sync trigger.
    ///
    /// The initial state is online; the platform signal corrects it on
    /// its first report.
    pub fn new(store: Arc<dyn LocalStore>, trigger: SyncTrigger, config: MonitorConfig) -> Self {
        Self {
            online: AtomicBool::new(true),
            store,
            trigger,
            config,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Best-effort current connectivity state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Feed point for the platform connectivity signal.
    ///
    /// On an edge, subscribers are notified; on an offline-to-online edge
    /// with a backlog, a background sync is requested.
    pub async fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::AcqRel);
        if was == online {
            return;
        }

        info!(online, "Connectivity changed");
        {
            let subscribers = self.subscribers.lock().unwrap();
            for callback in subscribers.values() {
                callback(online);
            }
        }

        if online {
            self.request_sync_if_backlogged().await;
        }
    }

    /// Number of operations currently in the pending log.
    pub async fn pending_count(&self) -> usize {
        match self.store.operation_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Could not read pending backlog: {}", e);
                0
            }
        }
    }

    /// Register an edge callback. Dropping the returned [`Subscription`]
    /// unsubscribes it.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Box::new(callback));
        Subscription {
            id,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Spawn the periodic backlog poller.
    ///
    /// Runs until aborted; each tick requests a sync when online with a
    /// non-empty backlog.
    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(monitor.config.poll_interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.request_sync_if_backlogged().await;
            }
        })
    }

    async fn request_sync_if_backlogged(&self) {
        if self.is_online() && self.pending_count().await > 0 {
            debug!("Backlog present while online, requesting background sync");
            self.trigger.request();
        }
    }
}

/// Handle for a registered edge callback; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Arc<Mutex<HashMap<u64, EdgeCallback>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_common::WriteAction;
    use outpost_store::{MemoryStore, PendingOperation};
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn monitor_with(
        store: Arc<MemoryStore>,
        poll_interval: Duration,
    ) -> (Arc<NetworkMonitor>, tokio::sync::mpsc::Receiver<()>) {
        let (trigger, rx) = SyncTrigger::channel();
        let monitor = Arc::new(NetworkMonitor::new(
            store,
            trigger,
            MonitorConfig { poll_interval },
        ));
        (monitor, rx)
    }

    #[tokio::test]
    async fn test_edges_notify_subscribers() {
        let (monitor, _rx) = monitor_with(Arc::new(MemoryStore::new()), Duration::from_secs(30));

        let edges = Arc::new(AtomicU32::new(0));
        let seen = edges.clone();
        let subscription = monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_online(false).await;
        monitor.set_online(false).await; // No edge, no callback.
        monitor.set_online(true).await;
        assert_eq!(edges.load(Ordering::SeqCst), 2);

        drop(subscription);
        monitor.set_online(false).await;
        assert_eq!(edges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconnect_with_backlog_requests_sync() {
        let store = Arc::new(MemoryStore::new());
        store
            .enqueue_operation(PendingOperation::new(
                "cart_items",
                WriteAction::Insert { record: json!({"n": 1}) },
                None,
            ))
            .await
            .unwrap();

        let (monitor, mut rx) = monitor_with(store, Duration::from_secs(30));

        monitor.set_online(false).await;
        assert!(rx.try_recv().is_err());

        monitor.set_online(true).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_without_backlog_is_quiet() {
        let (monitor, mut rx) = monitor_with(Arc::new(MemoryStore::new()), Duration::from_secs(30));

        monitor.set_online(false).await;
        monitor.set_online(true).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poller_fires_on_backlog() {
        let store = Arc::new(MemoryStore::new());
        store
            .enqueue_operation(PendingOperation::new(
                "cart_items",
                WriteAction::Delete { criteria: json!({"id": "1"}) },
                Some("1".to_string()),
            ))
            .await
            .unwrap();

        let (monitor, mut rx) = monitor_with(store, Duration::from_millis(20));
        let poller = monitor.spawn_poller();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_ok());

        poller.abort();
    }
}
