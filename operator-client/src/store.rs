//! Canonical store for the latest bot state snapshot
//!
//! The connection manager is the only writer. Every `replace` overwrites the
//! previous snapshot and pushes the new one to each subscriber, in the order
//! they subscribed, before returning.

use std::sync::Arc;

use operator_core::BotStateSnapshot;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiving end of a store subscription
pub type SnapshotReceiver = mpsc::UnboundedReceiver<Arc<BotStateSnapshot>>;

/// Latest-snapshot cell with ordered subscriber notification
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    current: Option<Arc<BotStateSnapshot>>,
    subscribers: Vec<mpsc::UnboundedSender<Arc<BotStateSnapshot>>>,
    replacements: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot, or `None` before the first frame
    pub fn current(&self) -> Option<Arc<BotStateSnapshot>> {
        self.inner.lock().current.clone()
    }

    /// Register a subscriber; it sees every snapshot replaced after this call
    pub fn subscribe(&self) -> SnapshotReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Replace the current snapshot and notify subscribers
    pub fn replace(&self, snapshot: BotStateSnapshot) -> Arc<BotStateSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut inner = self.inner.lock();
        inner.current = Some(Arc::clone(&snapshot));
        inner.replacements += 1;

        let before = inner.subscribers.len();
        inner
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
        let dropped = before - inner.subscribers.len();
        if dropped > 0 {
            debug!("[StateStore] Pruned {} closed subscriber(s)", dropped);
        }

        snapshot
    }

    /// Number of snapshots replaced since creation
    pub fn replacements(&self) -> u64 {
        self.inner.lock().replacements
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateStore")
            .field("has_snapshot", &inner.current.is_some())
            .field("replacements", &inner.replacements)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operator_core::RunStatus;

    fn snapshot_with_fills(fills: u64) -> BotStateSnapshot {
        BotStateSnapshot {
            status: RunStatus::Running,
            fills_count: fills,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_before_first_frame() {
        let store = StateStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.replacements(), 0);
    }

    #[test]
    fn test_replace_overwrites() {
        let store = StateStore::new();
        store.replace(snapshot_with_fills(1));
        store.replace(snapshot_with_fills(2));

        assert_eq!(store.current().unwrap().fills_count, 2);
        assert_eq!(store.replacements(), 2);
    }

    #[test]
    fn test_subscribers_receive_every_snapshot_in_order() {
        let store = StateStore::new();
        let mut first = store.subscribe();
        let mut second = store.subscribe();

        for fills in 1..=3 {
            store.replace(snapshot_with_fills(fills));
        }

        for rx in [&mut first, &mut second] {
            let seen: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|s| s.fills_count)
                .collect();
            assert_eq!(seen, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_late_subscriber_only_sees_new_snapshots() {
        let store = StateStore::new();
        store.replace(snapshot_with_fills(1));

        let mut rx = store.subscribe();
        assert!(rx.try_recv().is_err());

        store.replace(snapshot_with_fills(2));
        assert_eq!(rx.try_recv().unwrap().fills_count, 2);
    }

    #[test]
    fn test_closed_subscribers_pruned() {
        let store = StateStore::new();
        let rx = store.subscribe();
        let _kept = store.subscribe();
        drop(rx);

        store.replace(snapshot_with_fills(1));
        assert_eq!(store.subscriber_count(), 1);
    }
}
