use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

/// Whether durable writes are outstanding.
///
/// `Synced` means every issued write has resolved, failed ones included; it
/// reflects liveness, not success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Tracks outstanding writes reported by the reconciler. Performs no I/O.
pub struct SyncTracker {
    counters: Mutex<SyncCounters>,
    status: watch::Sender<SyncStatus>,
}

impl SyncTracker {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            counters: Mutex::new(SyncCounters::default()),
            status,
        }
    }

    /// A write has been issued.
    pub fn begin(&self) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.in_flight += 1;
        self.set(SyncStatus::Syncing);
    }

    /// A previously issued write resolved.
    pub fn complete(&self, succeeded: bool) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.in_flight = counters.in_flight.saturating_sub(1);
        counters.completed += 1;
        if !succeeded {
            counters.failed += 1;
        }
        if counters.in_flight == 0 {
            self.set(SyncStatus::Synced);
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn counters(&self) -> SyncCounters {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Resolves once nothing is in flight. Returns immediately when idle.
    pub async fn settled(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|status| *status != SyncStatus::Syncing).await;
    }

    // caller holds the counters lock so status changes follow counter order
    fn set(&self, next: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let tracker = SyncTracker::new();
        assert_eq!(tracker.status(), SyncStatus::Idle);
        assert_eq!(tracker.counters(), SyncCounters::default());
    }

    #[test]
    fn cycles_between_syncing_and_synced() {
        let tracker = SyncTracker::new();

        tracker.begin();
        tracker.begin();
        assert_eq!(tracker.status(), SyncStatus::Syncing);

        tracker.complete(true);
        assert_eq!(tracker.status(), SyncStatus::Syncing);
        tracker.complete(false);
        assert_eq!(tracker.status(), SyncStatus::Synced);

        tracker.begin();
        assert_eq!(tracker.status(), SyncStatus::Syncing);
        tracker.complete(true);
        assert_eq!(tracker.status(), SyncStatus::Synced);

        assert_eq!(
            tracker.counters(),
            SyncCounters {
                in_flight: 0,
                completed: 3,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let tracker = SyncTracker::new();
        let mut rx = tracker.subscribe();

        tracker.begin();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Syncing);

        tracker.complete(true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn settled_waits_for_last_completion() {
        let tracker = std::sync::Arc::new(SyncTracker::new());
        tracker.settled().await;

        tracker.begin();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.settled().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tracker.complete(true);
        waiter.await.unwrap();
        assert_eq!(tracker.status(), SyncStatus::Synced);
    }
}
