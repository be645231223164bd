//! Observable sync status.
//!
//! One publisher holds the current [`SyncStatus`]; any number of listeners
//! receive a callback for every single update, in order, with no coalescing.
//! A new listener is called immediately with the current snapshot so it never
//! starts blank.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::SyncOperation;

/// Snapshot of the sync engine's externally visible state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    /// Whether the host currently believes it has connectivity.
    pub online: bool,
    /// Whether a sync pass is running right now.
    pub syncing: bool,
    /// Progress through the current pass, 0-100.
    pub progress_percent: u8,
    /// Completion time of the last fully successful push.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Message from the last failed pass, cleared when one succeeds.
    pub error: Option<String>,
    /// Number of outbox operations awaiting confirmation.
    pub pending_count: usize,
    /// The pending operations themselves, oldest first.
    pub outbox: Vec<SyncOperation>,
}

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct Inner {
    status: SyncStatus,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

/// Shared handle to the current sync status.
#[derive(Clone, Default)]
pub struct StatusPublisher {
    inner: Arc<Mutex<Inner>>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot.
    pub fn get_status(&self) -> SyncStatus {
        self.lock().status.clone()
    }

    /// Register a listener and deliver the current snapshot to it at once.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Listener = Arc::new(listener);
        let (id, snapshot) = {
            let mut inner = self.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.status.clone())
        };
        // Initial delivery happens outside the lock, like every other one.
        listener(&snapshot);

        Subscription {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Apply a mutation to the status and notify every listener.
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut SyncStatus)) {
        let (snapshot, listeners) = {
            let mut inner = self.lock();
            mutate(&mut inner.status);
            (inner.status.clone(), inner.listeners.clone())
        };
        for (_, listener) in &listeners {
            listener(&snapshot);
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

/// Guard for one registered listener; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl Subscription {
    /// Explicitly remove the listener. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.listeners.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recording_listener() -> (Arc<Mutex<Vec<SyncStatus>>>, impl Fn(&SyncStatus) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |status: &SyncStatus| {
            sink.lock().unwrap().push(status.clone());
        };
        (seen, listener)
    }

    #[test]
    fn subscribe_delivers_current_snapshot_immediately() {
        let publisher = StatusPublisher::new();
        publisher.update(|s| s.online = true);

        let (seen, listener) = recording_listener();
        let _sub = publisher.subscribe(listener);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].online);
    }

    #[test]
    fn every_update_reaches_every_listener_in_order() {
        let publisher = StatusPublisher::new();
        let (seen_a, listener_a) = recording_listener();
        let (seen_b, listener_b) = recording_listener();
        let _sub_a = publisher.subscribe(listener_a);
        let _sub_b = publisher.subscribe(listener_b);

        publisher.update(|s| s.progress_percent = 14);
        publisher.update(|s| s.progress_percent = 28);
        publisher.update(|s| s.progress_percent = 42);

        for seen in [&seen_a, &seen_b] {
            let seen = seen.lock().unwrap();
            // initial snapshot + three updates, none coalesced
            let progress: Vec<u8> = seen.iter().map(|s| s.progress_percent).collect();
            assert_eq!(progress, vec![0, 14, 28, 42]);
        }
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let publisher = StatusPublisher::new();
        let (seen, listener) = recording_listener();

        let sub = publisher.subscribe(listener);
        publisher.update(|s| s.online = true);
        assert_eq!(publisher.listener_count(), 1);

        drop(sub);
        assert_eq!(publisher.listener_count(), 0);
        publisher.update(|s| s.online = false);

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn get_status_reflects_latest_update() {
        let publisher = StatusPublisher::new();
        publisher.update(|s| {
            s.syncing = true;
            s.pending_count = 3;
        });

        let status = publisher.get_status();
        assert!(status.syncing);
        assert_eq!(status.pending_count, 3);
        assert_eq!(status.last_sync_at, None);
    }

    #[test]
    fn listeners_can_read_status_during_callback() {
        // A listener that calls back into get_status() must not deadlock.
        let publisher = StatusPublisher::new();
        let inner = publisher.clone();
        let observed = Arc::new(Mutex::new(0_u8));
        let sink = Arc::clone(&observed);

        let _sub = publisher.subscribe(move |_| {
            *sink.lock().unwrap() = inner.get_status().progress_percent;
        });
        publisher.update(|s| s.progress_percent = 70);

        assert_eq!(*observed.lock().unwrap(), 70);
    }
}
