//! Periodic background sync.
//!
//! A spawned task wakes on a fixed interval and runs a full sync pass,
//! pushing local records and then replaying pending operations through the
//! engine. Every tick re-checks the cheap guards (suspended, offline,
//! already syncing, signed out, nothing pending) so the task stays quiet
//! when there is no work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::sync::engine::SyncEngine;

/// How often the background task looks for pending operations.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the background sync task. Start and stop are idempotent.
pub struct BackgroundSync {
    engine: Arc<SyncEngine>,
    interval: Duration,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundSync {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self::with_interval(engine, DEFAULT_SYNC_INTERVAL)
    }

    pub fn with_interval(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the periodic task. Calling this while it is already running
    /// does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("background sync is already running");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first pass happens one full interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                Self::tick(&engine).await;
            }
        });

        *self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "background sync started"
        );
    }

    /// Signal the task to exit and abort it. Does nothing when stopped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        tracing::info!("background sync stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn tick(engine: &SyncEngine) {
        if engine.is_suspended() {
            tracing::trace!("suspended; skipping background sync");
            return;
        }
        if !engine.is_online() {
            tracing::trace!("offline; skipping background sync");
            return;
        }
        if engine.is_syncing() {
            tracing::trace!("a sync pass is running; skipping background sync");
            return;
        }
        if engine.current_owner().is_none() {
            tracing::trace!("signed out; skipping background sync");
            return;
        }

        let pending = match engine.pending_count().await {
            Ok(0) => return,
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!("failed to read the outbox: {error}");
                return;
            }
        };

        tracing::debug!(pending, "background sync starting");
        match engine.manual_sync().await {
            Ok(Some(report)) => tracing::info!(
                pushed = report.push.pushed,
                failed = report.push.failed,
                resolved = report.drain.resolved,
                retried = report.drain.retried,
                dropped = report.drain.dropped,
                "background sync finished"
            ),
            Ok(None) => tracing::debug!("engine became busy; background sync skipped"),
            Err(error) => tracing::warn!("background sync failed: {error}"),
        }
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        self.stop();
    }
}
