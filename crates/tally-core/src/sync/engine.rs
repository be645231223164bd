//! Bidirectional sync between the local store and the remote store.
//!
//! Three pass types exist: push (local wins), pull (remote wins, except for
//! records with a pending local delete), and outbox drain (replay queued
//! mutations). At most one pass runs at a time; a pass requested while
//! another is running is a no-op, not an error and not a queue entry.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::auth::{OwnerId, OwnerResolver};
use crate::db::{LocalStore, OperationKind, OutboxQueue, SyncOperation};
use crate::error::{Error, Result};
use crate::models::{EntityKind, EntityRecord};
use crate::remote::RemoteStore;
use crate::sync::status::{StatusPublisher, Subscription, SyncStatus};

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    PushingToCloud = 1,
    PullingFromCloud = 2,
    RetryingOutbox = 3,
}

impl EngineState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PushingToCloud,
            2 => Self::PullingFromCloud,
            3 => Self::RetryingOutbox,
            _ => Self::Idle,
        }
    }
}

/// Result of a push pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records upserted remotely.
    pub pushed: usize,
    /// Records whose upsert failed; they stay covered by the outbox.
    pub failed: usize,
}

/// Result of a pull pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Remote records applied locally.
    pub applied: usize,
    /// Remote records skipped because a local delete is pending.
    pub skipped: usize,
}

/// Result of an outbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations confirmed remotely and removed.
    pub resolved: usize,
    /// Operations that failed and stay queued for another attempt.
    pub retried: usize,
    /// Operations dropped after exhausting their retry budget.
    pub dropped: usize,
}

/// Combined result of a manual "sync now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualSyncReport {
    pub push: PushReport,
    pub drain: DrainReport,
}

/// The sync engine. Cheap to share behind an [`Arc`].
pub struct SyncEngine {
    store: LocalStore,
    outbox: OutboxQueue,
    remote: Arc<dyn RemoteStore>,
    owner: Arc<dyn OwnerResolver>,
    status: StatusPublisher,
    state: AtomicU8,
    online: AtomicBool,
    suspended: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        outbox: OutboxQueue,
        remote: Arc<dyn RemoteStore>,
        owner: Arc<dyn OwnerResolver>,
    ) -> Self {
        Self {
            store,
            outbox,
            remote,
            owner,
            status: StatusPublisher::new(),
            state: AtomicU8::new(EngineState::Idle as u8),
            online: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    // --- observability ---

    /// Handle to the live status, for hosts that pass it around separately.
    pub fn status(&self) -> StatusPublisher {
        self.status.clone()
    }

    /// Current status snapshot.
    pub fn get_status(&self) -> SyncStatus {
        self.status.get_status()
    }

    /// Register a status listener; it fires immediately with the current
    /// snapshot and then once per update.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.status.subscribe(listener)
    }

    /// Re-read the outbox and publish the pending operations.
    pub async fn refresh_pending(&self) -> Result<()> {
        let ops = self.outbox.list_pending().await?;
        self.status.update(|s| {
            s.pending_count = ops.len();
            s.outbox = ops;
        });
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_syncing(&self) -> bool {
        self.state() != EngineState::Idle
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Pause or resume background-triggered passes. Explicit calls still run.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }

    pub fn current_owner(&self) -> Option<OwnerId> {
        self.owner.current_owner()
    }

    /// Number of operations waiting in the outbox.
    pub async fn pending_count(&self) -> Result<usize> {
        self.outbox.pending_count().await
    }

    /// Record a connectivity change. The offline-to-online edge triggers an
    /// immediate sync so work captured offline is flushed right away.
    pub async fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }
        self.status.update(|s| s.online = online);

        if online {
            tracing::info!("connection restored; starting sync");
            if let Err(error) = self.manual_sync().await {
                tracing::warn!("sync after reconnect failed: {error}");
            }
        }
    }

    // --- passes ---

    /// Push every local record to the remote store, local-wins.
    ///
    /// Returns `Ok(None)` when another pass is already running.
    pub async fn sync_to_cloud(&self) -> Result<Option<PushReport>> {
        if !self.try_begin(EngineState::PushingToCloud) {
            tracing::debug!("a sync pass is already running; push skipped");
            return Ok(None);
        }
        self.publish_start();

        let outcome = self.push_pass().await;
        self.finish();

        match outcome {
            Ok(report) => {
                self.publish_push_outcome(&report);
                Ok(Some(report))
            }
            Err(error) => {
                self.publish_failure(&error);
                Err(error)
            }
        }
    }

    /// Replace local data with the remote copy, remote-wins.
    ///
    /// Records with a pending local delete are not resurrected. Returns
    /// `Ok(None)` when another pass is already running.
    pub async fn sync_from_cloud(&self) -> Result<Option<PullReport>> {
        if !self.try_begin(EngineState::PullingFromCloud) {
            tracing::debug!("a sync pass is already running; pull skipped");
            return Ok(None);
        }
        self.publish_start();

        let outcome = self.pull_pass().await;
        self.finish();

        match outcome {
            Ok(report) => {
                self.status.update(|s| {
                    s.syncing = false;
                    s.progress_percent = 100;
                    s.error = None;
                });
                Ok(Some(report))
            }
            Err(error) => {
                self.publish_failure(&error);
                Err(error)
            }
        }
    }

    /// Replay queued operations oldest-first. Returns `Ok(None)` when
    /// another pass is already running.
    pub async fn drain_outbox(&self) -> Result<Option<DrainReport>> {
        if !self.try_begin(EngineState::RetryingOutbox) {
            tracing::debug!("a sync pass is already running; drain skipped");
            return Ok(None);
        }
        self.publish_start();

        let outcome = self.drain_pass().await;
        self.finish();

        match outcome {
            Ok(report) => {
                self.status.update(|s| {
                    s.syncing = false;
                    s.progress_percent = 100;
                    s.error = None;
                });
                if let Err(error) = self.refresh_pending().await {
                    tracing::warn!("failed to refresh pending operations: {error}");
                }
                Ok(Some(report))
            }
            Err(error) => {
                self.publish_failure(&error);
                Err(error)
            }
        }
    }

    /// Explicit "sync now": push, then drain the outbox, as one session.
    ///
    /// Returns `Ok(None)` when another pass is already running.
    pub async fn manual_sync(&self) -> Result<Option<ManualSyncReport>> {
        if !self.try_begin(EngineState::PushingToCloud) {
            tracing::debug!("a sync pass is already running; manual sync skipped");
            return Ok(None);
        }
        self.publish_start();

        let push = match self.push_pass().await {
            Ok(report) => report,
            Err(error) => {
                self.finish();
                self.publish_failure(&error);
                return Err(error);
            }
        };

        self.transition(EngineState::RetryingOutbox);
        let drain = match self.drain_pass().await {
            Ok(report) => report,
            Err(error) => {
                self.finish();
                self.publish_failure(&error);
                return Err(error);
            }
        };

        self.finish();
        self.publish_push_outcome(&push);
        if let Err(error) = self.refresh_pending().await {
            tracing::warn!("failed to refresh pending operations: {error}");
        }
        Ok(Some(ManualSyncReport { push, drain }))
    }

    /// Cheap divergence heuristic: compares the total local record count with
    /// the total remote count. Equal totals are taken as "in sync", so
    /// differing records behind equal counts go undetected until the next
    /// push or pull.
    pub async fn check_sync_needed(&self) -> Result<bool> {
        let owner = self.owner.current_owner().ok_or(Error::NotAuthenticated)?;
        let local_total = self.store.size().await?;

        let mut remote_total = 0_u64;
        for kind in EntityKind::ALL {
            remote_total += self.remote.count(&owner, kind).await?;
        }

        if local_total != remote_total {
            tracing::debug!(local_total, remote_total, "record counts diverge");
        }
        Ok(local_total != remote_total)
    }

    // --- pass bodies ---

    async fn push_pass(&self) -> Result<PushReport> {
        self.owner.current_owner().ok_or(Error::NotAuthenticated)?;

        let mut report = PushReport::default();
        for (index, kind) in EntityKind::ALL.into_iter().enumerate() {
            let records = self.store.list(kind).await?;
            // The owner is re-resolved per kind: a sign-out mid-pass turns
            // the remaining upserts into individual failures instead of
            // aborting the pass.
            let owner = self.owner.current_owner();
            for record in &records {
                let outcome = match owner.as_ref() {
                    Some(owner) => self.remote.upsert(owner, record).await,
                    None => Err(Error::NotAuthenticated),
                };
                match outcome {
                    Ok(()) => report.pushed += 1,
                    Err(error) => {
                        report.failed += 1;
                        tracing::warn!(
                            kind = %kind,
                            id = %record.entity_id(),
                            "failed to push record: {error}"
                        );
                    }
                }
            }
            self.status
                .update(|s| s.progress_percent = progress_after(index + 1));
        }
        Ok(report)
    }

    async fn pull_pass(&self) -> Result<PullReport> {
        let owner = self.owner.current_owner().ok_or(Error::NotAuthenticated)?;
        let pending_deletes = self.outbox.pending_delete_ids().await?;

        // Remote wins wholesale, so local state is cleared up front. The
        // outbox survives the wipe and keeps covering un-pushed work.
        self.store.clear_all().await?;

        let mut report = PullReport::default();
        for (index, kind) in EntityKind::ALL.into_iter().enumerate() {
            let records = self.remote.select_all(&owner, kind).await?;
            for record in records {
                if pending_deletes.contains(record.entity_id()) {
                    report.skipped += 1;
                    tracing::debug!(
                        kind = %kind,
                        id = %record.entity_id(),
                        "skipped remote record with a pending local delete"
                    );
                    continue;
                }
                self.store.insert_record(&record).await?;
                report.applied += 1;
            }
            self.status
                .update(|s| s.progress_percent = progress_after(index + 1));
        }
        Ok(report)
    }

    async fn drain_pass(&self) -> Result<DrainReport> {
        let owner = self.owner.current_owner().ok_or(Error::NotAuthenticated)?;

        // Snapshot: operations enqueued while draining wait for the next run.
        let pending = self.outbox.list_pending().await?;
        let mut report = DrainReport::default();

        for op in pending {
            match self.replay(&owner, &op).await {
                Ok(()) => {
                    self.outbox.mark_resolved(&op.id).await?;
                    report.resolved += 1;
                }
                Err(error) => {
                    let retries = self.outbox.increment_retry(&op.id).await?;
                    if retries >= op.max_retries {
                        self.outbox.mark_resolved(&op.id).await?;
                        report.dropped += 1;
                        tracing::error!(
                            op = %op.id,
                            kind = %op.entity_kind,
                            entity = %op.entity_id,
                            "dropping operation after {retries} failed attempts: {error}"
                        );
                    } else {
                        report.retried += 1;
                        tracing::warn!(
                            op = %op.id,
                            "replay failed (attempt {retries} of {}): {error}",
                            op.max_retries
                        );
                    }
                }
            }
        }
        Ok(report)
    }

    async fn replay(&self, owner: &OwnerId, op: &SyncOperation) -> Result<()> {
        match op.kind {
            OperationKind::Create | OperationKind::Update => {
                let record = EntityRecord::from_payload(op.entity_kind, op.payload.clone())?;
                self.remote.upsert(owner, &record).await
            }
            OperationKind::Delete => {
                self.remote
                    .delete(owner, op.entity_kind, &op.entity_id)
                    .await
            }
        }
    }

    // --- state guard ---

    fn try_begin(&self, target: EngineState) -> bool {
        self.state
            .compare_exchange(
                EngineState::Idle as u8,
                target as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn transition(&self, target: EngineState) {
        self.state.store(target as u8, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.state.store(EngineState::Idle as u8, Ordering::SeqCst);
    }

    // --- status helpers ---

    fn publish_start(&self) {
        self.status.update(|s| {
            s.syncing = true;
            s.progress_percent = 0;
            s.error = None;
        });
    }

    fn publish_push_outcome(&self, report: &PushReport) {
        let error =
            (report.failed > 0).then(|| format!("{} record(s) failed to push", report.failed));
        let fully_synced = report.failed == 0;
        self.status.update(move |s| {
            s.syncing = false;
            s.progress_percent = 100;
            s.error = error;
            if fully_synced {
                s.last_sync_at = Some(Utc::now());
            }
        });
    }

    fn publish_failure(&self, error: &Error) {
        let message = error.to_string();
        self.status.update(move |s| {
            s.syncing = false;
            s.error = Some(message);
        });
    }
}

/// Progress after finishing `completed_kinds` of the seven collections.
/// Even steps of 14, with the final step landing exactly on 100.
fn progress_after(completed_kinds: usize) -> u8 {
    if completed_kinds >= EntityKind::ALL.len() {
        100
    } else {
        u8::try_from(completed_kinds * 14).unwrap_or(100)
    }
}
