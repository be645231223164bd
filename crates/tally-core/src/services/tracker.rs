//! The mutation facade the app talks to.
//!
//! Every write lands in the local store first (reads see it immediately,
//! network or not), then a matching operation is appended to the outbox for
//! the sync engine to replay. The published status is refreshed after each
//! mutation so subscribers see the pending queue grow and shrink live.

use serde_json::json;

use crate::db::{LocalStore, OperationKind, OutboxQueue};
use crate::error::Result;
use crate::models::{
    Activity, EntityKind, EntityRecord, Intake, IntakeLog, NoteLog, ReadingLog, ReadingObject,
    SessionLog,
};
use crate::sync::StatusPublisher;

/// Local-first CRUD with outbox capture.
#[derive(Clone)]
pub struct TrackerService {
    store: LocalStore,
    outbox: OutboxQueue,
    status: StatusPublisher,
}

impl TrackerService {
    pub fn new(store: LocalStore, outbox: OutboxQueue, status: StatusPublisher) -> Self {
        Self {
            store,
            outbox,
            status,
        }
    }

    /// Direct access to the underlying store, for read paths that do not
    /// need the facade.
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Add a record and queue its upload.
    pub async fn add_record(&self, record: impl Into<EntityRecord>) -> Result<EntityRecord> {
        let record = record.into();
        self.store.insert_record(&record).await?;
        self.outbox
            .enqueue(
                OperationKind::Create,
                record.kind(),
                record.entity_id(),
                record.to_payload()?,
            )
            .await?;
        self.refresh_status().await?;
        Ok(record)
    }

    /// Update an existing record and queue the new snapshot.
    pub async fn update_record(&self, record: impl Into<EntityRecord>) -> Result<()> {
        let record = record.into();
        self.store.update_record(&record).await?;
        self.outbox
            .enqueue(
                OperationKind::Update,
                record.kind(),
                record.entity_id(),
                record.to_payload()?,
            )
            .await?;
        self.refresh_status().await
    }

    /// Delete a record (cascading to dependent logs) and queue the delete.
    pub async fn delete_record(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.store.delete(kind, id).await?;
        self.outbox
            .enqueue(OperationKind::Delete, kind, id, json!({ "id": id }))
            .await?;
        self.refresh_status().await
    }

    pub async fn list_activities(&self) -> Result<Vec<Activity>> {
        self.store.list_activities().await
    }

    pub async fn list_intakes(&self) -> Result<Vec<Intake>> {
        self.store.list_intakes().await
    }

    pub async fn list_reading_objects(&self) -> Result<Vec<ReadingObject>> {
        self.store.list_reading_objects().await
    }

    pub async fn list_session_logs(&self) -> Result<Vec<SessionLog>> {
        self.store.list_session_logs().await
    }

    pub async fn list_intake_logs(&self) -> Result<Vec<IntakeLog>> {
        self.store.list_intake_logs().await
    }

    pub async fn list_reading_logs(&self) -> Result<Vec<ReadingLog>> {
        self.store.list_reading_logs().await
    }

    pub async fn list_note_logs(&self) -> Result<Vec<NoteLog>> {
        self.store.list_note_logs().await
    }

    /// Push the current outbox snapshot into the published status.
    pub async fn refresh_status(&self) -> Result<()> {
        let ops = self.outbox.list_pending().await?;
        self.status.update(|s| {
            s.pending_count = ops.len();
            s.outbox = ops;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OwnerHandle, OwnerResolver};
    use crate::db::Database;
    use crate::error::Error;
    use crate::models::ActivityCategory;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Fixture {
        service: TrackerService,
        outbox: OutboxQueue,
        status: StatusPublisher,
        owner: OwnerHandle,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().await.unwrap().into_shared();
        let owner = OwnerHandle::signed_in("user-1".into());
        let resolver: Arc<dyn OwnerResolver> = Arc::new(owner.clone());
        let store = LocalStore::new(Arc::clone(&db), resolver);
        let outbox = OutboxQueue::new(db);
        let status = StatusPublisher::new();
        let service = TrackerService::new(store, outbox.clone(), status.clone());
        Fixture {
            service,
            outbox,
            status,
            owner,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_writes_store_and_outbox() {
        let f = fixture().await;

        let record = f
            .service
            .add_record(Activity::new("Gym", ActivityCategory::Health))
            .await
            .unwrap();

        let activities = f.service.list_activities().await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].id, record.entity_id());

        let pending = f.outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, OperationKind::Create);
        assert_eq!(pending[0].entity_id, record.entity_id());
        assert_eq!(pending[0].payload, record.to_payload().unwrap());

        let status = f.status.get_status();
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.outbox, pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_enqueues_new_snapshot() {
        let f = fixture().await;
        let mut activity = Activity::new("Gym", ActivityCategory::Health);
        f.service.add_record(activity.clone()).await.unwrap();

        activity.name = "Gym (evening)".to_string();
        f.service.update_record(activity.clone()).await.unwrap();

        let activities = f.service.list_activities().await.unwrap();
        assert_eq!(activities[0].name, "Gym (evening)");

        let pending = f.outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].kind, OperationKind::Update);
        assert_eq!(
            pending[1].payload.get("name").and_then(|v| v.as_str()),
            Some("Gym (evening)")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_of_missing_record_enqueues_nothing() {
        let f = fixture().await;

        let err = f
            .service
            .update_record(Activity::new("Ghost", ActivityCategory::Other))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(f.outbox.pending_count().await.unwrap(), 0);
        assert_eq!(f.status.get_status().pending_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_cascades_and_enqueues_id_only_payload() {
        let f = fixture().await;
        let activity = Activity::new("Gym", ActivityCategory::Health);
        let activity_id = activity.id.clone();
        f.service.add_record(activity).await.unwrap();
        let start = Utc::now();
        f.service
            .add_record(SessionLog::new(
                activity_id.clone(),
                start,
                start + Duration::minutes(30),
            ))
            .await
            .unwrap();

        f.service
            .delete_record(EntityKind::Activity, &activity_id)
            .await
            .unwrap();

        assert!(f.service.list_activities().await.unwrap().is_empty());
        assert!(f.service.list_session_logs().await.unwrap().is_empty());

        let pending = f.outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        let delete_op = &pending[2];
        assert_eq!(delete_op.kind, OperationKind::Delete);
        assert_eq!(delete_op.entity_kind, EntityKind::Activity);
        assert_eq!(delete_op.payload, json!({ "id": activity_id }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_signed_out_mutations_fail_without_ghost_operations() {
        let f = fixture().await;
        f.owner.clear();

        let err = f
            .service
            .add_record(Activity::new("Gym", ActivityCategory::Health))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotAuthenticated));
        assert_eq!(f.outbox.pending_count().await.unwrap(), 0);
    }
}
