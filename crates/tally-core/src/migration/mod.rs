//! One-shot import from the legacy flat storage format.
//!
//! The legacy app kept one JSON array per collection in a string-keyed blob
//! store, with camelCase field names and `*Ref` foreign keys. This module
//! reads those arrays, converts them to current records, and loads them into
//! the local store. Kinds are imported independently: a malformed array is
//! recorded and skipped without blocking the rest, and the legacy source is
//! only cleared when every kind imported cleanly.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{
    new_entity_id, Activity, ActivityCategory, EntityKind, EntityRecord, Intake, IntakeKind,
    IntakeLog, IntakeUnit, NoteLog, ReadingLog, ReadingObject, SessionLog, TrackerEntry,
};

/// Where legacy collections come from: a JSON array per well-known key.
pub trait LegacySource: Send + Sync {
    /// The raw JSON stored under a collection key, if any.
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Remove every stored collection.
    fn clear(&self) -> Result<()>;
}

/// Legacy source backed by a single JSON object file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileLegacySource {
    path: PathBuf,
}

impl JsonFileLegacySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(serde_json::Map::new());
            }
            Err(error) => return Err(error.into()),
        };
        match serde_json::from_str(&text)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidInput(format!(
                "legacy file {} is not a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl LegacySource for JsonFileLegacySource {
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut map = self.load()?;
        Ok(map.remove(key))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Whether a migration should run, and the counts behind that verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    /// True iff legacy data exists and the store is still empty.
    pub needs_migration: bool,
    pub legacy_count: usize,
    pub store_count: u64,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationResult {
    /// Records imported per kind, in collection order.
    pub counts: Vec<(EntityKind, usize)>,
    /// Kinds that failed, with the failure message.
    pub errors: Vec<(EntityKind, String)>,
}

impl MigrationResult {
    #[must_use]
    pub fn total_imported(&self) -> usize {
        self.counts.iter().map(|(_, count)| *count).sum()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse a partial failure into an error, for callers that only
    /// need an exit code.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::MigrationPartialFailure(self.errors.len()))
        }
    }
}

/// Runs the one-shot legacy import.
pub struct MigrationAdapter {
    store: LocalStore,
    source: Arc<dyn LegacySource>,
}

impl MigrationAdapter {
    pub fn new(store: LocalStore, source: Arc<dyn LegacySource>) -> Self {
        Self { store, source }
    }

    /// Compare legacy and store counts. Migration is only suggested into an
    /// empty store; anything already there wins over legacy data.
    pub async fn check_status(&self) -> Result<MigrationStatus> {
        let legacy_count = self.count_legacy()?;
        let store_count = self.store.size().await?;
        Ok(MigrationStatus {
            needs_migration: legacy_count > 0 && store_count == 0,
            legacy_count,
            store_count,
        })
    }

    /// Import every legacy collection into the local store.
    ///
    /// This does not re-check [`check_status`](Self::check_status); callers
    /// decide when to run it. Kinds fail independently, and the legacy
    /// source is cleared only after a fully clean run.
    pub async fn migrate(&self) -> Result<MigrationResult> {
        // Store writes need an owner; failing here beats recording the same
        // error seven times over.
        if self.store.current_owner().is_none() {
            return Err(Error::NotAuthenticated);
        }

        let mut result = MigrationResult::default();
        for kind in EntityKind::ALL {
            match self.import_kind(kind).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(kind = %kind, count, "imported legacy records");
                    }
                    result.counts.push((kind, count));
                }
                Err(error) => {
                    tracing::warn!(kind = %kind, "legacy import failed: {error}");
                    result.counts.push((kind, 0));
                    result.errors.push((kind, error.to_string()));
                }
            }
        }

        if result.errors.is_empty() {
            self.source.clear()?;
            tracing::info!(
                imported = result.total_imported(),
                "legacy migration finished; source cleared"
            );
        } else {
            tracing::warn!(
                failed_kinds = result.errors.len(),
                "legacy migration incomplete; source kept for another attempt"
            );
        }
        Ok(result)
    }

    fn count_legacy(&self) -> Result<usize> {
        let mut total = 0;
        for kind in EntityKind::ALL {
            match self.source.read(kind.legacy_key())? {
                Some(serde_json::Value::Array(records)) => total += records.len(),
                Some(_) => {
                    tracing::warn!(key = kind.legacy_key(), "legacy value is not an array");
                }
                None => {}
            }
        }
        Ok(total)
    }

    async fn import_kind(&self, kind: EntityKind) -> Result<usize> {
        let Some(value) = self.source.read(kind.legacy_key())? else {
            return Ok(0);
        };
        let records = decode_legacy_records(kind, value)?;
        let count = records.len();
        for record in &records {
            self.store.insert_record(record).await?;
        }
        Ok(count)
    }
}

fn decode_legacy_records(kind: EntityKind, value: serde_json::Value) -> Result<Vec<EntityRecord>> {
    fn decode<T>(value: serde_json::Value) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_value(value)?)
    }

    let records = match kind {
        EntityKind::Activity => decode::<LegacyActivity>(value)?
            .into_iter()
            .map(LegacyActivity::into_record)
            .collect(),
        EntityKind::Intake => decode::<LegacyIntake>(value)?
            .into_iter()
            .map(LegacyIntake::into_record)
            .collect(),
        EntityKind::ReadingObject => decode::<LegacyReadingObject>(value)?
            .into_iter()
            .map(LegacyReadingObject::into_record)
            .collect(),
        EntityKind::SessionLog => decode::<LegacySessionLog>(value)?
            .into_iter()
            .map(LegacySessionLog::into_record)
            .collect(),
        EntityKind::IntakeLog => decode::<LegacyIntakeLog>(value)?
            .into_iter()
            .map(LegacyIntakeLog::into_record)
            .collect(),
        EntityKind::ReadingLog => decode::<LegacyReadingLog>(value)?
            .into_iter()
            .map(LegacyReadingLog::into_record)
            .collect(),
        EntityKind::NoteLog => decode::<LegacyNoteLog>(value)?
            .into_iter()
            .map(LegacyNoteLog::into_record)
            .collect(),
    };
    Ok(records)
}

// Legacy records: camelCase fields, `*Ref` foreign keys, and optional ids.
// Records without an id get a fresh one instead of failing the kind.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyActivity {
    id: Option<String>,
    name: String,
    category: ActivityCategory,
    #[serde(default)]
    sub_activity: Option<String>,
    #[serde(default)]
    sub_sub_activity: Option<String>,
    #[serde(default)]
    info: Option<String>,
}

impl LegacyActivity {
    fn into_record(self) -> EntityRecord {
        Activity {
            id: self.id.unwrap_or_else(new_entity_id),
            name: self.name,
            category: self.category,
            sub_activity: self.sub_activity,
            sub_sub_activity: self.sub_sub_activity,
            info: self.info,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyIntake {
    id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    kind: IntakeKind,
    default_quantity: f64,
    default_unit: IntakeUnit,
    #[serde(default)]
    info: Option<String>,
}

impl LegacyIntake {
    fn into_record(self) -> EntityRecord {
        Intake {
            id: self.id.unwrap_or_else(new_entity_id),
            name: self.name,
            kind: self.kind,
            default_quantity: self.default_quantity,
            default_unit: self.default_unit,
            info: self.info,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReadingObject {
    id: Option<String>,
    book_name: String,
    author: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    info: Option<String>,
}

impl LegacyReadingObject {
    fn into_record(self) -> EntityRecord {
        ReadingObject {
            id: self.id.unwrap_or_else(new_entity_id),
            book_name: self.book_name,
            author: self.author,
            year: self.year,
            info: self.info,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySessionLog {
    id: Option<String>,
    activity_ref: String,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    notes: Vec<String>,
}

impl LegacySessionLog {
    fn into_record(self) -> EntityRecord {
        SessionLog {
            id: self.id.unwrap_or_else(new_entity_id),
            activity_id: self.activity_ref,
            time_start: self.time_start,
            time_end: self.time_end,
            tracker_entries: self.tracker_entries,
            notes: self.notes,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyIntakeLog {
    id: Option<String>,
    intake_ref: String,
    timestamp: DateTime<Utc>,
    quantity: f64,
    unit: IntakeUnit,
}

impl LegacyIntakeLog {
    fn into_record(self) -> EntityRecord {
        IntakeLog {
            id: self.id.unwrap_or_else(new_entity_id),
            intake_id: self.intake_ref,
            timestamp: self.timestamp,
            quantity: self.quantity,
            unit: self.unit,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReadingLog {
    id: Option<String>,
    reading_ref: String,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    notes: Vec<String>,
}

impl LegacyReadingLog {
    fn into_record(self) -> EntityRecord {
        ReadingLog {
            id: self.id.unwrap_or_else(new_entity_id),
            reading_id: self.reading_ref,
            time_start: self.time_start,
            time_end: self.time_end,
            tracker_entries: self.tracker_entries,
            notes: self.notes,
        }
        .into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyNoteLog {
    id: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    title: Option<String>,
    content: String,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    related_activity_refs: Vec<String>,
}

impl LegacyNoteLog {
    fn into_record(self) -> EntityRecord {
        NoteLog {
            id: self.id.unwrap_or_else(new_entity_id),
            timestamp: self.timestamp,
            title: self.title,
            content: self.content,
            tracker_entries: self.tracker_entries,
            related_activity_ids: self.related_activity_refs,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OwnerHandle, OwnerResolver};
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySource {
        entries: Mutex<HashMap<String, serde_json::Value>>,
    }

    impl MemorySource {
        fn with(entries: Vec<(&str, serde_json::Value)>) -> Arc<Self> {
            let source = Self::default();
            let mut map = source.entries.lock().unwrap();
            for (key, value) in entries {
                map.insert(key.to_string(), value);
            }
            drop(map);
            Arc::new(source)
        }

        fn is_empty(&self) -> bool {
            self.entries.lock().unwrap().is_empty()
        }
    }

    impl LegacySource for MemorySource {
        fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn clear(&self) -> Result<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }
    }

    struct Fixture {
        adapter: MigrationAdapter,
        store: LocalStore,
        source: Arc<MemorySource>,
        owner: OwnerHandle,
    }

    async fn fixture(source: Arc<MemorySource>) -> Fixture {
        let db = Database::open_in_memory().await.unwrap().into_shared();
        let owner = OwnerHandle::signed_in("user-1".into());
        let resolver: Arc<dyn OwnerResolver> = Arc::new(owner.clone());
        let store = LocalStore::new(db, resolver);
        let adapter =
            MigrationAdapter::new(store.clone(), Arc::clone(&source) as Arc<dyn LegacySource>);
        Fixture {
            adapter,
            store,
            source,
            owner,
        }
    }

    fn legacy_activities() -> serde_json::Value {
        json!([
            {
                "id": "act-1",
                "name": "Gym",
                "category": "Health",
                "subActivity": "Weights"
            },
            {
                "id": "act-2",
                "name": "Reading",
                "category": "leisure"
            }
        ])
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_status_gates_on_empty_store() {
        let f = fixture(MemorySource::with(vec![(
            "activities",
            legacy_activities(),
        )]))
        .await;

        let status = f.adapter.check_status().await.unwrap();
        assert_eq!(
            status,
            MigrationStatus {
                needs_migration: true,
                legacy_count: 2,
                store_count: 0,
            }
        );

        // One record in the store flips the verdict, legacy data or not.
        f.store
            .insert_record(&Activity::new("Existing", ActivityCategory::Other).into())
            .await
            .unwrap();
        let status = f.adapter.check_status().await.unwrap();
        assert!(!status.needs_migration);
        assert_eq!(status.legacy_count, 2);
        assert_eq!(status.store_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_status_without_legacy_data() {
        let f = fixture(MemorySource::with(Vec::new())).await;
        let status = f.adapter.check_status().await.unwrap();
        assert!(!status.needs_migration);
        assert_eq!(status.legacy_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrate_imports_camel_case_collections() {
        let f = fixture(MemorySource::with(vec![
            ("activities", legacy_activities()),
            (
                "intakes",
                json!([{
                    "id": "int-1",
                    "name": "Coffee",
                    "type": "drink",
                    "defaultQuantity": 250.0,
                    "defaultUnit": "ml"
                }]),
            ),
            (
                "sessionLogs",
                json!([{
                    "id": "sl-1",
                    "activityRef": "act-1",
                    "timeStart": "2024-03-01T10:00:00Z",
                    "timeEnd": "2024-03-01T11:00:00Z",
                    "trackerEntries": [{"tracker": "mood", "value": 7.0}],
                    "notes": ["solid session"]
                }]),
            ),
            (
                "noteLogs",
                json!([{
                    "id": "nl-1",
                    "timestamp": "2024-03-02T09:30:00Z",
                    "content": "remember this",
                    "relatedActivityRefs": ["act-1"]
                }]),
            ),
        ]))
        .await;

        let result = f.adapter.migrate().await.unwrap();

        assert!(result.is_complete());
        assert_eq!(result.total_imported(), 5);
        assert_eq!(
            result.counts,
            vec![
                (EntityKind::Activity, 2),
                (EntityKind::Intake, 1),
                (EntityKind::ReadingObject, 0),
                (EntityKind::SessionLog, 1),
                (EntityKind::IntakeLog, 0),
                (EntityKind::ReadingLog, 0),
                (EntityKind::NoteLog, 1),
            ]
        );

        let activities = f.store.list_activities().await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].sub_activity.as_deref(), Some("Weights"));
        assert_eq!(activities[1].category, ActivityCategory::Leisure);

        let intakes = f.store.list_intakes().await.unwrap();
        assert_eq!(intakes[0].default_unit, IntakeUnit::Milliliter);

        let sessions = f.store.list_session_logs().await.unwrap();
        assert_eq!(sessions[0].activity_id, "act-1");
        assert_eq!(sessions[0].tracker_entries[0].tracker, "mood");

        let notes = f.store.list_note_logs().await.unwrap();
        assert_eq!(notes[0].related_activity_ids, vec!["act-1".to_string()]);

        // Clean run: the legacy source is gone.
        assert!(f.source.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrate_keeps_source_on_partial_failure() {
        let f = fixture(MemorySource::with(vec![
            ("activities", legacy_activities()),
            ("intakes", json!([{"name": 42}])),
        ]))
        .await;

        let result = f.adapter.migrate().await.unwrap();

        assert!(!result.is_complete());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, EntityKind::Intake);
        assert_eq!(result.total_imported(), 2);
        assert!(matches!(
            result.into_result(),
            Err(Error::MigrationPartialFailure(1))
        ));

        // The good kind landed, the bad one did not.
        assert_eq!(f.store.list_activities().await.unwrap().len(), 2);
        assert!(f.store.list_intakes().await.unwrap().is_empty());

        // The source survives so a fixed-up export can be retried.
        assert!(!f.source.is_empty());
        assert!(f.source.read("activities").unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrate_without_owner_fails_fast() {
        let f = fixture(MemorySource::with(vec![(
            "activities",
            legacy_activities(),
        )]))
        .await;
        f.owner.clear();

        let err = f.adapter.migrate().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
        assert!(!f.source.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_without_ids_get_fresh_ones() {
        let f = fixture(MemorySource::with(vec![(
            "activities",
            json!([{"name": "Old", "category": "other"}]),
        )]))
        .await;

        let result = f.adapter.migrate().await.unwrap();
        assert!(result.is_complete());

        let activities = f.store.list_activities().await.unwrap();
        assert_eq!(activities.len(), 1);
        assert!(!activities[0].id.is_empty());
    }

    #[test]
    fn test_json_file_source_reads_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "activities": [{"id": "act-1", "name": "Gym", "category": "health"}]
            }))
            .unwrap(),
        )
        .unwrap();

        let source = JsonFileLegacySource::new(&path);
        let value = source.read("activities").unwrap().unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert!(source.read("intakes").unwrap().is_none());

        source.clear().unwrap();
        assert!(!path.exists());
        assert!(source.read("activities").unwrap().is_none());
        // Clearing an already-missing file stays quiet.
        source.clear().unwrap();
    }
}
