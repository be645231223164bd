//! Wire-row types for the remote relational store.
//!
//! Remote tables scope every row with a `user_id` column and use their own
//! column names where they differ from the local model (`logged_at` instead
//! of `timestamp`). These structs are the only place that mapping lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::OwnerId;
use crate::error::Result;
use crate::models::{
    Activity, ActivityCategory, EntityKind, EntityRecord, Intake, IntakeKind, IntakeLog,
    IntakeUnit, NoteLog, ReadingLog, ReadingObject, SessionLog, TrackerEntry,
};

/// Serialize a record into the remote row shape for `owner`.
pub(crate) fn record_to_row(owner: &OwnerId, record: &EntityRecord) -> Result<serde_json::Value> {
    let value = match record {
        EntityRecord::Activity(a) => serde_json::to_value(ActivityRow::from_model(owner, a))?,
        EntityRecord::Intake(i) => serde_json::to_value(IntakeRow::from_model(owner, i))?,
        EntityRecord::ReadingObject(r) => {
            serde_json::to_value(ReadingObjectRow::from_model(owner, r))?
        }
        EntityRecord::SessionLog(s) => serde_json::to_value(SessionLogRow::from_model(owner, s))?,
        EntityRecord::IntakeLog(i) => serde_json::to_value(IntakeLogRow::from_model(owner, i))?,
        EntityRecord::ReadingLog(r) => serde_json::to_value(ReadingLogRow::from_model(owner, r))?,
        EntityRecord::NoteLog(n) => serde_json::to_value(NoteLogRow::from_model(owner, n))?,
    };
    Ok(value)
}

/// Deserialize a remote row back into a typed record.
pub(crate) fn row_to_record(kind: EntityKind, row: serde_json::Value) -> Result<EntityRecord> {
    let record = match kind {
        EntityKind::Activity => serde_json::from_value::<ActivityRow>(row)?.into_model().into(),
        EntityKind::Intake => serde_json::from_value::<IntakeRow>(row)?.into_model().into(),
        EntityKind::ReadingObject => serde_json::from_value::<ReadingObjectRow>(row)?
            .into_model()
            .into(),
        EntityKind::SessionLog => serde_json::from_value::<SessionLogRow>(row)?
            .into_model()
            .into(),
        EntityKind::IntakeLog => serde_json::from_value::<IntakeLogRow>(row)?
            .into_model()
            .into(),
        EntityKind::ReadingLog => serde_json::from_value::<ReadingLogRow>(row)?
            .into_model()
            .into(),
        EntityKind::NoteLog => serde_json::from_value::<NoteLogRow>(row)?.into_model().into(),
    };
    Ok(record)
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivityRow {
    id: String,
    user_id: String,
    name: String,
    category: ActivityCategory,
    #[serde(default)]
    sub_activity: Option<String>,
    #[serde(default)]
    sub_sub_activity: Option<String>,
    #[serde(default)]
    info: Option<String>,
}

impl ActivityRow {
    fn from_model(owner: &OwnerId, a: &Activity) -> Self {
        Self {
            id: a.id.clone(),
            user_id: owner.as_str().to_string(),
            name: a.name.clone(),
            category: a.category,
            sub_activity: a.sub_activity.clone(),
            sub_sub_activity: a.sub_sub_activity.clone(),
            info: a.info.clone(),
        }
    }

    fn into_model(self) -> Activity {
        Activity {
            id: self.id,
            name: self.name,
            category: self.category,
            sub_activity: self.sub_activity,
            sub_sub_activity: self.sub_sub_activity,
            info: self.info,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IntakeRow {
    id: String,
    user_id: String,
    name: String,
    kind: IntakeKind,
    default_quantity: f64,
    default_unit: IntakeUnit,
    #[serde(default)]
    info: Option<String>,
}

impl IntakeRow {
    fn from_model(owner: &OwnerId, i: &Intake) -> Self {
        Self {
            id: i.id.clone(),
            user_id: owner.as_str().to_string(),
            name: i.name.clone(),
            kind: i.kind,
            default_quantity: i.default_quantity,
            default_unit: i.default_unit,
            info: i.info.clone(),
        }
    }

    fn into_model(self) -> Intake {
        Intake {
            id: self.id,
            name: self.name,
            kind: self.kind,
            default_quantity: self.default_quantity,
            default_unit: self.default_unit,
            info: self.info,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReadingObjectRow {
    id: String,
    user_id: String,
    book_name: String,
    author: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    info: Option<String>,
}

impl ReadingObjectRow {
    fn from_model(owner: &OwnerId, r: &ReadingObject) -> Self {
        Self {
            id: r.id.clone(),
            user_id: owner.as_str().to_string(),
            book_name: r.book_name.clone(),
            author: r.author.clone(),
            year: r.year,
            info: r.info.clone(),
        }
    }

    fn into_model(self) -> ReadingObject {
        ReadingObject {
            id: self.id,
            book_name: self.book_name,
            author: self.author,
            year: self.year,
            info: self.info,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionLogRow {
    id: String,
    user_id: String,
    activity_id: String,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    notes: Vec<String>,
}

impl SessionLogRow {
    fn from_model(owner: &OwnerId, s: &SessionLog) -> Self {
        Self {
            id: s.id.clone(),
            user_id: owner.as_str().to_string(),
            activity_id: s.activity_id.clone(),
            time_start: s.time_start,
            time_end: s.time_end,
            tracker_entries: s.tracker_entries.clone(),
            notes: s.notes.clone(),
        }
    }

    fn into_model(self) -> SessionLog {
        SessionLog {
            id: self.id,
            activity_id: self.activity_id,
            time_start: self.time_start,
            time_end: self.time_end,
            tracker_entries: self.tracker_entries,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IntakeLogRow {
    id: String,
    user_id: String,
    intake_id: String,
    logged_at: DateTime<Utc>,
    quantity: f64,
    unit: IntakeUnit,
}

impl IntakeLogRow {
    fn from_model(owner: &OwnerId, i: &IntakeLog) -> Self {
        Self {
            id: i.id.clone(),
            user_id: owner.as_str().to_string(),
            intake_id: i.intake_id.clone(),
            logged_at: i.timestamp,
            quantity: i.quantity,
            unit: i.unit,
        }
    }

    fn into_model(self) -> IntakeLog {
        IntakeLog {
            id: self.id,
            intake_id: self.intake_id,
            timestamp: self.logged_at,
            quantity: self.quantity,
            unit: self.unit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReadingLogRow {
    id: String,
    user_id: String,
    reading_id: String,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    notes: Vec<String>,
}

impl ReadingLogRow {
    fn from_model(owner: &OwnerId, r: &ReadingLog) -> Self {
        Self {
            id: r.id.clone(),
            user_id: owner.as_str().to_string(),
            reading_id: r.reading_id.clone(),
            time_start: r.time_start,
            time_end: r.time_end,
            tracker_entries: r.tracker_entries.clone(),
            notes: r.notes.clone(),
        }
    }

    fn into_model(self) -> ReadingLog {
        ReadingLog {
            id: self.id,
            reading_id: self.reading_id,
            time_start: self.time_start,
            time_end: self.time_end,
            tracker_entries: self.tracker_entries,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NoteLogRow {
    id: String,
    user_id: String,
    logged_at: DateTime<Utc>,
    #[serde(default)]
    title: Option<String>,
    content: String,
    #[serde(default)]
    tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    related_activity_ids: Vec<String>,
}

impl NoteLogRow {
    fn from_model(owner: &OwnerId, n: &NoteLog) -> Self {
        Self {
            id: n.id.clone(),
            user_id: owner.as_str().to_string(),
            logged_at: n.timestamp,
            title: n.title.clone(),
            content: n.content.clone(),
            tracker_entries: n.tracker_entries.clone(),
            related_activity_ids: n.related_activity_ids.clone(),
        }
    }

    fn into_model(self) -> NoteLog {
        NoteLog {
            id: self.id,
            timestamp: self.logged_at,
            title: self.title,
            content: self.content,
            tracker_entries: self.tracker_entries,
            related_activity_ids: self.related_activity_ids,
        }
    }
}
