//! Entity kinds and the typed record sum that crosses the sync boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Activity, Intake, IntakeLog, NoteLog, ReadingLog, ReadingObject, SessionLog};

/// Generate a fresh, time-sortable entity id.
pub fn new_entity_id() -> String {
    Uuid::now_v7().to_string()
}

/// One of the seven synchronized record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Activity,
    Intake,
    ReadingObject,
    SessionLog,
    IntakeLog,
    ReadingLog,
    NoteLog,
}

impl EntityKind {
    /// Fixed order every sync pass walks: catalogs before the logs that
    /// reference them.
    pub const ALL: [Self; 7] = [
        Self::Activity,
        Self::Intake,
        Self::ReadingObject,
        Self::SessionLog,
        Self::IntakeLog,
        Self::ReadingLog,
        Self::NoteLog,
    ];

    /// Local table holding this kind.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Activity => "activities",
            Self::Intake => "intakes",
            Self::ReadingObject => "reading_objects",
            Self::SessionLog => "session_logs",
            Self::IntakeLog => "intake_logs",
            Self::ReadingLog => "reading_logs",
            Self::NoteLog => "note_logs",
        }
    }

    /// Relation name on the remote store. Matches the local table names.
    pub const fn remote_table(self) -> &'static str {
        self.table_name()
    }

    /// Key of this collection in the legacy flat-storage dump.
    pub const fn legacy_key(self) -> &'static str {
        match self {
            Self::Activity => "activities",
            Self::Intake => "intakes",
            Self::ReadingObject => "readingObjects",
            Self::SessionLog => "sessionLogs",
            Self::IntakeLog => "intakeLogs",
            Self::ReadingLog => "readingLogs",
            Self::NoteLog => "noteLogs",
        }
    }

    /// Log tables whose rows are removed when a record of this kind is
    /// deleted, with the referencing column.
    pub const fn dependents(self) -> &'static [(Self, &'static str)] {
        match self {
            Self::Activity => &[(Self::SessionLog, "activity_id")],
            Self::Intake => &[(Self::IntakeLog, "intake_id")],
            Self::ReadingObject => &[(Self::ReadingLog, "reading_id")],
            _ => &[],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Intake => "intake",
            Self::ReadingObject => "reading_object",
            Self::SessionLog => "session_log",
            Self::IntakeLog => "intake_log",
            Self::ReadingLog => "reading_log",
            Self::NoteLog => "note_log",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "activity" => Ok(Self::Activity),
            "intake" => Ok(Self::Intake),
            "reading_object" => Ok(Self::ReadingObject),
            "session_log" => Ok(Self::SessionLog),
            "intake_log" => Ok(Self::IntakeLog),
            "reading_log" => Ok(Self::ReadingLog),
            "note_log" => Ok(Self::NoteLog),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

/// A record of any kind. This is what moves between the local store, the
/// outbox, and the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Activity(Activity),
    Intake(Intake),
    ReadingObject(ReadingObject),
    SessionLog(SessionLog),
    IntakeLog(IntakeLog),
    ReadingLog(ReadingLog),
    NoteLog(NoteLog),
}

impl EntityRecord {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Activity(_) => EntityKind::Activity,
            Self::Intake(_) => EntityKind::Intake,
            Self::ReadingObject(_) => EntityKind::ReadingObject,
            Self::SessionLog(_) => EntityKind::SessionLog,
            Self::IntakeLog(_) => EntityKind::IntakeLog,
            Self::ReadingLog(_) => EntityKind::ReadingLog,
            Self::NoteLog(_) => EntityKind::NoteLog,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::Activity(a) => &a.id,
            Self::Intake(i) => &i.id,
            Self::ReadingObject(r) => &r.id,
            Self::SessionLog(s) => &s.id,
            Self::IntakeLog(i) => &i.id,
            Self::ReadingLog(r) => &r.id,
            Self::NoteLog(n) => &n.id,
        }
    }

    /// Serialize to the bare entity JSON used as an outbox payload.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Activity(a) => serde_json::to_value(a)?,
            Self::Intake(i) => serde_json::to_value(i)?,
            Self::ReadingObject(r) => serde_json::to_value(r)?,
            Self::SessionLog(s) => serde_json::to_value(s)?,
            Self::IntakeLog(i) => serde_json::to_value(i)?,
            Self::ReadingLog(r) => serde_json::to_value(r)?,
            Self::NoteLog(n) => serde_json::to_value(n)?,
        };
        Ok(value)
    }

    /// Decode an outbox payload back into a typed record.
    pub fn from_payload(kind: EntityKind, payload: serde_json::Value) -> Result<Self> {
        let record = match kind {
            EntityKind::Activity => Self::Activity(serde_json::from_value(payload)?),
            EntityKind::Intake => Self::Intake(serde_json::from_value(payload)?),
            EntityKind::ReadingObject => Self::ReadingObject(serde_json::from_value(payload)?),
            EntityKind::SessionLog => Self::SessionLog(serde_json::from_value(payload)?),
            EntityKind::IntakeLog => Self::IntakeLog(serde_json::from_value(payload)?),
            EntityKind::ReadingLog => Self::ReadingLog(serde_json::from_value(payload)?),
            EntityKind::NoteLog => Self::NoteLog(serde_json::from_value(payload)?),
        };
        Ok(record)
    }
}

impl From<Activity> for EntityRecord {
    fn from(value: Activity) -> Self {
        Self::Activity(value)
    }
}

impl From<Intake> for EntityRecord {
    fn from(value: Intake) -> Self {
        Self::Intake(value)
    }
}

impl From<ReadingObject> for EntityRecord {
    fn from(value: ReadingObject) -> Self {
        Self::ReadingObject(value)
    }
}

impl From<SessionLog> for EntityRecord {
    fn from(value: SessionLog) -> Self {
        Self::SessionLog(value)
    }
}

impl From<IntakeLog> for EntityRecord {
    fn from(value: IntakeLog) -> Self {
        Self::IntakeLog(value)
    }
}

impl From<ReadingLog> for EntityRecord {
    fn from(value: ReadingLog) -> Self {
        Self::ReadingLog(value)
    }
}

impl From<NoteLog> for EntityRecord {
    fn from(value: NoteLog) -> Self {
        Self::NoteLog(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityCategory;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_kinds_lists_catalogs_before_logs() {
        assert_eq!(EntityKind::ALL.len(), 7);
        assert_eq!(EntityKind::ALL[0], EntityKind::Activity);
        assert_eq!(EntityKind::ALL[2], EntityKind::ReadingObject);
        assert_eq!(EntityKind::ALL[6], EntityKind::NoteLog);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn legacy_keys_use_camel_case() {
        assert_eq!(EntityKind::ReadingObject.legacy_key(), "readingObjects");
        assert_eq!(EntityKind::SessionLog.legacy_key(), "sessionLogs");
        assert_eq!(EntityKind::Activity.legacy_key(), "activities");
    }

    #[test]
    fn catalogs_know_their_dependents() {
        assert_eq!(
            EntityKind::Activity.dependents(),
            &[(EntityKind::SessionLog, "activity_id")]
        );
        assert!(EntityKind::NoteLog.dependents().is_empty());
    }

    #[test]
    fn record_payload_round_trips() {
        let activity = Activity::new("Gym", ActivityCategory::Health);
        let record = EntityRecord::from(activity.clone());
        assert_eq!(record.kind(), EntityKind::Activity);
        assert_eq!(record.entity_id(), activity.id);

        let payload = record.to_payload().unwrap();
        let back = EntityRecord::from_payload(EntityKind::Activity, payload).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn from_payload_rejects_mismatched_kind() {
        let activity = Activity::new("Gym", ActivityCategory::Health);
        let payload = EntityRecord::from(activity).to_payload().unwrap();
        // An activity payload has no `content`, so it cannot be a note log.
        assert!(EntityRecord::from_payload(EntityKind::NoteLog, payload).is_err());
    }

    #[test]
    fn new_entity_ids_are_sortable_and_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert!(a <= b);
    }
}
