//! Log models: records of what actually happened.
//!
//! Logs reference their catalog entry by id; the store cascades catalog
//! deletes to the logs that point at them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::intake::IntakeUnit;
use crate::models::record::new_entity_id;

/// One tracker measurement attached to a log, e.g. mood 7.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub tracker: String,
    pub value: f64,
}

impl TrackerEntry {
    pub fn new(tracker: impl Into<String>, value: f64) -> Self {
        Self {
            tracker: tracker.into(),
            value,
        }
    }
}

/// A timed session of some activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: String,
    pub activity_id: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(default)]
    pub tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl SessionLog {
    pub fn new(
        activity_id: impl Into<String>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            activity_id: activity_id.into(),
            time_start,
            time_end,
            tracker_entries: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_tracker_entry(mut self, entry: TrackerEntry) -> Self {
        self.tracker_entries.push(entry);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// A consumption event, timestamped at the moment of logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeLog {
    pub id: String,
    pub intake_id: String,
    pub timestamp: DateTime<Utc>,
    pub quantity: f64,
    pub unit: IntakeUnit,
}

impl IntakeLog {
    /// Log a consumption happening now.
    pub fn new(intake_id: impl Into<String>, quantity: f64, unit: IntakeUnit) -> Self {
        Self {
            id: new_entity_id(),
            intake_id: intake_id.into(),
            timestamp: Utc::now(),
            quantity,
            unit,
        }
    }

    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A reading session for some catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingLog {
    pub id: String,
    pub reading_id: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(default)]
    pub tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ReadingLog {
    pub fn new(
        reading_id: impl Into<String>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            reading_id: reading_id.into(),
            time_start,
            time_end,
            tracker_entries: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_tracker_entry(mut self, entry: TrackerEntry) -> Self {
        self.tracker_entries.push(entry);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// A free-standing note, optionally linked to activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tracker_entries: Vec<TrackerEntry>,
    #[serde(default)]
    pub related_activity_ids: Vec<String>,
}

impl NoteLog {
    /// Capture a note timestamped now.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            timestamp: Utc::now(),
            title: None,
            content: content.into(),
            tracker_entries: Vec::new(),
            related_activity_ids: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_related_activity(mut self, activity_id: impl Into<String>) -> Self {
        self.related_activity_ids.push(activity_id.into());
        self
    }
}
