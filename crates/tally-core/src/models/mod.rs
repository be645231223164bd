//! Data models for Tally

mod activity;
mod intake;
mod logs;
mod reading;
mod record;

pub use activity::{Activity, ActivityCategory};
pub use intake::{Intake, IntakeKind, IntakeUnit};
pub use logs::{IntakeLog, NoteLog, ReadingLog, SessionLog, TrackerEntry};
pub use reading::ReadingObject;
pub use record::{new_entity_id, EntityKind, EntityRecord};
