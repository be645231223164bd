//! Offline-first synchronization: the engine, its background trigger, and
//! the status channel hosts observe.

mod engine;
mod scheduler;
mod status;

pub use engine::{
    DrainReport, EngineState, ManualSyncReport, PullReport, PushReport, SyncEngine,
};
pub use scheduler::{BackgroundSync, DEFAULT_SYNC_INTERVAL};
pub use status::{StatusPublisher, Subscription, SyncStatus};
