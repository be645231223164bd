//! Database layer for Tally

mod connection;
mod migrations;
mod outbox;
mod store;

pub use connection::{Database, SharedDatabase};
pub use outbox::{OperationKind, OutboxQueue, SyncOperation, DEFAULT_MAX_RETRIES};
pub use store::LocalStore;
