//! tally-core - Core library for Tally
//!
//! This crate contains the shared models, the owner-scoped local store, the
//! outbox, and the sync engine used by all Tally interfaces. Writes always
//! land locally first; the sync layer reconciles with the remote store when
//! a connection is available.

pub mod auth;
pub mod db;
pub mod error;
pub mod migration;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{EntityKind, EntityRecord};
