//! Remote store contract and the REST implementation.

mod rest;
mod rows;

pub use rest::{normalize_rest_url, RestConfig, RestRemoteStore};

use async_trait::async_trait;

use crate::auth::OwnerId;
use crate::error::Result;
use crate::models::{EntityKind, EntityRecord};

/// Per-kind operations on the cloud copy of the user's data.
///
/// The remote keys rows by entity id within an owner, so `upsert` is
/// last-writer-wins. Implementations map transport and API failures to
/// [`crate::Error::Remote`]; a failure for one record says nothing about
/// the next one.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace one record for this owner.
    async fn upsert(&self, owner: &OwnerId, record: &EntityRecord) -> Result<()>;

    /// Every remote record of one kind for this owner.
    async fn select_all(&self, owner: &OwnerId, kind: EntityKind) -> Result<Vec<EntityRecord>>;

    /// Delete one record by id. Deleting an absent id is not an error.
    async fn delete(&self, owner: &OwnerId, kind: EntityKind, entity_id: &str) -> Result<()>;

    /// Number of remote records of one kind for this owner.
    async fn count(&self, owner: &OwnerId, kind: EntityKind) -> Result<u64>;
}
