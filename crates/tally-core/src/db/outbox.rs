//! Durable outbox of local mutations awaiting remote confirmation.
//!
//! Every local write appends exactly one operation here. Operations are
//! replayed oldest-first by the sync engine and removed only on confirmed
//! remote success, or after exhausting their retry budget.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::SharedDatabase;
use crate::error::{Error, Result};
use crate::models::{new_entity_id, EntityKind};
use crate::util::parse_rfc3339;

/// Retry budget applied to every enqueued operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What a queued operation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown operation kind: {other}"
            ))),
        }
    }
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: String,
    pub kind: OperationKind,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl SyncOperation {
    /// Whether the retry budget is used up.
    pub const fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// FIFO queue persisted in the `sync_outbox` table.
#[derive(Clone)]
pub struct OutboxQueue {
    db: SharedDatabase,
    max_retries: u32,
}

impl OutboxQueue {
    pub fn new(db: SharedDatabase) -> Self {
        Self {
            db,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry budget for operations enqueued from now on.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Append an operation to the tail of the queue.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        entity_kind: EntityKind,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<SyncOperation> {
        let op = SyncOperation {
            id: new_entity_id(),
            kind,
            entity_kind,
            entity_id: entity_id.to_string(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: self.max_retries,
        };

        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO sync_outbox
                 (id, op_kind, entity_kind, entity_id, payload, enqueued_at, retry_count, max_retries)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    op.id.as_str(),
                    op.kind.as_str(),
                    op.entity_kind.as_str(),
                    op.entity_id.as_str(),
                    serde_json::to_string(&op.payload)?,
                    op.enqueued_at.to_rfc3339(),
                    i64::from(op.retry_count),
                    i64::from(op.max_retries)
                ],
            )
            .await?;

        tracing::debug!(
            op = %op.id,
            kind = %op.kind,
            entity = %op.entity_kind,
            "enqueued outbox operation"
        );
        Ok(op)
    }

    /// All pending operations, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT id, op_kind, entity_kind, entity_id, payload, enqueued_at, retry_count, max_retries
                 FROM sync_outbox ORDER BY enqueued_at, id",
                (),
            )
            .await?;

        let mut ops = Vec::new();
        while let Some(row) = rows.next().await? {
            ops.push(row_to_operation(&row)?);
        }
        Ok(ops)
    }

    /// Number of pending operations.
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM sync_outbox", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(usize::try_from(row.get::<i64>(0)?).unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Entity ids with a pending delete operation.
    ///
    /// The pull pass consults this set so a remote copy cannot resurrect a
    /// record the user already deleted locally.
    pub async fn pending_delete_ids(&self) -> Result<HashSet<String>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT entity_id FROM sync_outbox WHERE op_kind = ?",
                [OperationKind::Delete.as_str()],
            )
            .await?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// Remove an operation whose remote effect has been confirmed (or that
    /// is being dropped after retry exhaustion).
    pub async fn mark_resolved(&self, op_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let affected = db
            .connection()
            .execute("DELETE FROM sync_outbox WHERE id = ?", [op_id])
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(op_id.to_string()));
        }
        Ok(())
    }

    /// Record one more failed replay attempt; returns the new count.
    pub async fn increment_retry(&self, op_id: &str) -> Result<u32> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let affected = conn
            .execute(
                "UPDATE sync_outbox SET retry_count = retry_count + 1 WHERE id = ?",
                [op_id],
            )
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(op_id.to_string()));
        }

        let mut rows = conn
            .query("SELECT retry_count FROM sync_outbox WHERE id = ?", [op_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(u32::try_from(row.get::<i64>(0)?).unwrap_or(0)),
            None => Err(Error::NotFound(op_id.to_string())),
        }
    }
}

fn row_to_operation(row: &libsql::Row) -> Result<SyncOperation> {
    Ok(SyncOperation {
        id: row.get(0)?,
        kind: row.get::<String>(1)?.parse()?,
        entity_kind: row.get::<String>(2)?.parse()?,
        entity_id: row.get(3)?,
        payload: serde_json::from_str(&row.get::<String>(4)?)?,
        enqueued_at: parse_rfc3339(&row.get::<String>(5)?)?,
        retry_count: u32::try_from(row.get::<i64>(6)?).unwrap_or(0),
        max_retries: u32::try_from(row.get::<i64>(7)?).unwrap_or(DEFAULT_MAX_RETRIES),
    })
}
