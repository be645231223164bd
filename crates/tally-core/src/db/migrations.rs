//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: entity tables plus the outbox
///
/// Log tables do not declare foreign keys on purpose: a pull pass may apply
/// a log before (or without) its catalog parent, and those rows must land.
/// Referential cleanup happens in the store's cascade delete instead.
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside one transaction.

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Catalog tables
        "CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_activity TEXT,
            sub_sub_activity TEXT,
            info TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_activities_owner ON activities(owner_id)",
        "CREATE TABLE IF NOT EXISTS intakes (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            default_quantity REAL NOT NULL,
            default_unit TEXT NOT NULL,
            info TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_intakes_owner ON intakes(owner_id)",
        "CREATE TABLE IF NOT EXISTS reading_objects (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            book_name TEXT NOT NULL,
            author TEXT NOT NULL,
            year INTEGER,
            info TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_reading_objects_owner ON reading_objects(owner_id)",
        // Log tables; JSON-valued columns hold tracker entries and notes
        "CREATE TABLE IF NOT EXISTS session_logs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            activity_id TEXT NOT NULL,
            time_start TEXT NOT NULL,
            time_end TEXT NOT NULL,
            tracker_entries TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '[]'
        )",
        "CREATE INDEX IF NOT EXISTS idx_session_logs_owner ON session_logs(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_session_logs_activity ON session_logs(activity_id)",
        "CREATE TABLE IF NOT EXISTS intake_logs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            intake_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_intake_logs_owner ON intake_logs(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_intake_logs_intake ON intake_logs(intake_id)",
        "CREATE TABLE IF NOT EXISTS reading_logs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            reading_id TEXT NOT NULL,
            time_start TEXT NOT NULL,
            time_end TEXT NOT NULL,
            tracker_entries TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '[]'
        )",
        "CREATE INDEX IF NOT EXISTS idx_reading_logs_owner ON reading_logs(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_reading_logs_reading ON reading_logs(reading_id)",
        "CREATE TABLE IF NOT EXISTS note_logs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            title TEXT,
            content TEXT NOT NULL,
            tracker_entries TEXT NOT NULL DEFAULT '[]',
            related_activity_ids TEXT NOT NULL DEFAULT '[]'
        )",
        "CREATE INDEX IF NOT EXISTS idx_note_logs_owner ON note_logs(owner_id)",
        // Outbox of mutations awaiting remote confirmation
        "CREATE TABLE IF NOT EXISTS sync_outbox (
            id TEXT PRIMARY KEY,
            op_kind TEXT NOT NULL,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3
        )",
        "CREATE INDEX IF NOT EXISTS idx_outbox_enqueued ON sync_outbox(enqueued_at)",
        "CREATE INDEX IF NOT EXISTS idx_outbox_entity ON sync_outbox(entity_id)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn raw_connection() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_from_scratch() {
        let conn = raw_connection().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_are_idempotent() {
        let conn = raw_connection().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_all_tables_exist() {
        let conn = raw_connection().await;
        run(&conn).await.unwrap();

        for table in [
            "activities",
            "intakes",
            "reading_objects",
            "session_logs",
            "intake_logs",
            "reading_logs",
            "note_logs",
            "sync_outbox",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            assert_eq!(row.get::<i64>(0).unwrap(), 1, "missing table {table}");
        }
    }
}
