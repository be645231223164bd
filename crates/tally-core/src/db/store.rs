//! Owner-scoped entity storage.
//!
//! All reads and writes land here first; nothing in this module touches the
//! network. Every operation is scoped to the owner resolved at call time, so
//! a signed-out caller reads empty collections and cannot write.

use std::sync::Arc;

use libsql::Connection;

use crate::auth::{OwnerId, OwnerResolver};
use crate::db::SharedDatabase;
use crate::error::{Error, Result};
use crate::models::{
    Activity, EntityKind, EntityRecord, Intake, IntakeLog, NoteLog, ReadingLog, ReadingObject,
    SessionLog,
};
use crate::util::parse_rfc3339;

/// Owner-scoped CRUD over the seven entity collections.
#[derive(Clone)]
pub struct LocalStore {
    db: SharedDatabase,
    owner: Arc<dyn OwnerResolver>,
}

impl LocalStore {
    pub fn new(db: SharedDatabase, owner: Arc<dyn OwnerResolver>) -> Self {
        Self { db, owner }
    }

    /// The owner all operations are currently scoped to, if signed in.
    pub fn current_owner(&self) -> Option<OwnerId> {
        self.owner.current_owner()
    }

    fn require_owner(&self) -> Result<OwnerId> {
        self.owner.current_owner().ok_or(Error::NotAuthenticated)
    }

    /// Insert a record, replacing any existing row with the same id.
    pub async fn insert_record(&self, record: &EntityRecord) -> Result<()> {
        let owner = self.require_owner()?;
        let db = self.db.lock().await;
        let conn = db.connection();
        match record {
            EntityRecord::Activity(a) => insert_activity(conn, &owner, a).await,
            EntityRecord::Intake(i) => insert_intake(conn, &owner, i).await,
            EntityRecord::ReadingObject(r) => insert_reading_object(conn, &owner, r).await,
            EntityRecord::SessionLog(s) => insert_session_log(conn, &owner, s).await,
            EntityRecord::IntakeLog(i) => insert_intake_log(conn, &owner, i).await,
            EntityRecord::ReadingLog(r) => insert_reading_log(conn, &owner, r).await,
            EntityRecord::NoteLog(n) => insert_note_log(conn, &owner, n).await,
        }
    }

    /// Update an existing record in place.
    ///
    /// Returns [`Error::NotFound`] when no row with that id belongs to the
    /// current owner.
    pub async fn update_record(&self, record: &EntityRecord) -> Result<()> {
        let owner = self.require_owner()?;
        let db = self.db.lock().await;
        let conn = db.connection();
        let affected = match record {
            EntityRecord::Activity(a) => update_activity(conn, &owner, a).await?,
            EntityRecord::Intake(i) => update_intake(conn, &owner, i).await?,
            EntityRecord::ReadingObject(r) => update_reading_object(conn, &owner, r).await?,
            EntityRecord::SessionLog(s) => update_session_log(conn, &owner, s).await?,
            EntityRecord::IntakeLog(i) => update_intake_log(conn, &owner, i).await?,
            EntityRecord::ReadingLog(r) => update_reading_log(conn, &owner, r).await?,
            EntityRecord::NoteLog(n) => update_note_log(conn, &owner, n).await?,
        };
        if affected == 0 {
            return Err(Error::NotFound(record.entity_id().to_string()));
        }
        Ok(())
    }

    /// Delete a record and, for catalog kinds, every log that references it.
    ///
    /// The parent delete and all dependent deletes happen in one transaction:
    /// either everything goes or nothing does.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let owner = self.require_owner()?;
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;

        for (dependent, fk_column) in kind.dependents() {
            let sql = format!(
                "DELETE FROM {} WHERE {fk_column} = ? AND owner_id = ?",
                dependent.table_name()
            );
            if let Err(e) = conn
                .execute(&sql, libsql::params![id, owner.as_str()])
                .await
            {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }

        let sql = format!(
            "DELETE FROM {} WHERE id = ? AND owner_id = ?",
            kind.table_name()
        );
        let affected = match conn
            .execute(&sql, libsql::params![id, owner.as_str()])
            .await
        {
            Ok(n) => n,
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        };

        if affected == 0 {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(Error::NotFound(id.to_string()));
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// All records of one kind for the current owner, in insertion order.
    pub async fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let records = match kind {
            EntityKind::Activity => wrap(self.list_activities().await?),
            EntityKind::Intake => wrap(self.list_intakes().await?),
            EntityKind::ReadingObject => wrap(self.list_reading_objects().await?),
            EntityKind::SessionLog => wrap(self.list_session_logs().await?),
            EntityKind::IntakeLog => wrap(self.list_intake_logs().await?),
            EntityKind::ReadingLog => wrap(self.list_reading_logs().await?),
            EntityKind::NoteLog => wrap(self.list_note_logs().await?),
        };
        Ok(records)
    }

    pub async fn list_activities(&self) -> Result<Vec<Activity>> {
        self.query_owned(
            "SELECT id, name, category, sub_activity, sub_sub_activity, info
             FROM activities WHERE owner_id = ? ORDER BY rowid",
            row_to_activity,
        )
        .await
    }

    pub async fn list_intakes(&self) -> Result<Vec<Intake>> {
        self.query_owned(
            "SELECT id, name, kind, default_quantity, default_unit, info
             FROM intakes WHERE owner_id = ? ORDER BY rowid",
            row_to_intake,
        )
        .await
    }

    pub async fn list_reading_objects(&self) -> Result<Vec<ReadingObject>> {
        self.query_owned(
            "SELECT id, book_name, author, year, info
             FROM reading_objects WHERE owner_id = ? ORDER BY rowid",
            row_to_reading_object,
        )
        .await
    }

    pub async fn list_session_logs(&self) -> Result<Vec<SessionLog>> {
        self.query_owned(
            "SELECT id, activity_id, time_start, time_end, tracker_entries, notes
             FROM session_logs WHERE owner_id = ? ORDER BY rowid",
            row_to_session_log,
        )
        .await
    }

    pub async fn list_intake_logs(&self) -> Result<Vec<IntakeLog>> {
        self.query_owned(
            "SELECT id, intake_id, timestamp, quantity, unit
             FROM intake_logs WHERE owner_id = ? ORDER BY rowid",
            row_to_intake_log,
        )
        .await
    }

    pub async fn list_reading_logs(&self) -> Result<Vec<ReadingLog>> {
        self.query_owned(
            "SELECT id, reading_id, time_start, time_end, tracker_entries, notes
             FROM reading_logs WHERE owner_id = ? ORDER BY rowid",
            row_to_reading_log,
        )
        .await
    }

    pub async fn list_note_logs(&self) -> Result<Vec<NoteLog>> {
        self.query_owned(
            "SELECT id, timestamp, title, content, tracker_entries, related_activity_ids
             FROM note_logs WHERE owner_id = ? ORDER BY rowid",
            row_to_note_log,
        )
        .await
    }

    /// Number of records of one kind for the current owner.
    pub async fn count(&self, kind: EntityKind) -> Result<u64> {
        let Some(owner) = self.current_owner() else {
            return Ok(0);
        };
        let db = self.db.lock().await;
        count_rows(db.connection(), kind, &owner).await
    }

    /// Total records across all seven collections for the current owner.
    pub async fn size(&self) -> Result<u64> {
        let Some(owner) = self.current_owner() else {
            return Ok(0);
        };
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut total = 0u64;
        for kind in EntityKind::ALL {
            total += count_rows(conn, kind, &owner).await?;
        }
        Ok(total)
    }

    /// Remove every entity row for the current owner, atomically.
    ///
    /// The outbox is untouched: pending operations must survive a wipe so
    /// un-pushed work is not lost.
    pub async fn clear_all(&self) -> Result<()> {
        let owner = self.require_owner()?;
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        for kind in EntityKind::ALL {
            let sql = format!("DELETE FROM {} WHERE owner_id = ?", kind.table_name());
            if let Err(e) = conn.execute(&sql, [owner.as_str()]).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }
        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn query_owned<T>(
        &self,
        sql: &str,
        parse: fn(&libsql::Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let Some(owner) = self.current_owner() else {
            return Ok(Vec::new());
        };
        let db = self.db.lock().await;
        let mut rows = db.connection().query(sql, [owner.as_str()]).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(parse(&row)?);
        }
        Ok(items)
    }
}

fn wrap<T: Into<EntityRecord>>(items: Vec<T>) -> Vec<EntityRecord> {
    items.into_iter().map(Into::into).collect()
}

async fn count_rows(conn: &Connection, kind: EntityKind, owner: &OwnerId) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE owner_id = ?",
        kind.table_name()
    );
    let mut rows = conn.query(&sql, [owner.as_str()]).await?;
    match rows.next().await? {
        Some(row) => Ok(u64::try_from(row.get::<i64>(0)?).unwrap_or(0)),
        None => Ok(0),
    }
}

// --- per-kind encode ---

async fn insert_activity(conn: &Connection, owner: &OwnerId, a: &Activity) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO activities
         (id, owner_id, name, category, sub_activity, sub_sub_activity, info)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        libsql::params![
            a.id.as_str(),
            owner.as_str(),
            a.name.as_str(),
            a.category.as_str(),
            a.sub_activity.clone(),
            a.sub_sub_activity.clone(),
            a.info.clone()
        ],
    )
    .await?;
    Ok(())
}

async fn update_activity(conn: &Connection, owner: &OwnerId, a: &Activity) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE activities
             SET name = ?, category = ?, sub_activity = ?, sub_sub_activity = ?, info = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                a.name.as_str(),
                a.category.as_str(),
                a.sub_activity.clone(),
                a.sub_sub_activity.clone(),
                a.info.clone(),
                a.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_intake(conn: &Connection, owner: &OwnerId, i: &Intake) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO intakes
         (id, owner_id, name, kind, default_quantity, default_unit, info)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        libsql::params![
            i.id.as_str(),
            owner.as_str(),
            i.name.as_str(),
            i.kind.as_str(),
            i.default_quantity,
            i.default_unit.as_str(),
            i.info.clone()
        ],
    )
    .await?;
    Ok(())
}

async fn update_intake(conn: &Connection, owner: &OwnerId, i: &Intake) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE intakes
             SET name = ?, kind = ?, default_quantity = ?, default_unit = ?, info = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                i.name.as_str(),
                i.kind.as_str(),
                i.default_quantity,
                i.default_unit.as_str(),
                i.info.clone(),
                i.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_reading_object(conn: &Connection, owner: &OwnerId, r: &ReadingObject) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO reading_objects
         (id, owner_id, book_name, author, year, info)
         VALUES (?, ?, ?, ?, ?, ?)",
        libsql::params![
            r.id.as_str(),
            owner.as_str(),
            r.book_name.as_str(),
            r.author.as_str(),
            r.year,
            r.info.clone()
        ],
    )
    .await?;
    Ok(())
}

async fn update_reading_object(
    conn: &Connection,
    owner: &OwnerId,
    r: &ReadingObject,
) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE reading_objects
             SET book_name = ?, author = ?, year = ?, info = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                r.book_name.as_str(),
                r.author.as_str(),
                r.year,
                r.info.clone(),
                r.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_session_log(conn: &Connection, owner: &OwnerId, s: &SessionLog) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session_logs
         (id, owner_id, activity_id, time_start, time_end, tracker_entries, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        libsql::params![
            s.id.as_str(),
            owner.as_str(),
            s.activity_id.as_str(),
            s.time_start.to_rfc3339(),
            s.time_end.to_rfc3339(),
            serde_json::to_string(&s.tracker_entries)?,
            serde_json::to_string(&s.notes)?
        ],
    )
    .await?;
    Ok(())
}

async fn update_session_log(conn: &Connection, owner: &OwnerId, s: &SessionLog) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE session_logs
             SET activity_id = ?, time_start = ?, time_end = ?, tracker_entries = ?, notes = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                s.activity_id.as_str(),
                s.time_start.to_rfc3339(),
                s.time_end.to_rfc3339(),
                serde_json::to_string(&s.tracker_entries)?,
                serde_json::to_string(&s.notes)?,
                s.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_intake_log(conn: &Connection, owner: &OwnerId, i: &IntakeLog) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO intake_logs
         (id, owner_id, intake_id, timestamp, quantity, unit)
         VALUES (?, ?, ?, ?, ?, ?)",
        libsql::params![
            i.id.as_str(),
            owner.as_str(),
            i.intake_id.as_str(),
            i.timestamp.to_rfc3339(),
            i.quantity,
            i.unit.as_str()
        ],
    )
    .await?;
    Ok(())
}

async fn update_intake_log(conn: &Connection, owner: &OwnerId, i: &IntakeLog) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE intake_logs
             SET intake_id = ?, timestamp = ?, quantity = ?, unit = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                i.intake_id.as_str(),
                i.timestamp.to_rfc3339(),
                i.quantity,
                i.unit.as_str(),
                i.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_reading_log(conn: &Connection, owner: &OwnerId, r: &ReadingLog) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO reading_logs
         (id, owner_id, reading_id, time_start, time_end, tracker_entries, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        libsql::params![
            r.id.as_str(),
            owner.as_str(),
            r.reading_id.as_str(),
            r.time_start.to_rfc3339(),
            r.time_end.to_rfc3339(),
            serde_json::to_string(&r.tracker_entries)?,
            serde_json::to_string(&r.notes)?
        ],
    )
    .await?;
    Ok(())
}

async fn update_reading_log(conn: &Connection, owner: &OwnerId, r: &ReadingLog) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE reading_logs
             SET reading_id = ?, time_start = ?, time_end = ?, tracker_entries = ?, notes = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                r.reading_id.as_str(),
                r.time_start.to_rfc3339(),
                r.time_end.to_rfc3339(),
                serde_json::to_string(&r.tracker_entries)?,
                serde_json::to_string(&r.notes)?,
                r.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

async fn insert_note_log(conn: &Connection, owner: &OwnerId, n: &NoteLog) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO note_logs
         (id, owner_id, timestamp, title, content, tracker_entries, related_activity_ids)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        libsql::params![
            n.id.as_str(),
            owner.as_str(),
            n.timestamp.to_rfc3339(),
            n.title.clone(),
            n.content.as_str(),
            serde_json::to_string(&n.tracker_entries)?,
            serde_json::to_string(&n.related_activity_ids)?
        ],
    )
    .await?;
    Ok(())
}

async fn update_note_log(conn: &Connection, owner: &OwnerId, n: &NoteLog) -> Result<u64> {
    let affected = conn
        .execute(
            "UPDATE note_logs
             SET timestamp = ?, title = ?, content = ?, tracker_entries = ?, related_activity_ids = ?
             WHERE id = ? AND owner_id = ?",
            libsql::params![
                n.timestamp.to_rfc3339(),
                n.title.clone(),
                n.content.as_str(),
                serde_json::to_string(&n.tracker_entries)?,
                serde_json::to_string(&n.related_activity_ids)?,
                n.id.as_str(),
                owner.as_str()
            ],
        )
        .await?;
    Ok(affected)
}

// --- per-kind decode ---

fn row_to_activity(row: &libsql::Row) -> Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get::<String>(2)?.parse()?,
        sub_activity: row.get(3)?,
        sub_sub_activity: row.get(4)?,
        info: row.get(5)?,
    })
}

fn row_to_intake(row: &libsql::Row) -> Result<Intake> {
    Ok(Intake {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get::<String>(2)?.parse()?,
        default_quantity: row.get(3)?,
        default_unit: row.get::<String>(4)?.parse()?,
        info: row.get(5)?,
    })
}

fn row_to_reading_object(row: &libsql::Row) -> Result<ReadingObject> {
    Ok(ReadingObject {
        id: row.get(0)?,
        book_name: row.get(1)?,
        author: row.get(2)?,
        year: row.get(3)?,
        info: row.get(4)?,
    })
}

fn row_to_session_log(row: &libsql::Row) -> Result<SessionLog> {
    Ok(SessionLog {
        id: row.get(0)?,
        activity_id: row.get(1)?,
        time_start: parse_rfc3339(&row.get::<String>(2)?)?,
        time_end: parse_rfc3339(&row.get::<String>(3)?)?,
        tracker_entries: serde_json::from_str(&row.get::<String>(4)?)?,
        notes: serde_json::from_str(&row.get::<String>(5)?)?,
    })
}

fn row_to_intake_log(row: &libsql::Row) -> Result<IntakeLog> {
    Ok(IntakeLog {
        id: row.get(0)?,
        intake_id: row.get(1)?,
        timestamp: parse_rfc3339(&row.get::<String>(2)?)?,
        quantity: row.get(3)?,
        unit: row.get::<String>(4)?.parse()?,
    })
}

fn row_to_reading_log(row: &libsql::Row) -> Result<ReadingLog> {
    Ok(ReadingLog {
        id: row.get(0)?,
        reading_id: row.get(1)?,
        time_start: parse_rfc3339(&row.get::<String>(2)?)?,
        time_end: parse_rfc3339(&row.get::<String>(3)?)?,
        tracker_entries: serde_json::from_str(&row.get::<String>(4)?)?,
        notes: serde_json::from_str(&row.get::<String>(5)?)?,
    })
}

fn row_to_note_log(row: &libsql::Row) -> Result<NoteLog> {
    Ok(NoteLog {
        id: row.get(0)?,
        timestamp: parse_rfc3339(&row.get::<String>(1)?)?,
        title: row.get(2)?,
        content: row.get(3)?,
        tracker_entries: serde_json::from_str(&row.get::<String>(4)?)?,
        related_activity_ids: serde_json::from_str(&row.get::<String>(5)?)?,
    })
}
