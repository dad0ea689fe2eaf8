use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tasker_core::{StatsRecord, TaskId, TaskRecord};
use tracing::{debug, instrument};

use crate::db::{self, Collection};
use crate::error::{Result, StoreError};

/// Timestamps are stored as sortable local wall-clock text.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// How rows are written by [`Repository::save_tasks`] / [`Repository::save_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Add the rows to whatever is already stored.
    Append,
    /// Drop every stored row, then write the given rows.
    Replace,
}

/// Durable storage for the task registry and the stats ledger.
///
/// Saving into a collection that does not exist yet creates it first.
/// Loading from one yields [`StoreError::CollectionMissing`].
pub trait Repository: Send {
    fn create_if_missing(&self, collection: Collection) -> Result<()>;

    fn load_tasks(&self) -> Result<Vec<TaskRecord>>;

    fn save_tasks(&self, rows: &[TaskRecord], mode: SaveMode) -> Result<()>;

    fn load_stats(&self) -> Result<Vec<StatsRecord>>;

    fn save_stats(&self, rows: &[StatsRecord], mode: SaveMode) -> Result<()>;

    /// `max(task_id) + 1`, or [`TaskId::FIRST`] on an empty or missing registry.
    fn next_task_id(&self) -> Result<TaskId>;

    /// Atomically read the ledger row for `task_name`, pass it to `apply`, and
    /// upsert the result. No other writer (thread or process) can interleave
    /// between the read and the write.
    fn update_stats(
        &self,
        task_name: &str,
        apply: &dyn Fn(Option<&StatsRecord>) -> StatsRecord,
    ) -> Result<StatsRecord>;
}

/// SQLite-backed [`Repository`].
///
/// Wraps a single connection in a `Mutex`; every worker process opens its own
/// repository, and SQLite's file locking arbitrates between processes.
pub struct SqliteRepository {
    db: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?))
    }

    /// Create every collection.
    pub fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        db::init_db(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Repository for SqliteRepository {
    fn create_if_missing(&self, collection: Collection) -> Result<()> {
        let conn = self.conn()?;
        db::create_if_missing(&conn, collection)
    }

    #[instrument(skip(self))]
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        let conn = self.conn()?;
        ensure_exists(&conn, Collection::Processes)?;

        let mut stmt = conn.prepare(
            "SELECT task_id, created, process_id, job_name, command, last_update, running
             FROM processes ORDER BY task_id",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,            // task_id
                    row.get::<_, String>(1)?,         // created
                    row.get::<_, i64>(2)?,            // process_id
                    row.get::<_, String>(3)?,         // job_name
                    row.get::<_, String>(4)?,         // command
                    row.get::<_, Option<String>>(5)?, // last_update
                    row.get::<_, Option<bool>>(6)?,   // running
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let tasks = raw
            .into_iter()
            .map(
                |(task_id, created, process_id, job_name, command, last_update, running)|
                 -> Result<TaskRecord> {
                    Ok(TaskRecord {
                        task_id: TaskId(task_id),
                        created: parse_timestamp(&created)?,
                        process_id: u32::try_from(process_id).map_err(|_| StoreError::Corrupt {
                            collection: Collection::Processes,
                            reason: format!("process_id {process_id} out of range"),
                        })?,
                        job_name,
                        command,
                        last_update: last_update.as_deref().map(parse_timestamp).transpose()?,
                        running,
                    })
                },
            )
            .collect::<Result<Vec<_>>>()?;

        debug!(count = tasks.len(), "loaded task registry");
        Ok(tasks)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    fn save_tasks(&self, rows: &[TaskRecord], mode: SaveMode) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        db::create_if_missing(&tx, Collection::Processes)?;
        if mode == SaveMode::Replace {
            tx.execute("DELETE FROM processes", [])?;
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO processes
                 (task_id, created, process_id, job_name, command, last_update, running)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.task_id.get(),
                    format_timestamp(&row.created),
                    i64::from(row.process_id),
                    row.job_name,
                    row.command,
                    row.last_update.as_ref().map(format_timestamp),
                    row.running,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_stats(&self) -> Result<Vec<StatsRecord>> {
        let conn = self.conn()?;
        ensure_exists(&conn, Collection::ProcessStats)?;

        let mut stmt = conn.prepare(
            "SELECT task_name, command, average_duration, executions
             FROM process_stats ORDER BY rowid",
        )?;
        let stats = stmt
            .query_map([], row_to_stats)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    fn save_stats(&self, rows: &[StatsRecord], mode: SaveMode) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        db::create_if_missing(&tx, Collection::ProcessStats)?;
        if mode == SaveMode::Replace {
            tx.execute("DELETE FROM process_stats", [])?;
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO process_stats (task_name, command, average_duration, executions)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.task_name,
                    row.command,
                    row.average_duration,
                    executions_to_sql(row.executions),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn next_task_id(&self) -> Result<TaskId> {
        let conn = self.conn()?;
        if !db::collection_exists(&conn, Collection::Processes)? {
            return Ok(TaskId::FIRST);
        }
        let max: Option<i64> =
            conn.query_row("SELECT MAX(task_id) FROM processes", [], |row| row.get(0))?;
        match max {
            None => Ok(TaskId::FIRST),
            Some(id) => TaskId(id).next().ok_or_else(|| StoreError::Corrupt {
                collection: Collection::Processes,
                reason: format!("no task id left after {id}"),
            }),
        }
    }

    #[instrument(skip(self, apply))]
    fn update_stats(
        &self,
        task_name: &str,
        apply: &dyn Fn(Option<&StatsRecord>) -> StatsRecord,
    ) -> Result<StatsRecord> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so a concurrent worker
        // process blocks here instead of reading a row we are about to change.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        db::create_if_missing(&tx, Collection::ProcessStats)?;

        let existing = tx
            .query_row(
                "SELECT task_name, command, average_duration, executions
                 FROM process_stats WHERE task_name = ?1",
                [task_name],
                row_to_stats,
            )
            .optional()?;

        let updated = apply(existing.as_ref());
        tx.execute(
            "INSERT INTO process_stats (task_name, command, average_duration, executions)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(task_name) DO UPDATE SET
                command = excluded.command,
                average_duration = excluded.average_duration,
                executions = excluded.executions",
            rusqlite::params![
                updated.task_name,
                updated.command,
                updated.average_duration,
                executions_to_sql(updated.executions),
            ],
        )?;
        tx.commit()?;

        debug!(
            task_name,
            executions = updated.executions,
            average = updated.average_duration,
            "ledger row upserted"
        );
        Ok(updated)
    }
}

fn ensure_exists(conn: &Connection, collection: Collection) -> Result<()> {
    if db::collection_exists(conn, collection)? {
        Ok(())
    } else {
        Err(StoreError::CollectionMissing(collection))
    }
}

fn row_to_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatsRecord> {
    Ok(StatsRecord {
        task_name: row.get(0)?,
        command: row.get(1)?,
        average_duration: row.get(2)?,
        executions: row.get::<_, i64>(3)?.max(0) as u64,
    })
}

fn executions_to_sql(executions: u64) -> i64 {
    i64::try_from(executions).unwrap_or(i64::MAX)
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| StoreError::Corrupt {
        collection: Collection::Processes,
        reason: format!("bad timestamp {raw:?}: {e}"),
    })
}
