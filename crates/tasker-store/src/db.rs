use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// How long a writer waits for another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The two logical tables the core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Task registry: one row per submitted task.
    Processes,
    /// Stats ledger: one row per distinct task name.
    ProcessStats,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Processes, Collection::ProcessStats];

    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Processes => "processes",
            Collection::ProcessStats => "process_stats",
        }
    }

    fn schema(self) -> &'static str {
        match self {
            // last_update / running are nullable: both are recomputed on read.
            Collection::Processes => {
                "CREATE TABLE IF NOT EXISTS processes (
                    task_id     INTEGER PRIMARY KEY,
                    created     TEXT    NOT NULL,
                    process_id  INTEGER NOT NULL,
                    job_name    TEXT    NOT NULL,
                    command     TEXT    NOT NULL,
                    last_update TEXT,
                    running     INTEGER
                );"
            }
            Collection::ProcessStats => {
                "CREATE TABLE IF NOT EXISTS process_stats (
                    task_name        TEXT    NOT NULL PRIMARY KEY,
                    command          TEXT    NOT NULL,
                    average_duration REAL    NOT NULL DEFAULT 0,
                    executions       INTEGER NOT NULL DEFAULT 0
                );"
            }
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Open (or create) the database file with the pragmas every process needs.
///
/// WAL lets the CLI read while a worker writes; the busy timeout makes
/// concurrent writers from different worker processes queue instead of failing.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// In-memory database, mostly for tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(())
}

/// Create `collection` if it does not exist. Idempotent.
pub fn create_if_missing(conn: &Connection, collection: Collection) -> Result<()> {
    conn.execute_batch(collection.schema())?;
    Ok(())
}

/// Create every collection. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    for collection in Collection::ALL {
        create_if_missing(conn, collection)?;
    }
    Ok(())
}

pub fn collection_exists(conn: &Connection, collection: Collection) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [collection.table_name()],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_if_missing_is_idempotent() {
        let conn = open_in_memory().unwrap();
        assert!(!collection_exists(&conn, Collection::Processes).unwrap());

        create_if_missing(&conn, Collection::Processes).unwrap();
        create_if_missing(&conn, Collection::Processes).unwrap();
        assert!(collection_exists(&conn, Collection::Processes).unwrap());
        assert!(!collection_exists(&conn, Collection::ProcessStats).unwrap());
    }

    #[test]
    fn init_db_creates_both_collections() {
        let conn = open_in_memory().unwrap();
        init_db(&conn).unwrap();
        for collection in Collection::ALL {
            assert!(collection_exists(&conn, collection).unwrap());
        }
    }

    #[test]
    fn display_uses_table_name() {
        assert_eq!(Collection::ProcessStats.to_string(), "process_stats");
    }
}
