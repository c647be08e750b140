//! Database connection management

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

use super::migrations;

/// Wrapper around the local `SQLite` cache connection.
///
/// The connection is the only shared mutable resource in the core; async
/// components share it behind `Arc<tokio::sync::Mutex<Database>>` and hold
/// the lock only for short repository calls, never across a network await.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the cache at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for durability and concurrent readers.
    fn configure(&self) -> Result<()> {
        // WAL is unsupported for in-memory databases; ignore that failure.
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations.
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection.
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='listings'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn open_on_disk_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cache.db");

        {
            let db = Database::open(&path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO sync_cursors (table_name, last_synced_at, updated_at)
                     VALUES ('listings', 7, 7)",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let watermark: i64 = db
            .connection()
            .query_row(
                "SELECT last_synced_at FROM sync_cursors WHERE table_name = 'listings'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(watermark, 7);
    }
}
