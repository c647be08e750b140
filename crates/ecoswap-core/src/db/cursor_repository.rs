//! Sync cursor persistence

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{EntityTable, SyncCursor};
use crate::util::now_ms;

/// Trait for per-table sync cursor storage
pub trait CursorRepository {
    /// Current cursor for a table; empty on first run
    fn get(&self, table: EntityTable) -> Result<SyncCursor>;

    /// Advance the cursor if `watermark` is newer. Never moves backwards.
    fn advance(&self, table: EntityTable, watermark: i64) -> Result<()>;

    /// Explicit cache invalidation: the next pull refetches everything
    fn reset(&self, table: EntityTable) -> Result<()>;
}

/// `SQLite` implementation of `CursorRepository`
pub struct SqliteCursorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCursorRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CursorRepository for SqliteCursorRepository<'_> {
    fn get(&self, table: EntityTable) -> Result<SyncCursor> {
        let result = self.conn.query_row(
            "SELECT last_synced_at, updated_at FROM sync_cursors WHERE table_name = ?",
            params![table.as_str()],
            |row| {
                Ok(SyncCursor {
                    table,
                    last_synced_at: row.get(0)?,
                    updated_at: row.get(1)?,
                })
            },
        );

        match result {
            Ok(cursor) => Ok(cursor),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(SyncCursor::empty(table)),
            Err(e) => Err(e.into()),
        }
    }

    fn advance(&self, table: EntityTable, watermark: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_cursors (table_name, last_synced_at, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(table_name) DO UPDATE SET
                last_synced_at = MAX(sync_cursors.last_synced_at, excluded.last_synced_at),
                updated_at = excluded.updated_at",
            params![table.as_str(), watermark, now_ms()],
        )?;
        Ok(())
    }

    fn reset(&self, table: EntityTable) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_cursors WHERE table_name = ?",
            params![table.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn first_run_cursor_is_empty() {
        let db = setup();
        let repo = SqliteCursorRepository::new(db.connection());

        let cursor = repo.get(EntityTable::Listings).unwrap();
        assert_eq!(cursor.last_synced_at, 0);
    }

    #[test]
    fn advance_is_monotonic() {
        let db = setup();
        let repo = SqliteCursorRepository::new(db.connection());

        repo.advance(EntityTable::Listings, 500).unwrap();
        repo.advance(EntityTable::Listings, 300).unwrap(); // stale, ignored
        repo.advance(EntityTable::Listings, 900).unwrap();

        let cursor = repo.get(EntityTable::Listings).unwrap();
        assert_eq!(cursor.last_synced_at, 900);
    }

    #[test]
    fn tables_are_independent() {
        let db = setup();
        let repo = SqliteCursorRepository::new(db.connection());

        repo.advance(EntityTable::Listings, 500).unwrap();
        assert_eq!(repo.get(EntityTable::Trades).unwrap().last_synced_at, 0);
    }

    #[test]
    fn reset_clears_watermark() {
        let db = setup();
        let repo = SqliteCursorRepository::new(db.connection());

        repo.advance(EntityTable::Trades, 500).unwrap();
        repo.reset(EntityTable::Trades).unwrap();
        assert_eq!(repo.get(EntityTable::Trades).unwrap().last_synced_at, 0);
    }
}
