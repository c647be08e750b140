//! Sync conflict ledger persistence

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::SyncConflict;
use crate::util::now_ms;

/// Trait for the conflict ledger
pub trait ConflictRepository {
    /// Record a resolved or surfaced conflict
    fn record(
        &self,
        table_name: &str,
        entity_id: &str,
        field: &str,
        local_value: &str,
        remote_value: &str,
        strategy: &str,
    ) -> Result<()>;

    /// Most recent conflicts, newest first
    fn list_recent(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn record(
        &self,
        table_name: &str,
        entity_id: &str,
        field: &str,
        local_value: &str,
        remote_value: &str,
        strategy: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts (
                table_name, entity_id, field, local_value, remote_value,
                resolved_at, strategy
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                table_name,
                entity_id,
                field,
                local_value,
                remote_value,
                now_ms(),
                strategy
            ],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, table_name, entity_id, field, local_value, remote_value,
                    resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncConflict {
                    id: row.get(0)?,
                    table_name: row.get(1)?,
                    entity_id: row.get(2)?,
                    field: row.get(3)?,
                    local_value: row.get(4)?,
                    remote_value: row.get(5)?,
                    resolved_at: row.get(6)?,
                    strategy: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::sync_conflict_strategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_and_list() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(db.connection());

        repo.record(
            "listings",
            "listing-1",
            "description",
            "\"local\"",
            "\"remote\"",
            sync_conflict_strategy::MANUAL,
        )
        .unwrap();

        let conflicts = repo.list_recent(10).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity_id, "listing-1");
        assert_eq!(conflicts[0].field, "description");
        assert_eq!(conflicts[0].strategy, "manual");
    }

    #[test]
    fn list_respects_limit() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(db.connection());

        for i in 0..5 {
            repo.record(
                "listings",
                &format!("listing-{i}"),
                "*",
                "{}",
                "{}",
                sync_conflict_strategy::THREE_WAY_MERGE,
            )
            .unwrap();
        }

        assert_eq!(repo.list_recent(3).unwrap().len(), 3);
    }
}
