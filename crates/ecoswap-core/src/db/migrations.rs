//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 4;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }
    if version < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: listings, trades, sync cursors
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS listings (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            photo_urls TEXT NOT NULL DEFAULT '[]',
            lat REAL,
            lon REAL,
            location_fix_at INTEGER,
            status TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_dirty INTEGER NOT NULL DEFAULT 1,
            last_synced_at INTEGER,
            base_snapshot TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_listings_updated ON listings(updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);
        CREATE INDEX IF NOT EXISTS idx_listings_dirty ON listings(is_dirty);

        CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            listing_id TEXT NOT NULL,
            proposer_id TEXT NOT NULL,
            responder_id TEXT NOT NULL,
            state TEXT NOT NULL,
            proof_required INTEGER NOT NULL DEFAULT 0,
            grace_deadline INTEGER,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            is_dirty INTEGER NOT NULL DEFAULT 1,
            last_synced_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_trades_listing ON trades(listing_id);
        CREATE INDEX IF NOT EXISTS idx_trades_state ON trades(state);
        CREATE INDEX IF NOT EXISTS idx_trades_dirty ON trades(is_dirty);

        CREATE TABLE IF NOT EXISTS sync_cursors (
            table_name TEXT PRIMARY KEY,
            last_synced_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        );

        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: sync conflict ledger
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            field TEXT NOT NULL,
            local_value TEXT NOT NULL,
            remote_value TEXT NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity ON sync_conflicts(entity_id);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at
            ON sync_conflicts(resolved_at DESC);

        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: durable photo upload queue
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS photo_assets (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            party_id TEXT,
            bucket TEXT NOT NULL,
            local_path TEXT NOT NULL,
            remote_url TEXT,
            state TEXT NOT NULL DEFAULT 'queued',
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_photo_assets_entity ON photo_assets(entity_id);
        CREATE INDEX IF NOT EXISTS idx_photo_assets_bucket_state
            ON photo_assets(bucket, state, created_at);

        INSERT INTO schema_version (version) VALUES (3);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 3");
    Ok(())
}

/// Migration to version 4: per-party proof URLs on trades
fn migrate_v4(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        ALTER TABLE trades ADD COLUMN proof_urls TEXT NOT NULL DEFAULT '{}';

        INSERT INTO schema_version (version) VALUES (4);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 4");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v3_creates_photo_queue() {
        let conn = setup();
        run(&conn).unwrap();

        let exists: i32 = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'photo_assets'
                )",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(exists, 1);
    }

    #[test]
    fn test_migration_v4_adds_proof_urls() {
        let conn = setup();
        run(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('trades')
                 WHERE name = 'proof_urls'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 1);
    }
}
