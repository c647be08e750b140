//! Durable photo upload queue

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Bucket, PhotoAsset, PhotoAssetId, UploadState};
use crate::util::now_ms;

/// Trait for the durable upload queue.
///
/// Pending uploads survive process restarts; every state change is
/// validated against `UploadState::can_become` so an uploaded asset can
/// never re-enter the queue.
pub trait PhotoQueueRepository {
    /// Persist a new queued asset
    fn enqueue(&self, asset: &PhotoAsset) -> Result<()>;

    /// Get an asset by ID
    fn get(&self, id: &PhotoAssetId) -> Result<Option<PhotoAsset>>;

    /// Atomically claim the oldest queued asset for a bucket, flipping it
    /// to `uploading`. Returns `None` when the bucket's queue is empty.
    fn claim_next(&self, bucket: Bucket) -> Result<Option<PhotoAsset>>;

    /// Record a completed upload with its public URL
    fn mark_uploaded(&self, id: &PhotoAssetId, remote_url: &str) -> Result<()>;

    /// Put an asset back in the queue after a transient failure
    fn requeue(&self, id: &PhotoAssetId, retry_count: i64) -> Result<()>;

    /// Mark an asset failed (terminal until a user-visible retry)
    fn mark_failed(&self, id: &PhotoAssetId) -> Result<()>;

    /// User-visible retry of a failed asset
    fn retry_failed(&self, id: &PhotoAssetId) -> Result<()>;

    /// Assets in a given state, oldest first
    fn list_by_state(&self, state: UploadState, limit: usize) -> Result<Vec<PhotoAsset>>;

    /// Uploaded proof assets for a trade, grouped check for the resolver
    fn uploaded_proof_parties(&self, trade_id: &str) -> Result<Vec<String>>;

    /// Queue depth (queued + uploading) per bucket
    fn pending_count(&self, bucket: Bucket) -> Result<i64>;

    /// Recover assets stuck in `uploading` after a crash back to `queued`
    fn recover_interrupted(&self) -> Result<usize>;
}

/// `SQLite` implementation of `PhotoQueueRepository`
pub struct SqlitePhotoQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePhotoQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an asset from a database row
    fn parse_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhotoAsset> {
        let id: String = row.get(0)?;
        let bucket: String = row.get(3)?;
        let state: String = row.get(6)?;

        Ok(PhotoAsset {
            id: id.parse().map_err(|e| super::corrupt_id(0, e))?,
            entity_id: row.get(1)?,
            party_id: row.get(2)?,
            bucket: Bucket::parse(&bucket).unwrap_or(Bucket::Images),
            local_path: row.get(4)?,
            remote_url: row.get(5)?,
            state: UploadState::parse(&state).unwrap_or(UploadState::Failed),
            retry_count: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn transition(&self, id: &PhotoAssetId, next: UploadState) -> Result<PhotoAsset> {
        let current = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !current.state.can_become(next) {
            return Err(Error::InvalidInput(format!(
                "photo asset {id} cannot move {} -> {}",
                current.state.as_str(),
                next.as_str()
            )));
        }

        self.conn.execute(
            "UPDATE photo_assets SET state = ?, updated_at = ? WHERE id = ?",
            params![next.as_str(), now_ms(), id.as_str()],
        )?;

        Ok(current)
    }

    const SELECT: &'static str = "SELECT id, entity_id, party_id, bucket, local_path,
        remote_url, state, retry_count, created_at, updated_at FROM photo_assets";
}

impl PhotoQueueRepository for SqlitePhotoQueueRepository<'_> {
    fn enqueue(&self, asset: &PhotoAsset) -> Result<()> {
        self.conn.execute(
            "INSERT INTO photo_assets (
                id, entity_id, party_id, bucket, local_path, remote_url,
                state, retry_count, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                asset.id.as_str(),
                asset.entity_id,
                asset.party_id,
                asset.bucket.as_str(),
                asset.local_path,
                asset.remote_url,
                asset.state.as_str(),
                asset.retry_count,
                asset.created_at,
                asset.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &PhotoAssetId) -> Result<Option<PhotoAsset>> {
        let sql = format!("{} WHERE id = ?", Self::SELECT);
        let result = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::parse_asset);

        match result {
            Ok(asset) => Ok(Some(asset)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn claim_next(&self, bucket: Bucket) -> Result<Option<PhotoAsset>> {
        let sql = format!(
            "{} WHERE bucket = ? AND state = 'queued' ORDER BY created_at ASC LIMIT 1",
            Self::SELECT
        );
        let candidate = match self
            .conn
            .query_row(&sql, params![bucket.as_str()], Self::parse_asset)
        {
            Ok(asset) => asset,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Guarded update: only one claimant can win the flip.
        let rows = self.conn.execute(
            "UPDATE photo_assets SET state = 'uploading', updated_at = ?
             WHERE id = ? AND state = 'queued'",
            params![now_ms(), candidate.id.as_str()],
        )?;

        if rows == 0 {
            return Ok(None);
        }

        self.get(&candidate.id)
    }

    fn mark_uploaded(&self, id: &PhotoAssetId, remote_url: &str) -> Result<()> {
        self.transition(id, UploadState::Uploaded)?;
        self.conn.execute(
            "UPDATE photo_assets SET remote_url = ? WHERE id = ?",
            params![remote_url, id.as_str()],
        )?;
        Ok(())
    }

    fn requeue(&self, id: &PhotoAssetId, retry_count: i64) -> Result<()> {
        self.transition(id, UploadState::Queued)?;
        self.conn.execute(
            "UPDATE photo_assets SET retry_count = ? WHERE id = ?",
            params![retry_count, id.as_str()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: &PhotoAssetId) -> Result<()> {
        self.transition(id, UploadState::Failed)?;
        Ok(())
    }

    fn retry_failed(&self, id: &PhotoAssetId) -> Result<()> {
        let current = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if current.state != UploadState::Failed {
            return Err(Error::InvalidInput(format!(
                "photo asset {id} is not failed (state: {})",
                current.state.as_str()
            )));
        }

        self.conn.execute(
            "UPDATE photo_assets SET state = 'queued', retry_count = 0, updated_at = ?
             WHERE id = ?",
            params![now_ms(), id.as_str()],
        )?;
        Ok(())
    }

    fn list_by_state(&self, state: UploadState, limit: usize) -> Result<Vec<PhotoAsset>> {
        let sql = format!(
            "{} WHERE state = ? ORDER BY created_at ASC LIMIT ?",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let assets = stmt
            .query_map(params![state.as_str(), limit as i64], Self::parse_asset)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assets)
    }

    fn uploaded_proof_parties(&self, trade_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT party_id FROM photo_assets
             WHERE entity_id = ? AND bucket = 'trade-proofs'
               AND state = 'uploaded' AND party_id IS NOT NULL",
        )?;
        let parties = stmt
            .query_map(params![trade_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(parties)
    }

    fn pending_count(&self, bucket: Bucket) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photo_assets
             WHERE bucket = ? AND state IN ('queued', 'uploading')",
            params![bucket.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn recover_interrupted(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE photo_assets SET state = 'queued', updated_at = ?
             WHERE state = 'uploading'",
            params![now_ms()],
        )?;
        Ok(rows)
    }
}
