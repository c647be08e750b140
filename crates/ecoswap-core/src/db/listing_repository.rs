//! Listing repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Listing, ListingId, ListingLocation, ListingStatus};
use crate::util::now_ms;

/// Trait for listing cache operations
pub trait ListingRepository {
    /// Insert a newly authored listing (dirty, awaiting push)
    fn insert(&self, listing: &Listing) -> Result<()>;

    /// Persist a local edit: all fields written, record marked dirty.
    ///
    /// The base snapshot from the last acknowledged sync is preserved so a
    /// later push conflict can three-way merge.
    fn save_local(&self, listing: &Listing) -> Result<()>;

    /// Get a listing by ID, including soft-deleted ones
    fn get(&self, id: &ListingId) -> Result<Option<Listing>>;

    /// List listings (excluding removed), newest first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Listing>>;

    /// Listings with unpushed local edits
    fn list_dirty(&self) -> Result<Vec<Listing>>;

    /// Active listings that carry a location (proximity matcher feed)
    fn list_active_located(&self) -> Result<Vec<Listing>>;

    /// Write an accepted remote record: clean, with its own JSON as the
    /// new merge base
    fn apply_remote(&self, listing: &Listing, synced_at: i64) -> Result<()>;

    /// Record a successful push: clear dirty, adopt the server version,
    /// store the pushed state as the new merge base
    fn mark_synced(
        &self,
        id: &ListingId,
        version: i64,
        updated_at: i64,
        synced_at: i64,
    ) -> Result<()>;

    /// Last remote-acknowledged JSON snapshot, if any
    fn base_snapshot(&self, id: &ListingId) -> Result<Option<Listing>>;

    /// Soft-delete locally (status -> removed, dirty)
    fn soft_delete(&self, id: &ListingId) -> Result<()>;
}

/// `SQLite` implementation of `ListingRepository`
pub struct SqliteListingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteListingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a listing from a database row
    fn parse_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
        let id: String = row.get(0)?;
        let photo_urls: String = row.get(5)?;
        let lat: Option<f64> = row.get(6)?;
        let lon: Option<f64> = row.get(7)?;
        let fix_at: Option<i64> = row.get(8)?;
        let status: String = row.get(9)?;

        let location = match (lat, lon, fix_at) {
            (Some(lat), Some(lon), Some(fix_at)) => Some(ListingLocation { lat, lon, fix_at }),
            _ => None,
        };

        Ok(Listing {
            id: id.parse().map_err(|e| super::corrupt_id(0, e))?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            photo_urls: serde_json::from_str(&photo_urls).unwrap_or_default(),
            location,
            status: ListingStatus::parse(&status).unwrap_or(ListingStatus::Removed),
            version: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            is_dirty: row.get::<_, i32>(13)? != 0,
            last_synced_at: row.get(14)?,
        })
    }

    fn write(&self, listing: &Listing, is_dirty: bool, synced_at: Option<i64>) -> Result<()> {
        let photo_urls = serde_json::to_string(&listing.photo_urls)?;
        let (lat, lon, fix_at) = match listing.location {
            Some(loc) => (Some(loc.lat), Some(loc.lon), Some(loc.fix_at)),
            None => (None, None, None),
        };

        self.conn.execute(
            "INSERT INTO listings (
                id, owner_id, title, description, category, photo_urls,
                lat, lon, location_fix_at, status, version,
                created_at, updated_at, is_dirty, last_synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                description = excluded.description,
                category = excluded.category,
                photo_urls = excluded.photo_urls,
                lat = excluded.lat,
                lon = excluded.lon,
                location_fix_at = excluded.location_fix_at,
                status = excluded.status,
                version = excluded.version,
                updated_at = excluded.updated_at,
                is_dirty = excluded.is_dirty,
                last_synced_at = COALESCE(excluded.last_synced_at, listings.last_synced_at)",
            params![
                listing.id.as_str(),
                listing.owner_id,
                listing.title,
                listing.description,
                listing.category,
                photo_urls,
                lat,
                lon,
                fix_at,
                listing.status.as_str(),
                listing.version,
                listing.created_at,
                listing.updated_at,
                i32::from(is_dirty),
                synced_at,
            ],
        )?;

        Ok(())
    }

    const SELECT: &'static str = "SELECT id, owner_id, title, description, category, photo_urls,
        lat, lon, location_fix_at, status, version, created_at, updated_at,
        is_dirty, last_synced_at FROM listings";
}

impl ListingRepository for SqliteListingRepository<'_> {
    fn insert(&self, listing: &Listing) -> Result<()> {
        self.write(listing, true, None)
    }

    fn save_local(&self, listing: &Listing) -> Result<()> {
        self.write(listing, true, None)
    }

    fn get(&self, id: &ListingId) -> Result<Option<Listing>> {
        let sql = format!("{} WHERE id = ?", Self::SELECT);
        let result = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::parse_listing);

        match result {
            Ok(listing) => Ok(Some(listing)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Listing>> {
        let sql = format!(
            "{} WHERE status != 'removed' ORDER BY updated_at DESC LIMIT ? OFFSET ?",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_listing)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn list_dirty(&self) -> Result<Vec<Listing>> {
        let sql = format!(
            "{} WHERE is_dirty = 1 ORDER BY updated_at ASC",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map([], Self::parse_listing)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn list_active_located(&self) -> Result<Vec<Listing>> {
        let sql = format!(
            "{} WHERE status = 'active' AND lat IS NOT NULL AND lon IS NOT NULL
             ORDER BY updated_at DESC",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map([], Self::parse_listing)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn apply_remote(&self, listing: &Listing, synced_at: i64) -> Result<()> {
        self.write(listing, false, Some(synced_at))?;
        let base = serde_json::to_string(listing)?;
        self.conn.execute(
            "UPDATE listings SET base_snapshot = ? WHERE id = ?",
            params![base, listing.id.as_str()],
        )?;
        Ok(())
    }

    fn mark_synced(
        &self,
        id: &ListingId,
        version: i64,
        updated_at: i64,
        synced_at: i64,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE listings
             SET version = ?, updated_at = ?, is_dirty = 0, last_synced_at = ?
             WHERE id = ?",
            params![version, updated_at, synced_at, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        // Adopt the acknowledged state as the new merge base.
        if let Some(listing) = self.get(id)? {
            let base = serde_json::to_string(&listing)?;
            self.conn.execute(
                "UPDATE listings SET base_snapshot = ? WHERE id = ?",
                params![base, id.as_str()],
            )?;
        }
        Ok(())
    }

    fn base_snapshot(&self, id: &ListingId) -> Result<Option<Listing>> {
        let result: rusqlite::Result<Option<String>> = self.conn.query_row(
            "SELECT base_snapshot FROM listings WHERE id = ?",
            params![id.as_str()],
            |row| row.get(0),
        );

        match result {
            Ok(Some(json)) => Ok(Some(serde_json::from_str(&json)?)),
            Ok(None) => Ok(None),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn soft_delete(&self, id: &ListingId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE listings
             SET status = 'removed', updated_at = ?, is_dirty = 1
             WHERE id = ? AND status != 'removed'",
            params![now_ms(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}
