//! Listing model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::now_ms;

/// A unique identifier for a listing, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(Uuid);

impl ListingId {
    /// Create a new unique listing ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Listing lifecycle status.
///
/// `Removed` is the soft-delete state; rows are never physically deleted
/// so trade history stays intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingStatus {
    Active,
    PendingTrade,
    Completed,
    Removed,
}

impl ListingStatus {
    /// Stable string form used in the database and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingTrade => "pending-trade",
            Self::Completed => "completed",
            Self::Removed => "removed",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "pending-trade" => Some(Self::PendingTrade),
            "completed" => Some(Self::Completed),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Geotagged pickup point for a listing, with the timestamp of the fix
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListingLocation {
    pub lat: f64,
    pub lon: f64,
    /// When the coordinates were captured (Unix ms)
    pub fix_at: i64,
}

/// A swap listing in the marketplace.
///
/// `is_dirty` and `last_synced_at` are local bookkeeping and never leave
/// the device; everything else round-trips through the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Unique identifier
    pub id: ListingId,
    /// Creating user's id
    pub owner_id: String,
    /// Short title shown in the marketplace feed
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Category name (drives the proof-photo policy)
    pub category: String,
    /// Uploaded listing-photo URLs, in attachment order
    #[serde(default)]
    pub photo_urls: Vec<String>,
    /// Pickup location, if the owner shared one
    #[serde(default)]
    pub location: Option<ListingLocation>,
    /// Lifecycle status
    pub status: ListingStatus,
    /// Monotonic version for conflict detection
    pub version: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    /// Local edit not yet acknowledged by the remote store
    #[serde(skip)]
    pub is_dirty: bool,
    /// Last successful sync of this record (Unix ms)
    #[serde(skip)]
    pub last_synced_at: Option<i64>,
}

impl Listing {
    /// Create a new locally-authored listing, dirty until pushed.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: ListingId::new(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            photo_urls: Vec::new(),
            location: None,
            status: ListingStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
            is_dirty: true,
            last_synced_at: None,
        }
    }

    /// Whether this listing has been soft-deleted.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.status == ListingStatus::Removed
    }

    /// Record a local mutation: bump the modification time and dirty flag.
    pub fn touch_local(&mut self) {
        self.updated_at = now_ms();
        self.is_dirty = true;
    }
}
