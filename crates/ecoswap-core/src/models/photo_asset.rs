//! Photo asset model and upload-state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::now_ms;

/// A unique identifier for a photo asset, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoAssetId(Uuid);

impl PhotoAssetId {
    /// Create a new unique asset ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PhotoAssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhotoAssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhotoAssetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The four remote storage buckets photos are routed to.
///
/// A bucket assignment is immutable once an asset is created; the remote
/// bucket *names* are configuration (`BucketNames`), this enum is the
/// in-core identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    /// General app imagery (profile photos etc.)
    Images,
    /// Photos attached to marketplace listings
    ListingPhotos,
    /// Proof-of-swap photos gating trade completion
    TradeProofs,
    /// Community/forum post photos
    CommunityPhotos,
}

impl Bucket {
    /// All buckets, in upload-pipeline scheduling order.
    pub const ALL: [Self; 4] = [
        Self::Images,
        Self::ListingPhotos,
        Self::TradeProofs,
        Self::CommunityPhotos,
    ];

    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::ListingPhotos => "listing-photos",
            Self::TradeProofs => "trade-proofs",
            Self::CommunityPhotos => "community-photos",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "images" => Some(Self::Images),
            "listing-photos" => Some(Self::ListingPhotos),
            "trade-proofs" => Some(Self::TradeProofs),
            "community-photos" => Some(Self::CommunityPhotos),
            _ => None,
        }
    }
}

/// Upload lifecycle of a photo asset.
///
/// Transitions move forward only; an `Uploaded` asset can never re-enter
/// the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadState {
    Queued,
    Uploading,
    Uploaded,
    Failed,
}

impl UploadState {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "uploading" => Some(Self::Uploading),
            "uploaded" => Some(Self::Uploaded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether moving to `next` is a legal transition.
    ///
    /// `Uploading -> Queued` is the backoff requeue; `Failed -> Queued`
    /// is a user-visible retry.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Uploading)
                | (Self::Uploading, Self::Uploaded | Self::Failed | Self::Queued)
                | (Self::Failed, Self::Queued)
        )
    }
}

/// A photo attached to a listing, trade, or community post, tracked from
/// local capture through remote upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoAsset {
    /// Unique identifier
    pub id: PhotoAssetId,
    /// Owning entity id (listing id, trade id, or post id)
    pub entity_id: String,
    /// For trade proofs: which trading party submitted this photo
    pub party_id: Option<String>,
    /// Destination bucket (immutable after creation)
    pub bucket: Bucket,
    /// Path to the pending image bytes on local disk
    pub local_path: String,
    /// Public URL, set once the upload is acknowledged
    pub remote_url: Option<String>,
    /// Upload lifecycle state
    pub state: UploadState,
    /// Retryable failures so far
    pub retry_count: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last state change (Unix ms)
    pub updated_at: i64,
}

impl PhotoAsset {
    /// Create a queued asset for the given owning entity and bucket.
    pub fn new(
        entity_id: impl Into<String>,
        bucket: Bucket,
        local_path: impl Into<String>,
        party_id: Option<String>,
    ) -> Result<Self> {
        let entity_id = entity_id.into().trim().to_string();
        let local_path = local_path.into().trim().to_string();

        if entity_id.is_empty() {
            return Err(Error::InvalidInput(
                "PhotoAsset entity_id cannot be empty".to_string(),
            ));
        }
        if local_path.is_empty() {
            return Err(Error::InvalidInput(
                "PhotoAsset local_path cannot be empty".to_string(),
            ));
        }

        let now = now_ms();
        Ok(Self {
            id: PhotoAssetId::new(),
            entity_id,
            party_id,
            bucket,
            local_path,
            remote_url: None,
            state: UploadState::Queued,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}
