//! Supabase endpoint/bucket configuration and tunable sync settings.
//!
//! Credentials and bucket names are injected configuration, never
//! hardcoded; any backend exposing the same table and storage operations
//! is substitutable behind the `RemoteClient` trait.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Bucket;
use crate::sync::RetryPolicy;
use crate::util::{is_http_url, normalize_text_option};

const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_IMAGES_BUCKET: &str = "ECOSWAP_IMAGES_BUCKET";
const ENV_LISTINGS_BUCKET: &str = "ECOSWAP_LISTINGS_BUCKET";
const ENV_PROOFS_BUCKET: &str = "ECOSWAP_PROOFS_BUCKET";
const ENV_COMMUNITY_BUCKET: &str = "ECOSWAP_COMMUNITY_BUCKET";

const DEFAULT_IMAGES_BUCKET: &str = "ecoswap-images";
const DEFAULT_LISTINGS_BUCKET: &str = "listing-photos";
const DEFAULT_PROOFS_BUCKET: &str = "trade-proofs";
const DEFAULT_COMMUNITY_BUCKET: &str = "community-photos";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Remote bucket names for each photo destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNames {
    pub images: String,
    pub listing_photos: String,
    pub trade_proofs: String,
    pub community_photos: String,
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            images: DEFAULT_IMAGES_BUCKET.to_string(),
            listing_photos: DEFAULT_LISTINGS_BUCKET.to_string(),
            trade_proofs: DEFAULT_PROOFS_BUCKET.to_string(),
            community_photos: DEFAULT_COMMUNITY_BUCKET.to_string(),
        }
    }
}

impl BucketNames {
    /// Remote bucket name for a destination.
    #[must_use]
    pub fn name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Images => &self.images,
            Bucket::ListingPhotos => &self.listing_photos,
            Bucket::TradeProofs => &self.trade_proofs,
            Bucket::CommunityPhotos => &self.community_photos,
        }
    }
}

/// Supabase connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL (e.g. `https://xyzcompany.supabase.co`)
    pub url: String,
    /// Anonymous/publishable API key
    pub anon_key: String,
    /// Bucket names for the four photo destinations
    pub buckets: BucketNames,
    /// Per-request timeout; exceeding it is treated as `Unavailable`
    pub request_timeout: Duration,
}

impl SupabaseConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no Supabase variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// PostgREST endpoint for a table.
    #[must_use]
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    /// Storage object endpoint for a bucket/key pair.
    #[must_use]
    pub fn storage_url(&self, bucket_name: &str, object_key: &str) -> String {
        format!("{}/storage/v1/object/{bucket_name}/{object_key}", self.url)
    }

    /// Public download URL for an uploaded object.
    #[must_use]
    pub fn public_object_url(&self, bucket_name: &str, object_key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket_name}/{object_key}",
            self.url
        )
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<SupabaseConfig>> {
    let url = normalize_text_option(lookup(ENV_SUPABASE_URL));
    let anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));

    if url.is_none() && anon_key.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if url.is_none() {
        missing.push(ENV_SUPABASE_URL);
    }
    if anon_key.is_none() {
        missing.push(ENV_SUPABASE_ANON_KEY);
    }
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Supabase configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let url = url.expect("validated above");
    if !is_http_url(&url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_SUPABASE_URL} must include http:// or https://"
        )));
    }

    let bucket = |key: &str, default: &str| {
        normalize_text_option(lookup(key)).unwrap_or_else(|| default.to_string())
    };

    Ok(Some(SupabaseConfig {
        url: url.trim_end_matches('/').to_string(),
        anon_key: anon_key.expect("validated above"),
        buckets: BucketNames {
            images: bucket(ENV_IMAGES_BUCKET, DEFAULT_IMAGES_BUCKET),
            listing_photos: bucket(ENV_LISTINGS_BUCKET, DEFAULT_LISTINGS_BUCKET),
            trade_proofs: bucket(ENV_PROOFS_BUCKET, DEFAULT_PROOFS_BUCKET),
            community_photos: bucket(ENV_COMMUNITY_BUCKET, DEFAULT_COMMUNITY_BUCKET),
        },
        request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
    }))
}

/// Whether trade completion is gated on proof photos.
///
/// The product has not settled whether the requirement is global or
/// per-category, so both are expressible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofRequirement {
    Always,
    Never,
    Categories(HashSet<String>),
}

impl ProofRequirement {
    /// Whether a listing in `category` requires proof photos.
    #[must_use]
    pub fn applies_to(&self, category: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Categories(set) => set.contains(category),
        }
    }
}

/// Tunables shared by the sync engine, upload pipeline, proximity matcher
/// and trade resolver. Plain data, injected at construction.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Backoff policy for transient remote failures
    pub retry: RetryPolicy,
    /// Proximity search radius in kilometers
    pub proximity_radius_km: f64,
    /// Oldest acceptable location fix for proximity ranking
    pub location_max_age: Duration,
    /// Window for proof upload / dispute flagging after acceptance
    pub proof_grace_window: Duration,
    /// Proof-photo policy
    pub proof_requirement: ProofRequirement,
    /// Concurrent uploads per bucket
    pub uploads_per_bucket: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            proximity_radius_km: 10.0,
            location_max_age: Duration::from_secs(5 * 60),
            proof_grace_window: Duration::from_secs(48 * 60 * 60),
            proof_requirement: ProofRequirement::Always,
            uploads_per_bucket: 2,
        }
    }
}
