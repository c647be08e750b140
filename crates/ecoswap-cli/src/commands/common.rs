use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ecoswap_core::config::{SupabaseConfig, SyncSettings};
use ecoswap_core::db::{shared, Database, SharedDatabase};
use ecoswap_core::models::{Listing, ListingId, PhotoAsset, PhotoAssetId, SyncConflict, TradeId};
use ecoswap_core::remote::SupabaseClient;
use ecoswap_core::Trade;
use serde::Serialize;

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("ECOSWAP_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ecoswap")
        .join("ecoswap.db")
}

pub fn open_store(path: &Path) -> Result<SharedDatabase, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), "opening local cache");
    Ok(shared(Database::open(path)?))
}

/// Build the Supabase client from the environment, or explain how to.
pub fn remote_client() -> Result<SupabaseClient, CliError> {
    let Some(config) = SupabaseConfig::from_env()? else {
        return Err(CliError::RemoteNotConfigured);
    };
    Ok(SupabaseClient::new(config)?)
}

pub fn settings() -> SyncSettings {
    SyncSettings::default()
}

pub fn parse_listing_id(id: &str) -> Result<ListingId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

pub fn parse_trade_id(id: &str) -> Result<TradeId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

pub fn parse_asset_id(id: &str) -> Result<PhotoAssetId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

#[derive(Debug, Serialize)]
pub struct ListingItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub photo_urls: Vec<String>,
    pub version: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub dirty: bool,
}

pub fn listing_to_item(listing: &Listing) -> ListingItem {
    let now_ms = Utc::now().timestamp_millis();
    ListingItem {
        id: listing.id.to_string(),
        title: listing.title.clone(),
        category: listing.category.clone(),
        status: listing.status.as_str().to_string(),
        photo_urls: listing.photo_urls.clone(),
        version: listing.version,
        updated_at: listing.updated_at,
        relative_time: format_relative_time(listing.updated_at, now_ms),
        dirty: listing.is_dirty,
    }
}

pub fn format_listing_lines(listings: &[Listing]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    listings
        .iter()
        .map(|listing| {
            let id = listing.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if listing.is_dirty { "*" } else { " " };
            let relative_time = format_relative_time(listing.updated_at, now_ms);

            format!(
                "{short_id:<13}{marker} {:<28} {:<14} {relative_time}",
                truncate(&listing.title, 28),
                listing.status.as_str(),
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct TradeItem {
    pub id: String,
    pub listing_id: String,
    pub proposer_id: String,
    pub responder_id: String,
    pub state: String,
    pub proof_required: bool,
    pub grace_deadline: Option<i64>,
    pub updated_at: i64,
    pub dirty: bool,
}

pub fn trade_to_item(trade: &Trade) -> TradeItem {
    TradeItem {
        id: trade.id.to_string(),
        listing_id: trade.listing_id.to_string(),
        proposer_id: trade.proposer_id.clone(),
        responder_id: trade.responder_id.clone(),
        state: trade.state.as_str().to_string(),
        proof_required: trade.proof_required,
        grace_deadline: trade.grace_deadline,
        updated_at: trade.updated_at,
        dirty: trade.is_dirty,
    }
}

pub fn format_trade_lines(trades: &[Trade]) -> Vec<String> {
    trades
        .iter()
        .map(|trade| {
            let id = trade.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let deadline = trade
                .grace_deadline
                .map_or_else(|| "-".to_string(), format_timestamp);

            format!(
                "{short_id:<13}  {:<15} {} <-> {}  deadline={deadline}",
                trade.state.as_str(),
                trade.proposer_id,
                trade.responder_id,
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct AssetItem {
    pub id: String,
    pub entity_id: String,
    pub bucket: String,
    pub state: String,
    pub retry_count: i64,
    pub local_path: String,
    pub remote_url: Option<String>,
}

pub fn asset_to_item(asset: &PhotoAsset) -> AssetItem {
    AssetItem {
        id: asset.id.to_string(),
        entity_id: asset.entity_id.clone(),
        bucket: asset.bucket.as_str().to_string(),
        state: asset.state.as_str().to_string(),
        retry_count: asset.retry_count,
        local_path: asset.local_path.clone(),
        remote_url: asset.remote_url.clone(),
    }
}

pub fn format_asset_lines(assets: &[PhotoAsset]) -> Vec<String> {
    assets
        .iter()
        .map(|asset| {
            let id = asset.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            format!(
                "{short_id:<13}  {:<16} {:<10} retries={}  {}",
                asset.bucket.as_str(),
                asset.state.as_str(),
                asset.retry_count,
                asset.local_path,
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub table: String,
    pub entity_id: String,
    pub field: String,
    pub strategy: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

pub fn conflict_to_item(conflict: &SyncConflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id,
        table: conflict.table_name.clone(),
        entity_id: conflict.entity_id.clone(),
        field: conflict.field.clone(),
        strategy: conflict.strategy.clone(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_timestamp(conflict.resolved_at),
    }
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<16} {}={}  field={}",
                format_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.table_name,
                conflict.entity_id,
                conflict.field,
            )
        })
        .collect()
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), CliError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(CliError::InvalidCoordinates(format!(
            "latitude {lat} is outside -90..=90"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(CliError::InvalidCoordinates(format!(
            "longitude {lon} is outside -180..=180"
        )));
    }
    Ok(())
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = text.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
