//! Domain models for EcoSwap

mod cursor;
mod listing;
mod location;
mod photo_asset;
mod sync_conflict;
mod trade;

pub use cursor::{EntityTable, SyncCursor};
pub use listing::{Listing, ListingId, ListingLocation, ListingStatus};
pub use location::LocationFix;
pub use photo_asset::{Bucket, PhotoAsset, PhotoAssetId, UploadState};
pub use sync_conflict::{strategy as sync_conflict_strategy, SyncConflict};
pub use trade::{Trade, TradeId, TradeState};
