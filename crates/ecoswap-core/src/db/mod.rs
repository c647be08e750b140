//! Local cache store for EcoSwap

mod connection;
mod conflict_repository;
mod cursor_repository;
mod listing_repository;
mod migrations;
mod photo_queue;
mod trade_repository;

use std::sync::Arc;

pub use connection::Database;
pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use cursor_repository::{CursorRepository, SqliteCursorRepository};
pub use listing_repository::{ListingRepository, SqliteListingRepository};
pub use photo_queue::{PhotoQueueRepository, SqlitePhotoQueueRepository};
pub use trade_repository::{SqliteTradeRepository, TradeRepository};

/// Shared handle to the local cache.
///
/// The tokio mutex serializes writers across the sync engine, upload
/// pipeline and trade resolver; repository calls are short critical
/// sections and the lock is never held across a network await.
pub type SharedDatabase = Arc<tokio::sync::Mutex<Database>>;

/// Wrap a database for sharing across async components.
#[must_use]
pub fn shared(database: Database) -> SharedDatabase {
    Arc::new(tokio::sync::Mutex::new(database))
}

/// A stored id failed to parse: surface the corrupt row instead of
/// minting a phantom identity.
pub(crate) fn corrupt_id(column: usize, error: uuid::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}
