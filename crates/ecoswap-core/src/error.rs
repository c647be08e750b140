//! Error types for ecoswap-core

use thiserror::Error;

/// Result type alias using ecoswap-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ecoswap-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Session credentials are missing, invalid, or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Entity not found (locally or remotely)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend asked us to back off
    #[error("Rate limited by remote: {0}")]
    RateLimited(String),

    /// Transient network or server fault, retryable
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// Remote version is newer than the pushed record
    #[error("Version conflict on {table}/{id}")]
    Conflict { table: String, id: String },

    /// Both sides changed the same field; manual resolution required
    #[error("Sync conflict on {table}/{id}: field '{field}' changed on both sides")]
    SyncConflict {
        table: String,
        id: String,
        field: String,
    },

    /// Requested trade transition is not legal from the current state
    #[error("Illegal transition from '{from}' via '{event}'")]
    IllegalTransition { from: String, event: String },

    /// Device location fix is too old for proximity ranking
    #[error("Location fix is stale ({age_ms} ms old, max {max_age_ms} ms)")]
    StaleLocation { age_ms: i64, max_age_ms: i64 },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object storage error (non-retryable upload rejection)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether a retry with backoff may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_transient_variants_only() {
        assert!(Error::Unavailable("503".into()).is_retryable());
        assert!(Error::RateLimited("429".into()).is_retryable());
        assert!(!Error::Unauthorized("expired".into()).is_retryable());
        assert!(!Error::NotFound("listing".into()).is_retryable());
        assert!(!Error::Conflict {
            table: "listings".into(),
            id: "x".into()
        }
        .is_retryable());
    }
}
