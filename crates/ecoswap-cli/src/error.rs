use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ecoswap_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error(
        "Remote sync is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY to enable `ecoswap sync` and `ecoswap uploads drain`."
    )]
    RemoteNotConfigured,
}
