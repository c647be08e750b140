use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ecoswap")]
#[command(about = "Local-first sync engine for the EcoSwap marketplace")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage marketplace listings
    Listing {
        #[command(subcommand)]
        command: ListingCommands,
    },
    /// Run a sync cycle against the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Manage the photo upload queue
    Uploads {
        #[command(subcommand)]
        command: UploadCommands,
    },
    /// Drive trades through their lifecycle
    Trade {
        #[command(subcommand)]
        command: TradeCommands,
    },
    /// Rank cached listings around a location
    Nearby {
        /// Device latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Device longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Search radius in kilometers
        #[arg(long, default_value = "10")]
        radius: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show local cache and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ListingCommands {
    /// Create a new listing (dirty until pushed)
    Add {
        /// Owning user id
        #[arg(long)]
        owner: String,
        /// Listing title
        #[arg(long)]
        title: String,
        /// Listing description
        #[arg(long)]
        description: String,
        /// Category name
        #[arg(long)]
        category: String,
        /// Optional pickup latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Optional pickup longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// List cached listings, newest first
    List {
        /// Number of listings to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete a listing
    Remove {
        /// Listing id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently recorded sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum UploadCommands {
    /// Queue a photo for upload
    Add {
        /// Owning entity id (listing, trade or post id)
        entity_id: String,
        /// Destination bucket: images, listing-photos, trade-proofs, community-photos
        #[arg(long)]
        bucket: String,
        /// Path to the local image file
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        /// Submitting party (trade proofs only)
        #[arg(long)]
        party: Option<String>,
    },
    /// Drain the queue to the remote store
    Drain,
    /// Requeue a failed upload
    Retry {
        /// Photo asset id
        id: String,
    },
    /// List queued/failed assets
    List {
        /// Filter by state: queued, uploading, uploaded, failed
        #[arg(long, default_value = "queued")]
        state: String,
        /// Number of assets to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TradeCommands {
    /// Propose a trade on an active listing
    Propose {
        /// Listing id
        listing_id: String,
        /// Proposing user id
        #[arg(long)]
        proposer: String,
    },
    /// Accept a proposal (responder only)
    Accept {
        /// Trade id
        id: String,
        /// Acting user id
        #[arg(long)]
        actor: String,
    },
    /// Decline a proposal (responder only)
    Decline {
        /// Trade id
        id: String,
        /// Acting user id
        #[arg(long)]
        actor: String,
    },
    /// Withdraw a proposal (proposer only)
    Withdraw {
        /// Trade id
        id: String,
        /// Acting user id
        #[arg(long)]
        actor: String,
    },
    /// Complete a proof-gated trade once both parties uploaded proof
    Complete {
        /// Trade id
        id: String,
    },
    /// Flag a swap within the grace window
    Dispute {
        /// Trade id
        id: String,
        /// Acting user id
        #[arg(long)]
        actor: String,
    },
    /// Expire or complete trades with overdue proof windows
    Sweep,
    /// List trades for a listing
    List {
        /// Listing id
        listing_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
