mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ListingCommands, SyncCommands, TradeCommands, UploadCommands};
use crate::commands::common::{open_store, resolve_db_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Env vars from a local .env are a convenience for development;
    // a missing file is not an error.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ecoswap=warn,ecoswap_core=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let db_path = resolve_db_path(cli.db_path);
    let store = open_store(&db_path)?;

    match cli.command {
        Commands::Listing { command } => match command {
            ListingCommands::Add {
                owner,
                title,
                description,
                category,
                lat,
                lon,
            } => {
                commands::listings::add(&store, &owner, &title, &description, &category, lat, lon)
                    .await
            }
            ListingCommands::List { limit, json } => {
                commands::listings::list(&store, limit, json).await
            }
            ListingCommands::Remove { id } => commands::listings::remove(&store, &id).await,
        },
        Commands::Sync { command } => match command {
            None => commands::sync::run(store).await,
            Some(SyncCommands::Conflicts { limit, json }) => {
                commands::sync::conflicts(&store, limit, json).await
            }
        },
        Commands::Uploads { command } => match command {
            UploadCommands::Add {
                entity_id,
                bucket,
                file,
                party,
            } => commands::uploads::add(&store, &entity_id, &bucket, &file, party).await,
            UploadCommands::Drain => commands::uploads::drain(store).await,
            UploadCommands::Retry { id } => commands::uploads::retry(&store, &id).await,
            UploadCommands::List { state, limit, json } => {
                commands::uploads::list(&store, &state, limit, json).await
            }
        },
        Commands::Trade { command } => match command {
            TradeCommands::Propose {
                listing_id,
                proposer,
            } => commands::trade::propose(store, &listing_id, &proposer).await,
            TradeCommands::Accept { id, actor } => commands::trade::accept(store, &id, &actor).await,
            TradeCommands::Decline { id, actor } => {
                commands::trade::decline(store, &id, &actor).await
            }
            TradeCommands::Withdraw { id, actor } => {
                commands::trade::withdraw(store, &id, &actor).await
            }
            TradeCommands::Complete { id } => commands::trade::complete(store, &id).await,
            TradeCommands::Dispute { id, actor } => {
                commands::trade::dispute(store, &id, &actor).await
            }
            TradeCommands::Sweep => commands::trade::sweep(store).await,
            TradeCommands::List { listing_id, json } => {
                commands::trade::list(&store, &listing_id, json).await
            }
        },
        Commands::Nearby {
            lat,
            lon,
            radius,
            json,
        } => commands::nearby::run(&store, lat, lon, radius, json).await,
        Commands::Status { json } => commands::status::run(&store, json).await,
    }
}
