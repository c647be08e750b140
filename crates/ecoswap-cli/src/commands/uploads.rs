use std::path::Path;

use ecoswap_core::db::{PhotoQueueRepository, SharedDatabase, SqlitePhotoQueueRepository};
use ecoswap_core::models::{Bucket, PhotoAsset, UploadState};
use ecoswap_core::upload::UploadPipeline;
use ecoswap_core::Error;

use crate::commands::common::{asset_to_item, format_asset_lines, parse_asset_id, remote_client, settings};
use crate::error::CliError;

pub async fn add(
    store: &SharedDatabase,
    entity_id: &str,
    bucket: &str,
    file: &Path,
    party: Option<String>,
) -> Result<(), CliError> {
    let bucket = Bucket::parse(bucket).ok_or_else(|| {
        CliError::Core(Error::InvalidInput(format!(
            "Unknown bucket '{bucket}'. Expected one of: images, listing-photos, trade-proofs, community-photos."
        )))
    })?;

    if bucket == Bucket::TradeProofs && party.is_none() {
        return Err(CliError::Core(Error::InvalidInput(
            "Trade proof uploads need --party to name the submitting side".to_string(),
        )));
    }

    let asset = PhotoAsset::new(entity_id, bucket, file.to_string_lossy(), party)?;
    {
        let db = store.lock().await;
        SqlitePhotoQueueRepository::new(db.connection()).enqueue(&asset)?;
    }

    println!(
        "Queued photo {} for {} (drain with `ecoswap uploads drain`)",
        asset.id,
        bucket.as_str()
    );
    Ok(())
}

pub async fn drain(store: SharedDatabase) -> Result<(), CliError> {
    let remote = remote_client()?;
    let pipeline = UploadPipeline::new(remote, store, settings());

    let recovered = pipeline.recover().await?;
    if recovered > 0 {
        println!("Requeued {recovered} uploads interrupted by a previous run.");
    }

    let report = pipeline.drain().await?;
    println!(
        "Drain complete: {} uploaded, {} failed",
        report.uploaded, report.failed
    );
    if report.failed > 0 {
        println!("Failed uploads stay parked; requeue one with `ecoswap uploads retry <id>`.");
    }
    Ok(())
}

pub async fn retry(store: &SharedDatabase, id: &str) -> Result<(), CliError> {
    let asset_id = parse_asset_id(id)?;

    {
        let db = store.lock().await;
        SqlitePhotoQueueRepository::new(db.connection()).retry_failed(&asset_id)?;
    }

    println!("Requeued photo {asset_id}");
    Ok(())
}

pub async fn list(
    store: &SharedDatabase,
    state: &str,
    limit: usize,
    json: bool,
) -> Result<(), CliError> {
    let state = UploadState::parse(state).ok_or_else(|| {
        CliError::Core(Error::InvalidInput(format!(
            "Unknown upload state '{state}'. Expected one of: queued, uploading, uploaded, failed."
        )))
    })?;

    let assets = {
        let db = store.lock().await;
        SqlitePhotoQueueRepository::new(db.connection()).list_by_state(state, limit)?
    };

    if json {
        let items: Vec<_> = assets.iter().map(asset_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if assets.is_empty() {
        println!("No {} uploads.", state.as_str());
        return Ok(());
    }

    for line in format_asset_lines(&assets) {
        println!("{line}");
    }
    Ok(())
}
