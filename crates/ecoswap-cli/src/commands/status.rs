use ecoswap_core::db::{
    CursorRepository, ListingRepository, PhotoQueueRepository, SharedDatabase,
    SqliteCursorRepository, SqliteListingRepository, SqlitePhotoQueueRepository,
    SqliteTradeRepository, TradeRepository,
};
use ecoswap_core::models::{Bucket, EntityTable, UploadState};
use serde::Serialize;

use crate::commands::common::format_timestamp;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    dirty_listings: usize,
    dirty_trades: usize,
    cursors: Vec<CursorStatus>,
    pending_uploads: Vec<BucketStatus>,
    failed_uploads: usize,
}

#[derive(Debug, Serialize)]
struct CursorStatus {
    table: String,
    last_synced_at: i64,
}

#[derive(Debug, Serialize)]
struct BucketStatus {
    bucket: String,
    pending: i64,
}

pub async fn run(store: &SharedDatabase, json: bool) -> Result<(), CliError> {
    let report = {
        let db = store.lock().await;
        let conn = db.connection();
        let listings = SqliteListingRepository::new(conn);
        let trades = SqliteTradeRepository::new(conn);
        let cursors = SqliteCursorRepository::new(conn);
        let queue = SqlitePhotoQueueRepository::new(conn);

        let mut cursor_statuses = Vec::with_capacity(EntityTable::ALL.len());
        for table in EntityTable::ALL {
            let cursor = cursors.get(table)?;
            cursor_statuses.push(CursorStatus {
                table: table.as_str().to_string(),
                last_synced_at: cursor.last_synced_at,
            });
        }

        let mut bucket_statuses = Vec::with_capacity(Bucket::ALL.len());
        for bucket in Bucket::ALL {
            bucket_statuses.push(BucketStatus {
                bucket: bucket.as_str().to_string(),
                pending: queue.pending_count(bucket)?,
            });
        }

        StatusReport {
            dirty_listings: listings.list_dirty()?.len(),
            dirty_trades: trades.list_dirty()?.len(),
            cursors: cursor_statuses,
            pending_uploads: bucket_statuses,
            failed_uploads: queue.list_by_state(UploadState::Failed, 10_000)?.len(),
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Pending push: {} listings, {} trades",
        report.dirty_listings, report.dirty_trades
    );
    for cursor in &report.cursors {
        if cursor.last_synced_at == 0 {
            println!("Cursor {:<10} never synced", cursor.table);
        } else {
            println!(
                "Cursor {:<10} {}",
                cursor.table,
                format_timestamp(cursor.last_synced_at)
            );
        }
    }
    for bucket in &report.pending_uploads {
        if bucket.pending > 0 {
            println!("Uploads {:<18} {} pending", bucket.bucket, bucket.pending);
        }
    }
    if report.failed_uploads > 0 {
        println!(
            "{} failed uploads parked; see `ecoswap uploads list --state failed`",
            report.failed_uploads
        );
    }
    Ok(())
}
