use ecoswap_core::db::{ConflictRepository, SharedDatabase, SqliteConflictRepository};
use ecoswap_core::sync::SyncEngine;

use crate::commands::common::{conflict_to_item, format_conflict_lines, remote_client, settings};
use crate::error::CliError;

pub async fn run(store: SharedDatabase) -> Result<(), CliError> {
    let remote = remote_client()?;
    let engine = SyncEngine::new(remote, store, settings().retry);

    let outcome = engine.run_cycle().await?;

    println!(
        "Sync complete: pulled {}, pushed {}, merged {}, conflicts {}",
        outcome.pulled, outcome.pushed, outcome.merged, outcome.conflicts
    );
    if outcome.degraded {
        println!("Remote store was unreachable for part of the cycle; run again later.");
    }
    if outcome.conflicts > 0 {
        println!("See `ecoswap sync conflicts` for details.");
    }
    Ok(())
}

pub async fn conflicts(store: &SharedDatabase, limit: usize, json: bool) -> Result<(), CliError> {
    let conflicts = {
        let db = store.lock().await;
        SqliteConflictRepository::new(db.connection()).list_recent(limit)?
    };

    if json {
        let items: Vec<_> = conflicts.iter().map(conflict_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
