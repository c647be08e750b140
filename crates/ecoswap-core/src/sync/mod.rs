//! Delta synchronization between the local cache and the remote store.
//!
//! A sync cycle pulls remote changes first, then pushes local dirty
//! records. Pulls reconcile with last-writer-wins on version; pushes are
//! optimistic and fall back to a three-way merge (listings) or adopting
//! the remote copy (trades) when the remote moved first. The engine
//! never loses a local edit silently: anything it cannot reconcile lands
//! in the conflict ledger and stays dirty.

mod merge;
mod retry;

use std::future::Future;

use rusqlite::Connection;

pub use merge::{merge_listing, MergeOutcome};
pub use retry::RetryPolicy;

use crate::db::{
    ConflictRepository, CursorRepository, ListingRepository, SharedDatabase,
    SqliteConflictRepository, SqliteCursorRepository, SqliteListingRepository,
    SqliteTradeRepository, TradeRepository,
};
use crate::error::{Error, Result};
use crate::models::{sync_conflict_strategy, EntityTable, Listing, ListingStatus, Trade};
use crate::remote::{RemoteClient, RemoteRecord};
use crate::util::now_ms;

/// Counters for one sync cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Remote records applied locally
    pub pulled: usize,
    /// Local records accepted by the remote store
    pub pushed: usize,
    /// Push conflicts resolved by three-way merge
    pub merged: usize,
    /// Conflicts left for manual resolution (or logged LWW adoptions)
    pub conflicts: usize,
    /// Some work was deferred because the remote store was unreachable
    pub degraded: bool,
}

/// Pull-then-push synchronization engine.
pub struct SyncEngine<R: RemoteClient> {
    remote: R,
    store: SharedDatabase,
    retry: RetryPolicy,
}

impl<R: RemoteClient> SyncEngine<R> {
    /// Create an engine over a shared local cache.
    pub const fn new(remote: R, store: SharedDatabase, retry: RetryPolicy) -> Self {
        Self {
            remote,
            store,
            retry,
        }
    }

    /// Run one full cycle: pull every table, then push every table.
    ///
    /// Transient remote failures degrade the cycle instead of failing it;
    /// auth failures and local storage errors surface as errors.
    pub async fn run_cycle(&self) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();

        for table in EntityTable::ALL {
            self.pull_table(table, &mut outcome).await?;
        }
        self.push_listings(&mut outcome).await?;
        self.push_trades(&mut outcome).await?;

        tracing::info!(
            pulled = outcome.pulled,
            pushed = outcome.pushed,
            merged = outcome.merged,
            conflicts = outcome.conflicts,
            degraded = outcome.degraded,
            "sync cycle finished"
        );
        Ok(outcome)
    }

    async fn pull_table(&self, table: EntityTable, outcome: &mut SyncOutcome) -> Result<()> {
        let since = {
            let db = self.store.lock().await;
            SqliteCursorRepository::new(db.connection())
                .get(table)?
                .last_synced_at
        };

        let records = match self
            .with_retry(|| self.remote.fetch_delta(table, since))
            .await
        {
            Ok(records) => records,
            Err(error) if error.is_retryable() => {
                tracing::warn!(%table, %error, "pull deferred, remote unreachable");
                outcome.degraded = true;
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        for record in records {
            let watermark = record.updated_at;
            let db = self.store.lock().await;
            let conn = db.connection();

            let result = match table {
                EntityTable::Listings => apply_listing_record(conn, record),
                EntityTable::Trades => apply_trade_record(conn, record),
            };
            match result {
                Ok(true) => outcome.pulled += 1,
                Ok(false) => {}
                Err(error @ (Error::InvalidInput(_) | Error::Serialization(_))) => {
                    tracing::warn!(%table, %error, "skipping malformed remote record");
                }
                Err(error) => return Err(error),
            }

            // The cursor moves per processed record, so an interrupted
            // batch resumes where it stopped.
            SqliteCursorRepository::new(conn).advance(table, watermark)?;
        }
        Ok(())
    }

    async fn push_listings(&self, outcome: &mut SyncOutcome) -> Result<()> {
        let dirty = {
            let db = self.store.lock().await;
            SqliteListingRepository::new(db.connection()).list_dirty()?
        };

        for local in dirty {
            let mut candidate = local.clone();
            candidate.version += 1;
            let record = RemoteRecord::from_listing(&candidate)?;
            let key = push_key(&record.id, local.updated_at);

            match self
                .with_retry(|| self.remote.upsert(EntityTable::Listings, &record, &key))
                .await
            {
                Ok(ack) => {
                    let db = self.store.lock().await;
                    SqliteListingRepository::new(db.connection()).mark_synced(
                        &local.id,
                        ack.version,
                        ack.updated_at,
                        now_ms(),
                    )?;
                    outcome.pushed += 1;
                }
                Err(Error::Conflict { .. }) => {
                    self.resolve_listing_conflict(local, outcome).await?;
                }
                Err(Error::NotFound(_)) => {
                    self.adopt_remote_removal(&local).await?;
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!(id = %local.id, %error, "push deferred, remote unreachable");
                    outcome.degraded = true;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn push_trades(&self, outcome: &mut SyncOutcome) -> Result<()> {
        let dirty = {
            let db = self.store.lock().await;
            SqliteTradeRepository::new(db.connection()).list_dirty()?
        };

        for local in dirty {
            let mut candidate = local.clone();
            candidate.version += 1;
            let record = RemoteRecord::from_trade(&candidate)?;
            let key = push_key(&record.id, local.updated_at);

            match self
                .with_retry(|| self.remote.upsert(EntityTable::Trades, &record, &key))
                .await
            {
                Ok(ack) => {
                    let db = self.store.lock().await;
                    SqliteTradeRepository::new(db.connection()).mark_synced(
                        &local.id,
                        ack.version,
                        ack.updated_at,
                        now_ms(),
                    )?;
                    outcome.pushed += 1;
                }
                Err(Error::Conflict { .. } | Error::NotFound(_)) => {
                    self.resolve_trade_conflict(local, outcome).await?;
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!(id = %local.id, %error, "push deferred, remote unreachable");
                    outcome.degraded = true;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Reconcile a listing push conflict via three-way merge.
    async fn resolve_listing_conflict(
        &self,
        local: Listing,
        outcome: &mut SyncOutcome,
    ) -> Result<()> {
        let id = local.id.as_str();
        let remote = match self
            .with_retry(|| self.remote.fetch_record(EntityTable::Listings, &id))
            .await
        {
            Ok(remote) => remote,
            Err(error) if error.is_retryable() => {
                outcome.degraded = true;
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let Some(remote) = remote else {
            // Conflicted because the row is gone: deletion wins.
            return self.adopt_remote_removal(&local).await;
        };
        let remote = remote.into_listing()?;

        let base = {
            let db = self.store.lock().await;
            SqliteListingRepository::new(db.connection()).base_snapshot(&local.id)?
        };
        let Some(base) = base else {
            // No acknowledged common ancestor to merge against.
            let db = self.store.lock().await;
            SqliteConflictRepository::new(db.connection()).record(
                EntityTable::Listings.as_str(),
                &id,
                "record",
                &serde_json::to_string(&local)?,
                &serde_json::to_string(&remote)?,
                sync_conflict_strategy::MANUAL,
            )?;
            outcome.conflicts += 1;
            return Ok(());
        };

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Conflict {
                field,
                local_value,
                remote_value,
            } => {
                let db = self.store.lock().await;
                SqliteConflictRepository::new(db.connection()).record(
                    EntityTable::Listings.as_str(),
                    &id,
                    field,
                    &local_value,
                    &remote_value,
                    sync_conflict_strategy::MANUAL,
                )?;
                outcome.conflicts += 1;
                tracing::warn!(%id, field, "concurrent edit needs manual resolution");
            }
            MergeOutcome::Merged { local_fields, .. } if local_fields.is_empty() => {
                // The local edit converged with what the remote already
                // holds; adopt the remote copy.
                let db = self.store.lock().await;
                SqliteListingRepository::new(db.connection()).apply_remote(&remote, now_ms())?;
            }
            MergeOutcome::Merged {
                listing,
                local_fields,
            } => {
                self.push_merged_listing(&local, &remote, listing, &local_fields, outcome)
                    .await?;
            }
        }
        Ok(())
    }

    /// Push a successful merge back, recording the merged fields.
    async fn push_merged_listing(
        &self,
        local: &Listing,
        remote: &Listing,
        mut merged: Listing,
        local_fields: &[&'static str],
        outcome: &mut SyncOutcome,
    ) -> Result<()> {
        merged.version = remote.version + 1;
        merged.updated_at = now_ms();
        merged.is_dirty = true;
        {
            let db = self.store.lock().await;
            SqliteListingRepository::new(db.connection()).save_local(&merged)?;
        }

        let id = local.id.as_str();
        let record = RemoteRecord::from_listing(&merged)?;
        let key = push_key(&record.id, merged.updated_at);

        match self
            .with_retry(|| self.remote.upsert(EntityTable::Listings, &record, &key))
            .await
        {
            Ok(ack) => {
                let local_json = serde_json::to_value(local)?;
                let remote_json = serde_json::to_value(remote)?;

                let db = self.store.lock().await;
                let conn = db.connection();
                SqliteListingRepository::new(conn).mark_synced(
                    &local.id,
                    ack.version,
                    ack.updated_at,
                    now_ms(),
                )?;
                let conflicts = SqliteConflictRepository::new(conn);
                for field in local_fields {
                    conflicts.record(
                        EntityTable::Listings.as_str(),
                        &id,
                        field,
                        &json_field(&local_json, field),
                        &json_field(&remote_json, field),
                        sync_conflict_strategy::THREE_WAY_MERGE,
                    )?;
                }
                outcome.merged += 1;
                outcome.pushed += 1;
                tracing::info!(%id, ?local_fields, "push conflict resolved by merge");
            }
            Err(Error::Conflict { .. }) => {
                // Lost another race; the record stays dirty and the next
                // cycle merges against the newer remote state.
                tracing::warn!(%id, "merge push conflicted again, deferring");
            }
            Err(error) if error.is_retryable() => {
                outcome.degraded = true;
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Trades never field-merge: the remote copy wins and the adoption is
    /// logged to the conflict ledger.
    async fn resolve_trade_conflict(&self, local: Trade, outcome: &mut SyncOutcome) -> Result<()> {
        let id = local.id.as_str();
        let remote = match self
            .with_retry(|| self.remote.fetch_record(EntityTable::Trades, &id))
            .await
        {
            Ok(remote) => remote,
            Err(error) if error.is_retryable() => {
                outcome.degraded = true;
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let db = self.store.lock().await;
        let conn = db.connection();
        match remote {
            Some(record) => {
                let remote = record.into_trade()?;
                SqliteTradeRepository::new(conn).apply_remote(&remote, now_ms())?;
                SqliteConflictRepository::new(conn).record(
                    EntityTable::Trades.as_str(),
                    &id,
                    "state",
                    local.state.as_str(),
                    remote.state.as_str(),
                    sync_conflict_strategy::LWW,
                )?;
                outcome.conflicts += 1;
                tracing::warn!(%id, local = local.state.as_str(), remote = remote.state.as_str(),
                    "trade state conflict, remote copy adopted");
            }
            None => {
                SqliteConflictRepository::new(conn).record(
                    EntityTable::Trades.as_str(),
                    &id,
                    "record",
                    &serde_json::to_string(&local)?,
                    "null",
                    sync_conflict_strategy::MANUAL,
                )?;
                outcome.conflicts += 1;
            }
        }
        Ok(())
    }

    async fn adopt_remote_removal(&self, local: &Listing) -> Result<()> {
        let mut removed = local.clone();
        removed.status = ListingStatus::Removed;
        removed.updated_at = now_ms();

        let db = self.store.lock().await;
        SqliteListingRepository::new(db.connection()).apply_remote(&removed, now_ms())?;
        tracing::info!(id = %local.id, "listing deleted remotely, removed locally");
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && self.retry.allows_retry(failures) => {
                    let delay = self.retry.delay_for(failures);
                    tracing::warn!(%error, failures, delay_ms = delay.as_millis() as u64,
                        "remote call failed, backing off");
                    tokio::time::sleep(delay).await;
                    failures += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn push_key(id: &str, updated_at: i64) -> String {
    format!("{id}:{updated_at}")
}

fn json_field(value: &serde_json::Value, field: &str) -> String {
    value.get(field).map(ToString::to_string).unwrap_or_default()
}

/// Apply one pulled listing record. Returns whether it was written.
fn apply_listing_record(conn: &Connection, record: RemoteRecord) -> Result<bool> {
    let repo = SqliteListingRepository::new(conn);
    let deleted = record.deleted;
    let incoming = record.into_listing()?;
    let existing = repo.get(&incoming.id)?;

    let apply = match existing {
        None => true,
        // Soft deletes always win, even over pending local edits.
        Some(_) if deleted => true,
        // Dirty records are reconciled by the push path.
        Some(current) if current.is_dirty => false,
        Some(current) => incoming.version > current.version,
    };
    if apply {
        repo.apply_remote(&incoming, now_ms())?;
    }
    Ok(apply)
}

/// Apply one pulled trade record. Returns whether it was written.
fn apply_trade_record(conn: &Connection, record: RemoteRecord) -> Result<bool> {
    let repo = SqliteTradeRepository::new(conn);
    let incoming = record.into_trade()?;
    let existing = repo.get(&incoming.id)?;

    let apply = match existing {
        None => true,
        Some(current) if current.is_dirty => false,
        Some(current) => incoming.version > current.version,
    };
    if apply {
        repo.apply_remote(&incoming, now_ms())?;
    }
    Ok(apply)
}
