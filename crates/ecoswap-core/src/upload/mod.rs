//! Background photo upload pipeline.
//!
//! Assets wait in the durable local queue (`photo_assets`) and are
//! drained per bucket with bounded concurrency. Transient failures back
//! off and requeue; exhausted or permanent failures park the asset in
//! `Failed` until the user retries. A successful upload attaches the
//! public URL to the owning entity and marks it dirty exactly once, so
//! the next sync cycle propagates it.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::SyncSettings;
use crate::db::{
    ListingRepository, PhotoQueueRepository, SharedDatabase, SqliteListingRepository,
    SqlitePhotoQueueRepository, SqliteTradeRepository, TradeRepository,
};
use crate::error::{Error, Result};
use crate::models::{Bucket, PhotoAsset, PhotoAssetId};
use crate::remote::RemoteClient;
use crate::sync::RetryPolicy;
use crate::util::{now_ms, sanitize_token};

/// Counters for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Assets uploaded and acknowledged
    pub uploaded: usize,
    /// Assets parked in `Failed`
    pub failed: usize,
}

enum Attempt {
    Uploaded,
    Requeued,
    Failed,
}

/// Per-bucket upload pump over the durable photo queue.
pub struct UploadPipeline<R: RemoteClient> {
    remote: Arc<R>,
    store: SharedDatabase,
    settings: SyncSettings,
}

impl<R: RemoteClient + 'static> UploadPipeline<R> {
    /// Create a pipeline over a shared local cache.
    pub fn new(remote: R, store: SharedDatabase, settings: SyncSettings) -> Self {
        Self {
            remote: Arc::new(remote),
            store,
            settings,
        }
    }

    /// Queue a local photo for upload. The asset is durable immediately;
    /// nothing is sent until [`drain`](Self::drain) runs.
    pub async fn enqueue_upload(
        &self,
        entity_id: &str,
        bucket: Bucket,
        local_path: &str,
        party_id: Option<String>,
    ) -> Result<PhotoAsset> {
        let asset = PhotoAsset::new(entity_id, bucket, local_path, party_id)?;
        let db = self.store.lock().await;
        SqlitePhotoQueueRepository::new(db.connection()).enqueue(&asset)?;
        tracing::debug!(id = %asset.id, bucket = bucket.as_str(), "photo queued for upload");
        Ok(asset)
    }

    /// Requeue assets stranded in `Uploading` by a crash. Call once at
    /// startup, before the first drain.
    pub async fn recover(&self) -> Result<usize> {
        let db = self.store.lock().await;
        let recovered = SqlitePhotoQueueRepository::new(db.connection()).recover_interrupted()?;
        if recovered > 0 {
            tracing::info!(recovered, "requeued uploads interrupted by shutdown");
        }
        Ok(recovered)
    }

    /// Put a failed asset back in the queue (user-initiated retry).
    pub async fn retry_failed(&self, id: &PhotoAssetId) -> Result<()> {
        let db = self.store.lock().await;
        SqlitePhotoQueueRepository::new(db.connection()).retry_failed(id)
    }

    /// Drain every bucket's queue to completion.
    ///
    /// Buckets drain in parallel, each with at most
    /// `settings.uploads_per_bucket` concurrent uploads.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut join = JoinSet::new();
        for bucket in Bucket::ALL {
            let workers = self.settings.uploads_per_bucket.max(1);
            for _ in 0..workers {
                join.spawn(Self::worker(
                    Arc::clone(&self.remote),
                    Arc::clone(&self.store),
                    self.settings.retry.clone(),
                    bucket,
                ));
            }
        }

        let mut report = DrainReport::default();
        while let Some(result) = join.join_next().await {
            let (uploaded, failed) =
                result.map_err(|error| Error::Storage(format!("upload worker panicked: {error}")))??;
            report.uploaded += uploaded;
            report.failed += failed;
        }
        Ok(report)
    }

    /// Claim-and-upload loop; exits when the bucket queue is empty.
    async fn worker(
        remote: Arc<R>,
        store: SharedDatabase,
        retry: RetryPolicy,
        bucket: Bucket,
    ) -> Result<(usize, usize)> {
        let mut uploaded = 0;
        let mut failed = 0;

        loop {
            let claimed = {
                let db = store.lock().await;
                SqlitePhotoQueueRepository::new(db.connection()).claim_next(bucket)?
            };
            let Some(asset) = claimed else { break };

            match Self::upload_one(&remote, &store, &retry, asset).await? {
                Attempt::Uploaded => uploaded += 1,
                Attempt::Failed => failed += 1,
                Attempt::Requeued => {}
            }
        }
        Ok((uploaded, failed))
    }

    /// One upload attempt for a claimed asset.
    async fn upload_one(
        remote: &Arc<R>,
        store: &SharedDatabase,
        retry: &RetryPolicy,
        asset: PhotoAsset,
    ) -> Result<Attempt> {
        let bytes = match tokio::fs::read(&asset.local_path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(id = %asset.id, path = %asset.local_path, %error,
                    "photo file unreadable, marking failed");
                let db = store.lock().await;
                SqlitePhotoQueueRepository::new(db.connection()).mark_failed(&asset.id)?;
                return Ok(Attempt::Failed);
            }
        };

        let key = object_key(&asset);
        match remote
            .upload_object(asset.bucket, &key, bytes, Some("image/jpeg"))
            .await
        {
            Ok(url) => {
                let db = store.lock().await;
                let conn = db.connection();
                SqlitePhotoQueueRepository::new(conn).mark_uploaded(&asset.id, &url)?;
                attach_to_owner(conn, &asset, &url)?;
                tracing::info!(id = %asset.id, bucket = asset.bucket.as_str(), "photo uploaded");
                Ok(Attempt::Uploaded)
            }
            Err(error) if error.is_retryable() => {
                let failures = u32::try_from(asset.retry_count).unwrap_or(u32::MAX);
                if retry.allows_retry(failures) {
                    // Back off while still holding the claim, then hand
                    // the asset back to the queue.
                    tokio::time::sleep(retry.delay_for(failures)).await;
                    let db = store.lock().await;
                    SqlitePhotoQueueRepository::new(db.connection())
                        .requeue(&asset.id, asset.retry_count + 1)?;
                    Ok(Attempt::Requeued)
                } else {
                    tracing::warn!(id = %asset.id, %error, "upload retries exhausted");
                    let db = store.lock().await;
                    SqlitePhotoQueueRepository::new(db.connection()).mark_failed(&asset.id)?;
                    Ok(Attempt::Failed)
                }
            }
            Err(error) => {
                tracing::warn!(id = %asset.id, %error, "upload rejected, marking failed");
                let db = store.lock().await;
                SqlitePhotoQueueRepository::new(db.connection()).mark_failed(&asset.id)?;
                Ok(Attempt::Failed)
            }
        }
    }
}

/// Deterministic object key for an asset.
///
/// Proof photos are namespaced per submitting party so both parties'
/// proofs coexist under one trade.
fn object_key(asset: &PhotoAsset) -> String {
    let entity = sanitize_token(&asset.entity_id);
    match &asset.party_id {
        Some(party) => format!("{entity}/{}/photo_{}.jpg", sanitize_token(party), asset.id),
        None => format!("{entity}/photo_{}.jpg", asset.id),
    }
}

/// Attach the public URL to the owning entity and mark it dirty.
///
/// Runs exactly once per asset: `mark_uploaded` only succeeds from the
/// `Uploading` state, and `Uploaded` is terminal.
fn attach_to_owner(conn: &rusqlite::Connection, asset: &PhotoAsset, url: &str) -> Result<()> {
    match asset.bucket {
        Bucket::ListingPhotos => {
            let repo = SqliteListingRepository::new(conn);
            if let Ok(id) = asset.entity_id.parse() {
                if let Some(mut listing) = repo.get(&id)? {
                    if !listing.photo_urls.contains(&url.to_string()) {
                        listing.photo_urls.push(url.to_string());
                        listing.touch_local();
                        repo.save_local(&listing)?;
                    }
                }
            }
        }
        Bucket::TradeProofs => {
            let Some(party) = &asset.party_id else {
                tracing::warn!(id = %asset.id, "proof upload without a party, not attached");
                return Ok(());
            };
            let repo = SqliteTradeRepository::new(conn);
            if let Ok(id) = asset.entity_id.parse() {
                if let Some(mut trade) = repo.get(&id)? {
                    if trade.add_proof_url(party, url) {
                        trade.updated_at = now_ms();
                        trade.is_dirty = true;
                        repo.save_local(&trade)?;
                    }
                }
            }
        }
        // No locally cached owner for general or community imagery.
        Bucket::Images | Bucket::CommunityPhotos => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{shared, Database, SqliteListingRepository};
    use crate::models::{Listing, Trade, UploadState};
    use crate::remote::mock::MockRemote;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    fn settings(max_attempts: u32) -> SyncSettings {
        SyncSettings {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            ..SyncSettings::default()
        }
    }

    fn photo_file(dir: &tempfile::TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"jpeg-bytes").unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn pipeline(
        max_attempts: u32,
    ) -> (
        Arc<MockRemote>,
        SharedDatabase,
        UploadPipeline<Arc<MockRemote>>,
    ) {
        let remote = Arc::new(MockRemote::default());
        let store = shared(Database::open_in_memory().unwrap());
        let pipeline = UploadPipeline::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            settings(max_attempts),
        );
        (remote, store, pipeline)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drain_uploads_and_attaches_to_listing() {
        let (remote, store, pipeline) = pipeline(3).await;
        let dir = tempfile::tempdir().unwrap();

        let listing = Listing::new("owner-1", "Bike", "City bike", "sports");
        {
            let db = store.lock().await;
            SqliteListingRepository::new(db.connection())
                .apply_remote(&listing, 100)
                .unwrap();
        }

        let asset = pipeline
            .enqueue_upload(
                &listing.id.as_str(),
                Bucket::ListingPhotos,
                &photo_file(&dir, "a.jpg"),
                None,
            )
            .await
            .unwrap();

        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport { uploaded: 1, failed: 0 });
        assert_eq!(remote.uploads().len(), 1);

        let db = store.lock().await;
        let conn = db.connection();
        let stored = SqlitePhotoQueueRepository::new(conn)
            .get(&asset.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, UploadState::Uploaded);
        let url = stored.remote_url.unwrap();
        assert!(url.contains("listing-photos"));

        // The owning listing picked up the URL and is waiting to sync.
        let cached = SqliteListingRepository::new(conn)
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.photo_urls, vec![url]);
        assert!(cached.is_dirty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failures_requeue_then_succeed() {
        let (remote, store, pipeline) = pipeline(4).await;
        let dir = tempfile::tempdir().unwrap();

        let listing = Listing::new("owner-1", "Bike", "City bike", "sports");
        {
            let db = store.lock().await;
            SqliteListingRepository::new(db.connection())
                .apply_remote(&listing, 100)
                .unwrap();
        }
        remote.fail_next_upload(Error::Unavailable("503".to_string()));
        remote.fail_next_upload(Error::Unavailable("503".to_string()));

        let asset = pipeline
            .enqueue_upload(
                &listing.id.as_str(),
                Bucket::ListingPhotos,
                &photo_file(&dir, "a.jpg"),
                None,
            )
            .await
            .unwrap();

        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport { uploaded: 1, failed: 0 });

        let db = store.lock().await;
        let conn = db.connection();
        let stored = SqlitePhotoQueueRepository::new(conn)
            .get(&asset.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, UploadState::Uploaded);
        assert_eq!(stored.retry_count, 2);

        // Dirty exactly once: a single URL despite the retries.
        let cached = SqliteListingRepository::new(conn)
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.photo_urls.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_retries_park_failed_until_user_retry() {
        let (remote, store, pipeline) = pipeline(2).await;
        let dir = tempfile::tempdir().unwrap();

        remote.fail_next_upload(Error::Unavailable("503".to_string()));
        remote.fail_next_upload(Error::Unavailable("503".to_string()));

        let asset = pipeline
            .enqueue_upload(
                "post-1",
                Bucket::CommunityPhotos,
                &photo_file(&dir, "a.jpg"),
                None,
            )
            .await
            .unwrap();

        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport { uploaded: 0, failed: 1 });
        {
            let db = store.lock().await;
            let stored = SqlitePhotoQueueRepository::new(db.connection())
                .get(&asset.id)
                .unwrap()
                .unwrap();
            assert_eq!(stored.state, UploadState::Failed);
        }

        // A user retry requeues and the next drain succeeds.
        pipeline.retry_failed(&asset.id).await.unwrap();
        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport { uploaded: 1, failed: 0 });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn uploaded_assets_are_never_resent() {
        let (remote, _store, pipeline) = pipeline(3).await;
        let dir = tempfile::tempdir().unwrap();

        pipeline
            .enqueue_upload("post-1", Bucket::Images, &photo_file(&dir, "a.jpg"), None)
            .await
            .unwrap();

        pipeline.drain().await.unwrap();
        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(remote.uploads().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_file_fails_without_remote_call() {
        let (remote, store, pipeline) = pipeline(3).await;

        let asset = pipeline
            .enqueue_upload("post-1", Bucket::Images, "/nonexistent/a.jpg", None)
            .await
            .unwrap();

        let report = pipeline.drain().await.unwrap();
        assert_eq!(report, DrainReport { uploaded: 0, failed: 1 });
        assert!(remote.uploads().is_empty());

        let db = store.lock().await;
        let stored = SqlitePhotoQueueRepository::new(db.connection())
            .get(&asset.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, UploadState::Failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn proof_uploads_record_the_party_and_touch_the_trade() {
        let (remote, store, pipeline) = pipeline(3).await;
        let dir = tempfile::tempdir().unwrap();

        let mut trade = Trade::new(crate::models::ListingId::new(), "alice", "bob", true);
        trade.version = 1;
        {
            let db = store.lock().await;
            SqliteTradeRepository::new(db.connection())
                .apply_remote(&trade, 100)
                .unwrap();
        }

        pipeline
            .enqueue_upload(
                &trade.id.as_str(),
                Bucket::TradeProofs,
                &photo_file(&dir, "proof.jpg"),
                Some("alice".to_string()),
            )
            .await
            .unwrap();
        pipeline.drain().await.unwrap();

        let db = store.lock().await;
        let conn = db.connection();
        let parties = SqlitePhotoQueueRepository::new(conn)
            .uploaded_proof_parties(&trade.id.as_str())
            .unwrap();
        assert_eq!(parties, vec!["alice".to_string()]);

        let cached = SqliteTradeRepository::new(conn)
            .get(&trade.id)
            .unwrap()
            .unwrap();
        assert!(cached.is_dirty);

        // The proof reference landed on the trade record itself, so the
        // next push carries it to the remote store.
        let url = cached.proof_urls["alice"][0].clone();
        assert!(url.contains("trade-proofs"));
        let record = crate::remote::RemoteRecord::from_trade(&cached).unwrap();
        assert_eq!(
            record.fields["proof_urls"]["alice"][0],
            serde_json::json!(url)
        );

        // Party-scoped object keys keep both parties' proofs apart.
        let (_, key) = remote.uploads().remove(0);
        assert!(key.contains("/alice/"));
    }
}
