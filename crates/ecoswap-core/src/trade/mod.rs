//! Trade lifecycle: proposal through verified completion.
//!
//! The transition table is a pure function; the resolver wraps it with
//! actor checks, proof gating and local persistence. Every accepted
//! transition is written to the local cache before it is reported back,
//! so offline actions survive a restart and sync later.

use crate::config::SyncSettings;
use crate::db::{
    ListingRepository, PhotoQueueRepository, SharedDatabase, SqliteListingRepository,
    SqlitePhotoQueueRepository, SqliteTradeRepository, TradeRepository,
};
use crate::error::{Error, Result};
use crate::models::{ListingId, ListingStatus, Trade, TradeId, TradeState};
use crate::util::now_ms;

/// Events that drive the trade state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeEvent {
    /// Responder accepts the proposal
    Accept,
    /// Responder rejects the proposal
    Decline,
    /// Proposer cancels the proposal
    Withdraw,
    /// Acceptance opened a proof window
    RequireProof,
    /// Completion (directly after acceptance, or once proofs are in)
    Complete,
    /// A party flags the swap within the grace window
    Dispute,
    /// The grace window elapsed without full proof
    Expire,
}

impl TradeEvent {
    /// Stable string form, used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Withdraw => "withdraw",
            Self::RequireProof => "require-proof",
            Self::Complete => "complete",
            Self::Dispute => "dispute",
            Self::Expire => "expire",
        }
    }
}

/// The complete transition table.
///
/// Anything not listed is illegal and leaves the trade unchanged.
pub fn next_state(state: TradeState, event: TradeEvent) -> Result<TradeState> {
    use TradeEvent as E;
    use TradeState as S;

    match (state, event) {
        (S::Proposed, E::Accept) => Ok(S::Accepted),
        (S::Proposed, E::Decline) => Ok(S::Declined),
        (S::Proposed, E::Withdraw) => Ok(S::Withdrawn),
        (S::Accepted, E::RequireProof) => Ok(S::AwaitingProof),
        (S::Accepted, E::Complete) => Ok(S::Completed),
        (S::AwaitingProof, E::Complete) => Ok(S::Completed),
        (S::AwaitingProof, E::Dispute) => Ok(S::Disputed),
        (S::AwaitingProof, E::Expire) => Ok(S::Expired),
        (from, event) => Err(Error::IllegalTransition {
            from: from.as_str().to_string(),
            event: event.as_str().to_string(),
        }),
    }
}

/// Drives trades through their lifecycle against the local cache.
pub struct TradeResolver {
    store: SharedDatabase,
    settings: SyncSettings,
}

impl TradeResolver {
    /// Create a resolver over a shared local cache.
    pub const fn new(store: SharedDatabase, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    /// Propose a trade on an active listing.
    ///
    /// The proof requirement is stamped from the current policy and the
    /// listing's category; later policy changes do not affect trades
    /// already in flight. The listing leaves the marketplace feed.
    pub async fn propose(
        &self,
        listing_id: &ListingId,
        proposer_id: &str,
    ) -> Result<Trade> {
        let db = self.store.lock().await;
        let conn = db.connection();
        let listings = SqliteListingRepository::new(conn);

        let mut listing = listings
            .get(listing_id)?
            .ok_or_else(|| Error::NotFound(listing_id.to_string()))?;
        if listing.status != ListingStatus::Active {
            return Err(Error::InvalidInput(format!(
                "listing {listing_id} is not open for trade ({})",
                listing.status.as_str()
            )));
        }
        if listing.owner_id == proposer_id {
            return Err(Error::InvalidInput(
                "cannot propose a trade on your own listing".to_string(),
            ));
        }

        let proof_required = self.settings.proof_requirement.applies_to(&listing.category);
        let trade = Trade::new(*listing_id, proposer_id, &listing.owner_id, proof_required);

        SqliteTradeRepository::new(conn).insert(&trade)?;
        listing.status = ListingStatus::PendingTrade;
        listing.touch_local();
        listings.save_local(&listing)?;

        tracing::info!(trade = %trade.id, listing = %listing_id, proof_required,
            "trade proposed");
        Ok(trade)
    }

    /// Responder accepts. Opens the proof window when proofs are
    /// required, otherwise completes immediately.
    pub async fn accept(&self, trade_id: &TradeId, actor: &str) -> Result<Trade> {
        let now = now_ms();
        let db = self.store.lock().await;
        let conn = db.connection();
        let trades = SqliteTradeRepository::new(conn);

        let mut trade = self.load(conn, trade_id)?;
        let responder = trade.responder_id.clone();
        require_actor(&trade, actor, &responder, TradeEvent::Accept)?;

        trade.state = next_state(trade.state, TradeEvent::Accept)?;
        if trade.proof_required {
            trade.state = next_state(trade.state, TradeEvent::RequireProof)?;
            let window =
                i64::try_from(self.settings.proof_grace_window.as_millis()).unwrap_or(i64::MAX);
            trade.grace_deadline = Some(now + window);
        } else {
            trade.state = next_state(trade.state, TradeEvent::Complete)?;
            trade.resolved_at = Some(now);
            self.settle_listing(conn, &trade, ListingStatus::Completed)?;
        }
        trade.updated_at = now;
        trade.is_dirty = true;
        trades.save_local(&trade)?;

        tracing::info!(trade = %trade_id, state = trade.state.as_str(), "trade accepted");
        Ok(trade)
    }

    /// Responder declines the proposal. The listing returns to the feed.
    pub async fn decline(&self, trade_id: &TradeId, actor: &str) -> Result<Trade> {
        let db = self.store.lock().await;
        let conn = db.connection();
        let mut trade = self.load(conn, trade_id)?;
        let responder = trade.responder_id.clone();
        require_actor(&trade, actor, &responder, TradeEvent::Decline)?;
        self.resolve(conn, trade_id, &mut trade, TradeEvent::Decline, ListingStatus::Active)
    }

    /// Proposer withdraws the proposal. The listing returns to the feed.
    pub async fn withdraw(&self, trade_id: &TradeId, actor: &str) -> Result<Trade> {
        let db = self.store.lock().await;
        let conn = db.connection();
        let mut trade = self.load(conn, trade_id)?;
        let proposer = trade.proposer_id.clone();
        require_actor(&trade, actor, &proposer, TradeEvent::Withdraw)?;
        self.resolve(conn, trade_id, &mut trade, TradeEvent::Withdraw, ListingStatus::Active)
    }

    /// Complete a proof-gated trade.
    ///
    /// Refused until every party has at least one uploaded proof photo;
    /// queued or failed uploads do not count.
    pub async fn try_complete(&self, trade_id: &TradeId) -> Result<Trade> {
        let db = self.store.lock().await;
        let conn = db.connection();
        let mut trade = self.load(conn, trade_id)?;

        let uploaded = proved_parties(&SqlitePhotoQueueRepository::new(conn), &trade)?;
        let missing: Vec<&str> = trade
            .parties()
            .into_iter()
            .filter(|party| !uploaded.iter().any(|p| p == party))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidInput(format!(
                "trade {trade_id} is missing proof photos from: {}",
                missing.join(", ")
            )));
        }

        self.resolve(conn, trade_id, &mut trade, TradeEvent::Complete, ListingStatus::Completed)
    }

    /// Flag the swap within the grace window. Disputes freeze the trade
    /// for out-of-band resolution.
    pub async fn dispute(&self, trade_id: &TradeId, actor: &str) -> Result<Trade> {
        let now = now_ms();
        let db = self.store.lock().await;
        let conn = db.connection();
        let mut trade = self.load(conn, trade_id)?;

        if !trade.parties().contains(&actor) {
            return Err(Error::InvalidInput(format!(
                "{actor} is not a party to trade {trade_id}"
            )));
        }
        if let Some(deadline) = trade.grace_deadline {
            if now > deadline {
                return Err(Error::IllegalTransition {
                    from: trade.state.as_str().to_string(),
                    event: TradeEvent::Dispute.as_str().to_string(),
                });
            }
        }

        // Disputed listings stay off the feed until resolved.
        self.resolve(conn, trade_id, &mut trade, TradeEvent::Dispute, ListingStatus::PendingTrade)
    }

    /// Sweep overdue proof windows.
    ///
    /// Trades whose parties all delivered proof complete; the rest
    /// expire and their listings return to the feed.
    pub async fn expire_overdue(&self, now: i64) -> Result<Vec<Trade>> {
        let db = self.store.lock().await;
        let conn = db.connection();
        let trades = SqliteTradeRepository::new(conn);
        let queue = SqlitePhotoQueueRepository::new(conn);

        let mut swept = Vec::new();
        for mut trade in trades.list_awaiting_proof()? {
            let Some(deadline) = trade.grace_deadline else {
                continue;
            };
            if now <= deadline {
                continue;
            }

            let uploaded = proved_parties(&queue, &trade)?;
            let all_proved = trade
                .parties()
                .into_iter()
                .all(|party| uploaded.iter().any(|p| p == party));

            let (event, listing_status) = if all_proved {
                (TradeEvent::Complete, ListingStatus::Completed)
            } else {
                (TradeEvent::Expire, ListingStatus::Active)
            };
            let id = trade.id;
            let resolved = self.resolve(conn, &id, &mut trade, event, listing_status)?;
            tracing::info!(trade = %id, state = resolved.state.as_str(), "proof window swept");
            swept.push(resolved);
        }
        Ok(swept)
    }

    fn load(&self, conn: &rusqlite::Connection, trade_id: &TradeId) -> Result<Trade> {
        SqliteTradeRepository::new(conn)
            .get(trade_id)?
            .ok_or_else(|| Error::NotFound(trade_id.to_string()))
    }

    /// Apply a terminal event, persist the trade and settle the listing.
    fn resolve(
        &self,
        conn: &rusqlite::Connection,
        trade_id: &TradeId,
        trade: &mut Trade,
        event: TradeEvent,
        listing_status: ListingStatus,
    ) -> Result<Trade> {
        let now = now_ms();
        trade.state = next_state(trade.state, event)?;
        trade.resolved_at = Some(now);
        trade.updated_at = now;
        trade.is_dirty = true;

        SqliteTradeRepository::new(conn).save_local(trade)?;
        self.settle_listing(conn, trade, listing_status)?;

        tracing::info!(trade = %trade_id, event = event.as_str(),
            state = trade.state.as_str(), "trade transitioned");
        Ok(trade.clone())
    }

    fn settle_listing(
        &self,
        conn: &rusqlite::Connection,
        trade: &Trade,
        status: ListingStatus,
    ) -> Result<()> {
        let listings = SqliteListingRepository::new(conn);
        if let Some(mut listing) = listings.get(&trade.listing_id)? {
            if listing.status != status && !listing.is_removed() {
                listing.status = status;
                listing.touch_local();
                listings.save_local(&listing)?;
            }
        }
        Ok(())
    }
}

/// Parties holding at least one uploaded proof photo.
///
/// Proof URLs synced onto the trade record cover uploads from other
/// devices; the local queue covers uploads acknowledged on this device
/// before the next push.
fn proved_parties(
    queue: &SqlitePhotoQueueRepository<'_>,
    trade: &Trade,
) -> Result<Vec<String>> {
    let mut proved: Vec<String> = trade
        .proved_parties()
        .into_iter()
        .map(str::to_string)
        .collect();
    for party in queue.uploaded_proof_parties(&trade.id.as_str())? {
        if !proved.contains(&party) {
            proved.push(party);
        }
    }
    Ok(proved)
}

fn require_actor(trade: &Trade, actor: &str, expected: &str, event: TradeEvent) -> Result<()> {
    if actor == expected {
        return Ok(());
    }
    Err(Error::InvalidInput(format!(
        "{actor} cannot {} trade {} (expected {expected})",
        event.as_str(),
        trade.id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProofRequirement;
    use crate::db::{shared, Database};
    use crate::models::{Bucket, Listing, PhotoAsset, UploadState};
    use pretty_assertions::assert_eq;

    fn resolver_with(settings: SyncSettings) -> (SharedDatabase, TradeResolver) {
        let store = shared(Database::open_in_memory().unwrap());
        let resolver = TradeResolver::new(std::sync::Arc::clone(&store), settings);
        (store, resolver)
    }

    async fn seeded_listing(store: &SharedDatabase) -> Listing {
        let listing = Listing::new("bob", "Bike", "City bike", "sports");
        let db = store.lock().await;
        SqliteListingRepository::new(db.connection())
            .insert(&listing)
            .unwrap();
        listing
    }

    /// Drive an asset through the queue to `Uploaded` for a party.
    async fn uploaded_proof(store: &SharedDatabase, trade: &Trade, party: &str) {
        let db = store.lock().await;
        let queue = SqlitePhotoQueueRepository::new(db.connection());
        let asset = PhotoAsset::new(
            trade.id.as_str(),
            Bucket::TradeProofs,
            format!("/tmp/{party}.jpg"),
            Some(party.to_string()),
        )
        .unwrap();
        queue.enqueue(&asset).unwrap();
        let claimed = queue.claim_next(Bucket::TradeProofs).unwrap().unwrap();
        assert_eq!(claimed.state, UploadState::Uploading);
        queue
            .mark_uploaded(&claimed.id, "https://cdn/proof.jpg")
            .unwrap();
    }

    #[test]
    fn transition_table_covers_the_lifecycle() {
        use TradeEvent as E;
        use TradeState as S;

        assert_eq!(next_state(S::Proposed, E::Accept).unwrap(), S::Accepted);
        assert_eq!(next_state(S::Proposed, E::Decline).unwrap(), S::Declined);
        assert_eq!(next_state(S::Proposed, E::Withdraw).unwrap(), S::Withdrawn);
        assert_eq!(
            next_state(S::Accepted, E::RequireProof).unwrap(),
            S::AwaitingProof
        );
        assert_eq!(next_state(S::Accepted, E::Complete).unwrap(), S::Completed);
        assert_eq!(
            next_state(S::AwaitingProof, E::Complete).unwrap(),
            S::Completed
        );
        assert_eq!(
            next_state(S::AwaitingProof, E::Dispute).unwrap(),
            S::Disputed
        );
        assert_eq!(next_state(S::AwaitingProof, E::Expire).unwrap(), S::Expired);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use TradeEvent as E;
        use TradeState as S;

        for (state, event) in [
            (S::Completed, E::Accept),
            (S::Declined, E::Accept),
            (S::Proposed, E::Complete),
            (S::Proposed, E::Dispute),
            (S::Expired, E::Complete),
            (S::Disputed, E::Expire),
        ] {
            let error = next_state(state, event).unwrap_err();
            assert!(matches!(error, Error::IllegalTransition { .. }));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn propose_stamps_proof_policy_and_parks_listing() {
        let (store, resolver) = resolver_with(SyncSettings {
            proof_requirement: ProofRequirement::Categories(
                ["electronics".to_string()].into_iter().collect(),
            ),
            ..SyncSettings::default()
        });
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        assert_eq!(trade.state, TradeState::Proposed);
        // "sports" is not in the proof-required categories.
        assert!(!trade.proof_required);

        let db = store.lock().await;
        let cached = SqliteListingRepository::new(db.connection())
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::PendingTrade);
        assert!(cached.is_dirty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn propose_rejects_own_listing_and_parked_listings() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        assert!(resolver.propose(&listing.id, "bob").await.is_err());

        resolver.propose(&listing.id, "alice").await.unwrap();
        // Now pending-trade: a second proposal is refused.
        let error = resolver.propose(&listing.id, "carol").await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_without_proof_completes_immediately() {
        let (store, resolver) = resolver_with(SyncSettings {
            proof_requirement: ProofRequirement::Never,
            ..SyncSettings::default()
        });
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.accept(&trade.id, "bob").await.unwrap();

        assert_eq!(trade.state, TradeState::Completed);
        assert!(trade.resolved_at.is_some());
        assert!(trade.grace_deadline.is_none());

        let db = store.lock().await;
        let cached = SqliteListingRepository::new(db.connection())
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_with_proof_opens_the_grace_window() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.accept(&trade.id, "bob").await.unwrap();

        assert_eq!(trade.state, TradeState::AwaitingProof);
        assert!(trade.grace_deadline.unwrap() > now_ms());
        assert!(trade.resolved_at.is_none());

        // Still parked while proofs are pending.
        let db = store.lock().await;
        let cached = SqliteListingRepository::new(db.connection())
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::PendingTrade);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn only_the_responder_can_accept_or_decline() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;
        let trade = resolver.propose(&listing.id, "alice").await.unwrap();

        assert!(resolver.accept(&trade.id, "alice").await.is_err());
        assert!(resolver.decline(&trade.id, "alice").await.is_err());
        assert!(resolver.withdraw(&trade.id, "bob").await.is_err());

        // Failed attempts left the trade untouched.
        let db = store.lock().await;
        let cached = SqliteTradeRepository::new(db.connection())
            .get(&trade.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.state, TradeState::Proposed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decline_and_withdraw_reopen_the_listing() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.decline(&trade.id, "bob").await.unwrap();
        assert_eq!(trade.state, TradeState::Declined);

        let db = store.lock().await;
        let cached = SqliteListingRepository::new(db.connection())
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::Active);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completion_is_gated_on_both_parties_proofs() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.accept(&trade.id, "bob").await.unwrap();
        assert_eq!(trade.state, TradeState::AwaitingProof);

        // No proofs at all.
        let error = resolver.try_complete(&trade.id).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));

        // One party is not enough.
        uploaded_proof(&store, &trade, "alice").await;
        let error = resolver.try_complete(&trade.id).await.unwrap_err();
        assert!(error.to_string().contains("bob"));

        uploaded_proof(&store, &trade, "bob").await;
        let trade = resolver.try_complete(&trade.id).await.unwrap();
        assert_eq!(trade.state, TradeState::Completed);

        let db = store.lock().await;
        let cached = SqliteListingRepository::new(db.connection())
            .get(&listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn proofs_synced_from_other_devices_satisfy_completion() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.accept(&trade.id, "bob").await.unwrap();

        // Both parties uploaded elsewhere; the references arrive on the
        // pulled trade record, with nothing in the local photo queue.
        {
            let mut pulled = trade.clone();
            pulled.add_proof_url("alice", "https://cdn/alice.jpg");
            pulled.add_proof_url("bob", "https://cdn/bob.jpg");
            pulled.version += 1;
            let db = store.lock().await;
            SqliteTradeRepository::new(db.connection())
                .apply_remote(&pulled, now_ms())
                .unwrap();
        }

        let trade = resolver.try_complete(&trade.id).await.unwrap();
        assert_eq!(trade.state, TradeState::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispute_within_the_grace_window() {
        let (store, resolver) = resolver_with(SyncSettings::default());
        let listing = seeded_listing(&store).await;

        let trade = resolver.propose(&listing.id, "alice").await.unwrap();
        let trade = resolver.accept(&trade.id, "bob").await.unwrap();

        assert!(resolver.dispute(&trade.id, "mallory").await.is_err());

        let trade = resolver.dispute(&trade.id, "alice").await.unwrap();
        assert_eq!(trade.state, TradeState::Disputed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_expires_unproven_and_completes_proven() {
        let (store, resolver) = resolver_with(SyncSettings::default());

        let proven_listing = seeded_listing(&store).await;
        let unproven_listing = {
            let listing = Listing::new("bob", "Lamp", "Desk lamp", "home");
            let db = store.lock().await;
            SqliteListingRepository::new(db.connection())
                .insert(&listing)
                .unwrap();
            listing
        };

        let proven = resolver.propose(&proven_listing.id, "alice").await.unwrap();
        let proven = resolver.accept(&proven.id, "bob").await.unwrap();
        uploaded_proof(&store, &proven, "alice").await;
        uploaded_proof(&store, &proven, "bob").await;

        let unproven = resolver
            .propose(&unproven_listing.id, "alice")
            .await
            .unwrap();
        let unproven = resolver.accept(&unproven.id, "bob").await.unwrap();

        // Nothing is overdue yet.
        assert!(resolver.expire_overdue(now_ms()).await.unwrap().is_empty());

        let past_deadline = proven
            .grace_deadline
            .unwrap()
            .max(unproven.grace_deadline.unwrap())
            + 1;
        let swept = resolver.expire_overdue(past_deadline).await.unwrap();
        assert_eq!(swept.len(), 2);

        let db = store.lock().await;
        let trades = SqliteTradeRepository::new(db.connection());
        assert_eq!(
            trades.get(&proven.id).unwrap().unwrap().state,
            TradeState::Completed
        );
        assert_eq!(
            trades.get(&unproven.id).unwrap().unwrap().state,
            TradeState::Expired
        );

        // The expired listing is back on the feed.
        let cached = SqliteListingRepository::new(db.connection())
            .get(&unproven_listing.id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, ListingStatus::Active);
    }
}
