//! Trade model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::now_ms;

use super::listing::ListingId;

/// A unique identifier for a trade, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(Uuid);

impl TradeId {
    /// Create a new unique trade ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TradeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Trade lifecycle state.
///
/// `Disputed` is terminal from this component's perspective; resolution
/// happens out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeState {
    Proposed,
    Accepted,
    AwaitingProof,
    Completed,
    Declined,
    Withdrawn,
    Disputed,
    Expired,
}

impl TradeState {
    /// Stable string form used in the database and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::AwaitingProof => "awaiting-proof",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Withdrawn => "withdrawn",
            Self::Disputed => "disputed",
            Self::Expired => "expired",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proposed" => Some(Self::Proposed),
            "accepted" => Some(Self::Accepted),
            "awaiting-proof" => Some(Self::AwaitingProof),
            "completed" => Some(Self::Completed),
            "declined" => Some(Self::Declined),
            "withdrawn" => Some(Self::Withdrawn),
            "disputed" => Some(Self::Disputed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Declined | Self::Withdrawn | Self::Disputed | Self::Expired
        )
    }
}

/// A swap transaction from proposal to resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier
    pub id: TradeId,
    /// Listing being traded
    pub listing_id: ListingId,
    /// User who proposed the trade
    pub proposer_id: String,
    /// Listing owner responding to the proposal
    pub responder_id: String,
    /// Current lifecycle state
    pub state: TradeState,
    /// Whether proof photos gate completion (stamped at proposal time)
    pub proof_required: bool,
    /// Deadline for proof upload / dispute flagging (Unix ms)
    #[serde(default)]
    pub grace_deadline: Option<i64>,
    /// Uploaded proof-photo URLs per party.
    ///
    /// Part of the synced record, so a counterparty's proofs uploaded
    /// from another device still gate completion here.
    #[serde(default)]
    pub proof_urls: BTreeMap<String, Vec<String>>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// When a terminal state was reached (Unix ms)
    #[serde(default)]
    pub resolved_at: Option<i64>,
    /// Monotonic version for conflict detection
    pub version: i64,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    /// Local edit not yet acknowledged by the remote store
    #[serde(skip)]
    pub is_dirty: bool,
    /// Last successful sync of this record (Unix ms)
    #[serde(skip)]
    pub last_synced_at: Option<i64>,
}

impl Trade {
    /// Create a new proposal, dirty until pushed.
    #[must_use]
    pub fn new(
        listing_id: ListingId,
        proposer_id: impl Into<String>,
        responder_id: impl Into<String>,
        proof_required: bool,
    ) -> Self {
        let now = now_ms();
        Self {
            id: TradeId::new(),
            listing_id,
            proposer_id: proposer_id.into(),
            responder_id: responder_id.into(),
            state: TradeState::Proposed,
            proof_required,
            grace_deadline: None,
            proof_urls: BTreeMap::new(),
            created_at: now,
            resolved_at: None,
            version: 0,
            updated_at: now,
            is_dirty: true,
            last_synced_at: None,
        }
    }

    /// Both user ids participating in this trade.
    #[must_use]
    pub fn parties(&self) -> [&str; 2] {
        [self.proposer_id.as_str(), self.responder_id.as_str()]
    }

    /// Record an uploaded proof photo for a party.
    ///
    /// Returns `false` when the URL is already attached, so callers can
    /// skip a redundant write.
    pub fn add_proof_url(&mut self, party: &str, url: &str) -> bool {
        let urls = self.proof_urls.entry(party.to_string()).or_default();
        if urls.iter().any(|existing| existing == url) {
            return false;
        }
        urls.push(url.to_string());
        true
    }

    /// Parties with at least one proof photo attached to the record.
    #[must_use]
    pub fn proved_parties(&self) -> Vec<&str> {
        self.proof_urls
            .iter()
            .filter(|(_, urls)| !urls.is_empty())
            .map(|(party, _)| party.as_str())
            .collect()
    }
}
