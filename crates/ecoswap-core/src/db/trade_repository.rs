//! Trade repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Trade, TradeId, TradeState};

/// Trait for trade cache operations
pub trait TradeRepository {
    /// Insert a new proposal (dirty, awaiting push)
    fn insert(&self, trade: &Trade) -> Result<()>;

    /// Persist a state transition or local edit; the record is marked
    /// dirty in the same statement, so callers observe success only after
    /// local durability
    fn save_local(&self, trade: &Trade) -> Result<()>;

    /// Get a trade by ID
    fn get(&self, id: &TradeId) -> Result<Option<Trade>>;

    /// Trades referencing a listing, newest first
    fn list_by_listing(&self, listing_id: &str) -> Result<Vec<Trade>>;

    /// Trades with unpushed local changes
    fn list_dirty(&self) -> Result<Vec<Trade>>;

    /// Trades waiting on proof uploads (expiry sweep feed)
    fn list_awaiting_proof(&self) -> Result<Vec<Trade>>;

    /// Write an accepted remote record (clean)
    fn apply_remote(&self, trade: &Trade, synced_at: i64) -> Result<()>;

    /// Record a successful push: clear dirty, adopt the server version
    fn mark_synced(&self, id: &TradeId, version: i64, updated_at: i64, synced_at: i64)
        -> Result<()>;
}

/// `SQLite` implementation of `TradeRepository`
pub struct SqliteTradeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTradeRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a trade from a database row
    fn parse_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
        let id: String = row.get(0)?;
        let listing_id: String = row.get(1)?;
        let state: String = row.get(4)?;
        let proof_urls: String = row.get(13)?;

        Ok(Trade {
            id: id.parse().map_err(|e| super::corrupt_id(0, e))?,
            listing_id: listing_id.parse().map_err(|e| super::corrupt_id(1, e))?,
            proposer_id: row.get(2)?,
            responder_id: row.get(3)?,
            state: TradeState::parse(&state).unwrap_or(TradeState::Proposed),
            proof_required: row.get::<_, i32>(5)? != 0,
            grace_deadline: row.get(6)?,
            proof_urls: serde_json::from_str(&proof_urls).unwrap_or_default(),
            created_at: row.get(7)?,
            resolved_at: row.get(8)?,
            version: row.get(9)?,
            updated_at: row.get(10)?,
            is_dirty: row.get::<_, i32>(11)? != 0,
            last_synced_at: row.get(12)?,
        })
    }

    fn write(&self, trade: &Trade, is_dirty: bool, synced_at: Option<i64>) -> Result<()> {
        let proof_urls = serde_json::to_string(&trade.proof_urls)?;
        self.conn.execute(
            "INSERT INTO trades (
                id, listing_id, proposer_id, responder_id, state, proof_required,
                grace_deadline, created_at, resolved_at, version, updated_at,
                is_dirty, last_synced_at, proof_urls
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                listing_id = excluded.listing_id,
                proposer_id = excluded.proposer_id,
                responder_id = excluded.responder_id,
                state = excluded.state,
                proof_required = excluded.proof_required,
                grace_deadline = excluded.grace_deadline,
                resolved_at = excluded.resolved_at,
                version = excluded.version,
                updated_at = excluded.updated_at,
                is_dirty = excluded.is_dirty,
                last_synced_at = COALESCE(excluded.last_synced_at, trades.last_synced_at),
                proof_urls = excluded.proof_urls",
            params![
                trade.id.as_str(),
                trade.listing_id.as_str(),
                trade.proposer_id,
                trade.responder_id,
                trade.state.as_str(),
                i32::from(trade.proof_required),
                trade.grace_deadline,
                trade.created_at,
                trade.resolved_at,
                trade.version,
                trade.updated_at,
                i32::from(is_dirty),
                synced_at,
                proof_urls,
            ],
        )?;
        Ok(())
    }

    const SELECT: &'static str = "SELECT id, listing_id, proposer_id, responder_id, state,
        proof_required, grace_deadline, created_at, resolved_at, version, updated_at,
        is_dirty, last_synced_at, proof_urls FROM trades";
}

impl TradeRepository for SqliteTradeRepository<'_> {
    fn insert(&self, trade: &Trade) -> Result<()> {
        self.write(trade, true, None)
    }

    fn save_local(&self, trade: &Trade) -> Result<()> {
        self.write(trade, true, None)
    }

    fn get(&self, id: &TradeId) -> Result<Option<Trade>> {
        let sql = format!("{} WHERE id = ?", Self::SELECT);
        let result = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::parse_trade);

        match result {
            Ok(trade) => Ok(Some(trade)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_by_listing(&self, listing_id: &str) -> Result<Vec<Trade>> {
        let sql = format!(
            "{} WHERE listing_id = ? ORDER BY created_at DESC",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let trades = stmt
            .query_map(params![listing_id], Self::parse_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn list_dirty(&self) -> Result<Vec<Trade>> {
        let sql = format!(
            "{} WHERE is_dirty = 1 ORDER BY updated_at ASC",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let trades = stmt
            .query_map([], Self::parse_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn list_awaiting_proof(&self) -> Result<Vec<Trade>> {
        let sql = format!(
            "{} WHERE state = 'awaiting-proof' ORDER BY grace_deadline ASC",
            Self::SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let trades = stmt
            .query_map([], Self::parse_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn apply_remote(&self, trade: &Trade, synced_at: i64) -> Result<()> {
        self.write(trade, false, Some(synced_at))
    }

    fn mark_synced(
        &self,
        id: &TradeId,
        version: i64,
        updated_at: i64,
        synced_at: i64,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE trades
             SET version = ?, updated_at = ?, is_dirty = 0, last_synced_at = ?
             WHERE id = ?",
            params![version, updated_at, synced_at, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ListingId;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let trade = Trade::new(ListingId::new(), "alice", "bob", true);
        repo.insert(&trade).unwrap();

        let fetched = repo.get(&trade.id).unwrap().unwrap();
        assert_eq!(fetched.proposer_id, "alice");
        assert_eq!(fetched.state, TradeState::Proposed);
        assert!(fetched.proof_required);
        assert!(fetched.is_dirty);
    }

    #[test]
    fn save_local_persists_transitions() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let mut trade = Trade::new(ListingId::new(), "alice", "bob", true);
        repo.insert(&trade).unwrap();

        trade.state = TradeState::Accepted;
        trade.updated_at += 1;
        repo.save_local(&trade).unwrap();

        let fetched = repo.get(&trade.id).unwrap().unwrap();
        assert_eq!(fetched.state, TradeState::Accepted);
        assert!(fetched.is_dirty);
    }

    #[test]
    fn proof_urls_round_trip() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let mut trade = Trade::new(ListingId::new(), "alice", "bob", true);
        assert!(trade.add_proof_url("alice", "https://cdn/a.jpg"));
        repo.insert(&trade).unwrap();

        let fetched = repo.get(&trade.id).unwrap().unwrap();
        assert_eq!(
            fetched.proof_urls["alice"],
            vec!["https://cdn/a.jpg".to_string()]
        );
        assert_eq!(fetched.proved_parties(), vec!["alice"]);
    }

    #[test]
    fn corrupt_stored_id_is_an_error() {
        let db = setup();
        db.connection()
            .execute(
                "INSERT INTO trades (id, listing_id, proposer_id, responder_id, state,
                    created_at, updated_at)
                 VALUES ('not-a-uuid', 'also-bad', 'a', 'b', 'proposed', 1, 1)",
                [],
            )
            .unwrap();

        let repo = SqliteTradeRepository::new(db.connection());
        assert!(repo.list_dirty().is_err());
    }

    #[test]
    fn awaiting_proof_sweep_feed() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let mut waiting = Trade::new(ListingId::new(), "alice", "bob", true);
        waiting.state = TradeState::AwaitingProof;
        waiting.grace_deadline = Some(5_000);
        let proposed = Trade::new(ListingId::new(), "carol", "dan", false);

        repo.insert(&waiting).unwrap();
        repo.insert(&proposed).unwrap();

        let result = repo.list_awaiting_proof().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, waiting.id);
    }

    #[test]
    fn mark_synced_clears_dirty() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let trade = Trade::new(ListingId::new(), "alice", "bob", false);
        repo.insert(&trade).unwrap();
        repo.mark_synced(&trade.id, 2, 7_000, 7_001).unwrap();

        let fetched = repo.get(&trade.id).unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert!(!fetched.is_dirty);
        assert_eq!(fetched.last_synced_at, Some(7_001));
    }

    #[test]
    fn mark_synced_missing_trade_is_not_found() {
        let db = setup();
        let repo = SqliteTradeRepository::new(db.connection());

        let err = repo.mark_synced(&TradeId::new(), 1, 1, 1).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
