//! Per-table sync cursor

use serde::{Deserialize, Serialize};

/// The entity tables reconciled by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityTable {
    Listings,
    Trades,
}

impl EntityTable {
    /// All synced tables, in pull order.
    pub const ALL: [Self; 2] = [Self::Listings, Self::Trades];

    /// Remote table / local cursor key name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::Trades => "trades",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "listings" => Some(Self::Listings),
            "trades" => Some(Self::Trades),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delta-sync watermark for one entity table.
///
/// `last_synced_at` is the highest remote `updated_at` applied locally;
/// pulls request only records strictly newer. It advances per applied
/// record and never rolls back except on explicit cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub table: EntityTable,
    /// Highest applied remote `updated_at` (Unix ms); 0 on first run
    pub last_synced_at: i64,
    /// When this cursor last moved (Unix ms)
    pub updated_at: i64,
}

impl SyncCursor {
    /// Empty cursor for a table's first-ever sync.
    #[must_use]
    pub const fn empty(table: EntityTable) -> Self {
        Self {
            table,
            last_synced_at: 0,
            updated_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_through_strings() {
        for table in EntityTable::ALL {
            assert_eq!(EntityTable::parse(table.as_str()), Some(table));
        }
        assert_eq!(EntityTable::parse("bids"), None);
    }

    #[test]
    fn empty_cursor_starts_at_zero() {
        let cursor = SyncCursor::empty(EntityTable::Listings);
        assert_eq!(cursor.last_synced_at, 0);
    }
}
