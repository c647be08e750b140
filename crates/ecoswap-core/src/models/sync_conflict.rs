//! Sync conflict ledger entry

use serde::{Deserialize, Serialize};

/// Strategy names recorded in the conflict ledger.
pub mod strategy {
    /// Non-overlapping field changes were merged automatically.
    pub const THREE_WAY_MERGE: &str = "three-way-merge";
    /// Conflict left for the user; the record stays dirty.
    pub const MANUAL: &str = "manual";
    /// Whole-record last-writer-wins during pull.
    pub const LWW: &str = "lww";
}

/// A recorded push conflict, either auto-merged or surfaced for manual
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entity table involved
    pub table_name: String,
    /// Entity involved in the conflict
    pub entity_id: String,
    /// Field both sides changed ("*" for whole-record LWW)
    pub field: String,
    /// Local value at conflict time (JSON)
    pub local_value: String,
    /// Remote value at conflict time (JSON)
    pub remote_value: String,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
