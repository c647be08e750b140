//! Typed remote access for tables and storage buckets.
//!
//! `RemoteClient` is the only seam the engines see; any backend exposing
//! the same four operations is substitutable. The Supabase implementation
//! lives in [`supabase`].

#[cfg(test)]
pub(crate) mod mock;
mod supabase;

use std::future::Future;

use serde_json::Value;

pub use supabase::SupabaseClient;

use crate::error::{Error, Result};
use crate::models::{Bucket, EntityTable, Listing, ListingStatus, Trade};

/// One entity row as exchanged with the remote store.
///
/// `version`/`updated_at` are duplicated out of `fields` so the engines
/// can reconcile without caring about the entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: String,
    pub version: i64,
    pub updated_at: i64,
    /// Soft-deleted on the remote side
    pub deleted: bool,
    /// Full entity payload
    pub fields: Value,
}

impl RemoteRecord {
    /// Build a record from a raw remote row.
    pub fn from_value(table: EntityTable, value: Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput(format!("{table} record missing 'id'")))?
            .to_string();
        let version = value.get("version").and_then(Value::as_i64).unwrap_or(0);
        let updated_at = value
            .get("updated_at")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let deleted = match table {
            EntityTable::Listings => value
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s == ListingStatus::Removed.as_str()),
            EntityTable::Trades => false,
        };

        Ok(Self {
            id,
            version,
            updated_at,
            deleted,
            fields: value,
        })
    }

    /// Serialize a listing for push.
    pub fn from_listing(listing: &Listing) -> Result<Self> {
        Ok(Self {
            id: listing.id.as_str(),
            version: listing.version,
            updated_at: listing.updated_at,
            deleted: listing.is_removed(),
            fields: serde_json::to_value(listing)?,
        })
    }

    /// Serialize a trade for push.
    pub fn from_trade(trade: &Trade) -> Result<Self> {
        Ok(Self {
            id: trade.id.as_str(),
            version: trade.version,
            updated_at: trade.updated_at,
            deleted: false,
            fields: serde_json::to_value(trade)?,
        })
    }

    /// Deserialize a pulled listing.
    pub fn into_listing(self) -> Result<Listing> {
        Ok(serde_json::from_value(self.fields)?)
    }

    /// Deserialize a pulled trade.
    pub fn into_trade(self) -> Result<Trade> {
        Ok(serde_json::from_value(self.fields)?)
    }
}

/// Acknowledgement of an accepted push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushAck {
    /// Server-side version after the write
    pub version: i64,
    /// Server-side modification timestamp (Unix ms)
    pub updated_at: i64,
}

/// Typed wrapper over the backend's table and storage endpoints.
///
/// No business logic lives here: request/response shaping only. `upsert`
/// is idempotent when the same idempotency key matches a previously
/// accepted write.
pub trait RemoteClient: Send + Sync {
    /// Fetch records changed since the watermark, ordered by
    /// `updated_at` ascending then id ascending.
    fn fetch_delta(
        &self,
        table: EntityTable,
        since_ms: i64,
    ) -> impl Future<Output = Result<Vec<RemoteRecord>>> + Send;

    /// Fetch a single record by id.
    fn fetch_record(
        &self,
        table: EntityTable,
        id: &str,
    ) -> impl Future<Output = Result<Option<RemoteRecord>>> + Send;

    /// Push one record. `record.version` is the version being written;
    /// the write is conditional on the remote still holding
    /// `record.version - 1` and fails with [`Error::Conflict`] otherwise.
    fn upsert(
        &self,
        table: EntityTable,
        record: &RemoteRecord,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<PushAck>> + Send;

    /// Upload object bytes to a bucket, returning the public URL.
    fn upload_object(
        &self,
        bucket: Bucket,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<T: RemoteClient> RemoteClient for std::sync::Arc<T> {
    fn fetch_delta(
        &self,
        table: EntityTable,
        since_ms: i64,
    ) -> impl Future<Output = Result<Vec<RemoteRecord>>> + Send {
        T::fetch_delta(self, table, since_ms)
    }

    fn fetch_record(
        &self,
        table: EntityTable,
        id: &str,
    ) -> impl Future<Output = Result<Option<RemoteRecord>>> + Send {
        T::fetch_record(self, table, id)
    }

    fn upsert(
        &self,
        table: EntityTable,
        record: &RemoteRecord,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<PushAck>> + Send {
        T::upsert(self, table, record, idempotency_key)
    }

    fn upload_object(
        &self,
        bucket: Bucket,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send {
        T::upload_object(self, bucket, object_key, bytes, content_type)
    }
}
