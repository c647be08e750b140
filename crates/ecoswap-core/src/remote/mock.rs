//! In-memory remote used by engine and pipeline tests.
//!
//! Behaves like the real backend for version-conditional writes and can
//! be scripted to fail the next N calls of each operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{Bucket, EntityTable};

use super::{PushAck, RemoteClient, RemoteRecord};

#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    records: HashMap<(EntityTable, String), RemoteRecord>,
    fetch_errors: VecDeque<Error>,
    upsert_errors: VecDeque<Error>,
    upload_errors: VecDeque<Error>,
    upsert_keys: Vec<String>,
    uploads: Vec<(Bucket, String)>,
}

impl MockRemote {
    /// Place a record on the "server" without going through `upsert`.
    pub fn seed(&self, table: EntityTable, record: RemoteRecord) {
        let mut state = self.state.lock().unwrap();
        state.records.insert((table, record.id.clone()), record);
    }

    /// Current server-side copy of a record.
    pub fn stored(&self, table: EntityTable, id: &str) -> Option<RemoteRecord> {
        let state = self.state.lock().unwrap();
        state.records.get(&(table, id.to_string())).cloned()
    }

    /// Remove a record, as if another device deleted it.
    pub fn remove(&self, table: EntityTable, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.records.remove(&(table, id.to_string()));
    }

    /// Fail the next `fetch_delta`/`fetch_record` call with `error`.
    pub fn fail_next_fetch(&self, error: Error) {
        self.state.lock().unwrap().fetch_errors.push_back(error);
    }

    /// Fail the next `upsert` call with `error`.
    pub fn fail_next_upsert(&self, error: Error) {
        self.state.lock().unwrap().upsert_errors.push_back(error);
    }

    /// Fail the next `upload_object` call with `error`.
    pub fn fail_next_upload(&self, error: Error) {
        self.state.lock().unwrap().upload_errors.push_back(error);
    }

    /// Idempotency keys seen by `upsert`, in call order.
    pub fn upsert_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().upsert_keys.clone()
    }

    /// Successful uploads, in call order.
    pub fn uploads(&self) -> Vec<(Bucket, String)> {
        self.state.lock().unwrap().uploads.clone()
    }
}

impl RemoteClient for MockRemote {
    fn fetch_delta(
        &self,
        table: EntityTable,
        since_ms: i64,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteRecord>>> + Send {
        async move {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fetch_errors.pop_front() {
                return Err(error);
            }

            let mut rows: Vec<RemoteRecord> = state
                .records
                .iter()
                .filter(|((t, _), record)| *t == table && record.updated_at > since_ms)
                .map(|(_, record)| record.clone())
                .collect();
            rows.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
            Ok(rows)
        }
    }

    fn fetch_record(
        &self,
        table: EntityTable,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<RemoteRecord>>> + Send {
        let id = id.to_string();
        async move {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fetch_errors.pop_front() {
                return Err(error);
            }
            Ok(state.records.get(&(table, id)).cloned())
        }
    }

    fn upsert(
        &self,
        table: EntityTable,
        record: &RemoteRecord,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<PushAck>> + Send {
        let record = record.clone();
        let idempotency_key = idempotency_key.to_string();
        async move {
            let mut state = self.state.lock().unwrap();
            state.upsert_keys.push(idempotency_key);
            if let Some(error) = state.upsert_errors.pop_front() {
                return Err(error);
            }

            let expected = record.version - 1;
            let key = (table, record.id.clone());
            match state.records.get(&key) {
                Some(existing) if existing.version != expected => {
                    return Err(Error::Conflict {
                        table: table.as_str().to_string(),
                        id: record.id.clone(),
                    });
                }
                None if expected > 0 => {
                    return Err(Error::NotFound(record.id.clone()));
                }
                _ => {}
            }

            let ack = PushAck {
                version: record.version,
                updated_at: record.updated_at,
            };
            state.records.insert(key, record);
            Ok(ack)
        }
    }

    fn upload_object(
        &self,
        bucket: Bucket,
        object_key: &str,
        _bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String>> + Send {
        let object_key = object_key.to_string();
        async move {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.upload_errors.pop_front() {
                return Err(error);
            }
            state.uploads.push((bucket, object_key.clone()));
            Ok(format!(
                "https://cdn.test/{}/{object_key}",
                bucket.as_str()
            ))
        }
    }
}
