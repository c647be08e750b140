//! Supabase REST + Storage implementation of `RemoteClient`.

use reqwest::{header, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SupabaseConfig;
use crate::error::{Error, Result};
use crate::models::{Bucket, EntityTable};
use crate::util::compact_text;

use super::{PushAck, RemoteClient, RemoteRecord};

/// Supabase-backed remote client.
///
/// Tables go through PostgREST (`/rest/v1`), photos through Storage
/// (`/storage/v1`). Writes are optimistic: updates are filtered on the
/// expected prior version and an empty result set means a conflict.
#[derive(Clone)]
pub struct SupabaseClient {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseClient {
    /// Build a client from validated configuration.
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(&config.anon_key)
            .map_err(|_| Error::InvalidInput("Supabase anon key is not ASCII".to_string()))?;
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|_| Error::InvalidInput("Supabase anon key is not ASCII".to_string()))?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| Error::Unavailable(format!("failed to build HTTP client: {error}")))?;

        Ok(Self { config, client })
    }

    async fn check(&self, response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body, context))
    }
}

impl RemoteClient for SupabaseClient {
    fn fetch_delta(
        &self,
        table: EntityTable,
        since_ms: i64,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteRecord>>> + Send {
        async move {
            let response = self
                .client
                .get(self.config.rest_url(table.as_str()))
                .query(&[
                    ("select", "*".to_string()),
                    ("updated_at", format!("gt.{since_ms}")),
                    ("order", "updated_at.asc,id.asc".to_string()),
                ])
                .send()
                .await
                .map_err(map_transport_error)?;

            let response = self.check(response, table.as_str()).await?;
            let rows: Vec<Value> = response.json().await.map_err(map_transport_error)?;

            rows.into_iter()
                .map(|row| RemoteRecord::from_value(table, row))
                .collect()
        }
    }

    fn fetch_record(
        &self,
        table: EntityTable,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<RemoteRecord>>> + Send {
        async move {
            let response = self
                .client
                .get(self.config.rest_url(table.as_str()))
                .query(&[
                    ("select", "*".to_string()),
                    ("id", id_filter(id)),
                    ("limit", "1".to_string()),
                ])
                .send()
                .await
                .map_err(map_transport_error)?;

            let response = self.check(response, table.as_str()).await?;
            let mut rows: Vec<Value> = response.json().await.map_err(map_transport_error)?;

            if rows.is_empty() {
                return Ok(None);
            }
            Ok(Some(RemoteRecord::from_value(table, rows.remove(0))?))
        }
    }

    fn upsert(
        &self,
        table: EntityTable,
        record: &RemoteRecord,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<PushAck>> + Send {
        async move {
            let expected_version = record.version - 1;
            let url = self.config.rest_url(table.as_str());

            let response = if expected_version <= 0 {
                // First push of a locally-authored record.
                self.client
                    .post(&url)
                    .header("Prefer", "return=representation")
                    .header("Idempotency-Key", idempotency_key)
                    .json(&vec![record.fields.clone()])
                    .send()
                    .await
                    .map_err(map_transport_error)?
            } else {
                // Conditional update: no rows match when someone else won.
                self.client
                    .patch(&url)
                    .query(&[
                        ("id", id_filter(&record.id)),
                        ("version", format!("eq.{expected_version}")),
                    ])
                    .header("Prefer", "return=representation")
                    .header("Idempotency-Key", idempotency_key)
                    .json(&record.fields)
                    .send()
                    .await
                    .map_err(map_transport_error)?
            };

            let response = self.check(response, table.as_str()).await?;
            let rows: Vec<AckRow> = response.json().await.map_err(map_transport_error)?;

            match rows.first() {
                Some(row) => Ok(PushAck {
                    version: row.version,
                    updated_at: row.updated_at,
                }),
                None => Err(Error::Conflict {
                    table: table.as_str().to_string(),
                    id: record.id.clone(),
                }),
            }
        }
    }

    fn upload_object(
        &self,
        bucket: Bucket,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String>> + Send {
        async move {
            let bucket_name = self.config.buckets.name(bucket).to_string();
            let mut request = self
                .client
                .post(self.config.storage_url(&bucket_name, object_key))
                .header("x-upsert", "true")
                .body(bytes);

            if let Some(content_type) = content_type {
                request = request.header(header::CONTENT_TYPE, content_type);
            }

            let response = request.send().await.map_err(map_transport_error)?;
            self.check(response, &bucket_name).await?;

            Ok(self.config.public_object_url(&bucket_name, object_key))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AckRow {
    #[serde(default)]
    version: i64,
    #[serde(default)]
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// PostgREST `eq.` filter for an id.
///
/// The raw value goes in as-is; reqwest's query serializer owns the
/// percent-encoding, so encoding here would double-encode.
fn id_filter(id: &str) -> String {
    format!("eq.{id}")
}

/// Map an HTTP status + body to the core error taxonomy.
fn map_status(status: StatusCode, body: &str, context: &str) -> Error {
    let detail = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(detail),
        StatusCode::NOT_FOUND => Error::NotFound(format!("{context}: {detail}")),
        StatusCode::CONFLICT => Error::Conflict {
            table: context.to_string(),
            id: detail,
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(detail),
        status if status.is_server_error() => Error::Unavailable(detail),
        _ => Error::Storage(format!("{context}: {detail}")),
    }
}

/// Timeouts and connection faults are retryable `Unavailable` errors.
fn map_transport_error(error: reqwest::Error) -> Error {
    Error::Unavailable(error.to_string())
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_status_covers_the_taxonomy() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "", "listings"),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "", "listings"),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "", "listings"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::CONFLICT, "", "listings"),
            Error::Conflict { .. }
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "", "listings"),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, "", "listings"),
            Error::Unavailable(_)
        ));
        // Payload rejections are not retryable.
        assert!(matches!(
            map_status(StatusCode::PAYLOAD_TOO_LARGE, "", "listing-photos"),
            Error::Storage(_)
        ));
    }

    #[test]
    fn id_filter_leaves_encoding_to_the_query_serializer() {
        assert_eq!(
            id_filter("0191e6a0-0000-7000-8000-000000000001"),
            "eq.0191e6a0-0000-7000-8000-000000000001"
        );
        // Reserved characters stay raw here.
        assert_eq!(id_filter("a b/c&d"), "eq.a b/c&d");
    }

    #[test]
    fn parse_api_error_prefers_json_message() {
        let detail = parse_api_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"message": "rate limit exceeded"}"#,
        );
        assert_eq!(detail, "rate limit exceeded (429)");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_text() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502".to_string()
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, " upstream down "),
            "upstream down (502)".to_string()
        );
    }

    #[test]
    fn client_requires_ascii_key() {
        let config = SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: "ключ".to_string(),
            buckets: crate::config::BucketNames::default(),
            request_timeout: std::time::Duration::from_secs(5),
        };
        assert!(SupabaseClient::new(config).is_err());
    }
}
