//! PostgREST-backed remote store.
//!
//! Talks to a Supabase/PostgREST endpoint: one relation per entity kind,
//! rows scoped by `user_id`, upserts keyed on `id`.

use std::fmt;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::auth::OwnerId;
use crate::error::{Error, Result};
use crate::models::{EntityKind, EntityRecord};
use crate::remote::rows::{record_to_row, row_to_record};
use crate::remote::RemoteStore;
use crate::util::{compact_text, is_http_url};

/// Connection settings for [`RestRemoteStore`].
#[derive(Clone, Default)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://demo.supabase.co`.
    pub base_url: String,
    /// Project API key sent as the `apikey` header.
    pub api_key: String,
    /// Per-user access token for row-level security. Falls back to the API
    /// key when absent.
    pub access_token: Option<String>,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Remote store client over PostgREST.
#[derive(Clone)]
pub struct RestRemoteStore {
    rest_url: String,
    api_key: String,
    token: String,
    client: Client,
}

impl fmt::Debug for RestRemoteStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestRemoteStore")
            .field("rest_url", &self.rest_url)
            .field("api_key", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl RestRemoteStore {
    pub fn new(config: RestConfig) -> Result<Self> {
        let rest_url = normalize_rest_url(&config.base_url)?;
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::InvalidInput(
                "remote API key must not be empty".to_string(),
            ));
        }
        let token = crate::util::normalize_text_option(config.access_token)
            .unwrap_or_else(|| api_key.clone());

        Ok(Self {
            rest_url,
            api_key,
            token,
            client: Client::builder()
                .build()
                .map_err(|e| Error::Remote(e.to_string()))?,
        })
    }

    fn table_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.rest_url, kind.remote_table())
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Remote(format!("request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote(parse_api_error(status, &body)))
    }
}

#[async_trait::async_trait]
impl RemoteStore for RestRemoteStore {
    async fn upsert(&self, owner: &OwnerId, record: &EntityRecord) -> Result<()> {
        let row = record_to_row(owner, record)?;
        let request = self
            .authed(self.client.post(self.table_url(record.kind())))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);

        self.send(request).await?;
        Ok(())
    }

    async fn select_all(&self, owner: &OwnerId, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let request = self
            .authed(self.client.get(self.table_url(kind)))
            .query(&[
                ("user_id", format!("eq.{owner}")),
                ("order", "id.asc".to_string()),
            ]);

        let response = self.send(request).await?;
        let rows = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| Error::Remote(format!("invalid response body: {e}")))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_record(kind, row)?);
        }
        Ok(records)
    }

    async fn delete(&self, owner: &OwnerId, kind: EntityKind, entity_id: &str) -> Result<()> {
        // PostgREST deletes matching nothing still return success, which is
        // exactly the idempotence the replay path needs.
        let request = self.authed(self.client.delete(self.table_url(kind))).query(&[
            ("id", format!("eq.{entity_id}")),
            ("user_id", format!("eq.{owner}")),
        ]);

        self.send(request).await?;
        Ok(())
    }

    async fn count(&self, owner: &OwnerId, kind: EntityKind) -> Result<u64> {
        let request = self
            .authed(self.client.get(self.table_url(kind)))
            .query(&[
                ("user_id", format!("eq.{owner}")),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "count=exact")
            .header("Range", "0-0");

        let response = self.send(request).await?;
        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Remote("count response is missing a Content-Range header".to_string())
            })?;

        parse_content_range_total(&header).ok_or_else(|| {
            Error::Remote(format!("unparseable Content-Range header: {header}"))
        })
    }
}

/// Validate a project base URL and append the PostgREST path.
pub fn normalize_rest_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "remote URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(trimmed) {
        return Err(Error::InvalidInput(
            "remote URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

/// Total from a `Content-Range` value such as `0-0/42` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        let normalized = normalize_rest_url("https://demo.supabase.co").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/rest/v1");
    }

    #[test]
    fn normalize_rest_url_keeps_existing_rest_path() {
        let normalized = normalize_rest_url("https://demo.supabase.co/rest/v1/").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/rest/v1");
    }

    #[test]
    fn normalize_rest_url_rejects_other_schemes() {
        assert!(normalize_rest_url("ftp://demo").is_err());
        assert!(normalize_rest_url("   ").is_err());
    }

    #[test]
    fn content_range_parses_both_shapes() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn api_error_prefers_postgrest_message() {
        let body = r#"{"message":"duplicate key value","details":null,"hint":null,"code":"23505"}"#;
        let rendered = parse_api_error(StatusCode::CONFLICT, body);
        assert_eq!(rendered, "duplicate key value (409)");
    }

    #[test]
    fn api_error_falls_back_to_body_text() {
        let rendered = parse_api_error(StatusCode::BAD_GATEWAY, "upstream unavailable");
        assert_eq!(rendered, "upstream unavailable (502)");

        let rendered = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(rendered, "HTTP 502");
    }

    #[test]
    fn config_debug_redacts_secrets() {
        let config = RestConfig {
            base_url: "https://demo.supabase.co".to_string(),
            api_key: "secret-api-key".to_string(),
            access_token: Some("secret-user-token".to_string()),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-api-key"));
        assert!(!rendered.contains("secret-user-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn store_falls_back_to_api_key_for_token() {
        let store = RestRemoteStore::new(RestConfig {
            base_url: "https://demo.supabase.co".to_string(),
            api_key: "anon-key".to_string(),
            access_token: Some("   ".to_string()),
        })
        .unwrap();
        assert_eq!(store.token, "anon-key");
        assert_eq!(store.table_url(EntityKind::Activity),
            "https://demo.supabase.co/rest/v1/activities");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = RestRemoteStore::new(RestConfig {
            base_url: "https://demo.supabase.co".to_string(),
            api_key: "  ".to_string(),
            access_token: None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
