//! SeaTable HTTP API client for seatable-mysync.
//!
//! Wraps the handful of row operations the sync pipeline needs: one-page row
//! listing, batch/single deletion, and batch append. Listing is an
//! idempotent GET and is retried with exponential backoff on transient
//! failures; mutations are never auto-retried here — the clearing and
//! loading policies own that decision.

use crate::config::{RetryConfig, SeaTableConfig};
use crate::error::{Error, Result};
use crate::transform::Record;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One row as stored in the destination table: the record fields plus the
/// store-assigned row identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRow {
    /// Opaque row identifier assigned by the store
    #[serde(rename = "_id")]
    pub id: String,

    /// Cell values
    #[serde(flatten)]
    pub fields: Record,
}

/// Access grant returned by the app-access-token endpoint.
#[derive(Debug, Deserialize)]
struct AccessGrant {
    access_token: String,
    dtable_uuid: String,
    #[serde(default)]
    dtable_server: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowsPage {
    rows: Vec<RemoteRow>,
}

/// SeaTable client bound to one base (one task's API token).
#[derive(Debug)]
pub struct SeaTableClient {
    http: reqwest::Client,
    auth_url: Url,
    api_token: String,
    access_token: String,
    rows_base: Url,
    retry: RetryConfig,
}

impl SeaTableClient {
    /// Authenticate against the server and bind to the base behind the
    /// given API token.
    #[instrument(skip(config, api_token, retry), fields(server = %config.server_url))]
    pub async fn connect(
        config: &SeaTableConfig,
        api_token: &str,
        retry: RetryConfig,
    ) -> Result<Self> {
        info!("Connecting to SeaTable...");

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::api("Failed to build HTTP client", e))?;

        let server = parse_base_url(&config.server_url)?;
        let auth_url = server
            .join("api/v2.1/dtable/app-access-token/")
            .map_err(|e| Error::config(format!("Invalid server URL: {}", e)))?;

        let grant = fetch_access_grant(&http, &auth_url, api_token).await?;

        let api_root = match &grant.dtable_server {
            Some(dtable_server) => parse_base_url(dtable_server)?,
            None => server
                .join("dtable-server/")
                .map_err(|e| Error::config(format!("Invalid server URL: {}", e)))?,
        };
        let rows_base = api_root
            .join(&format!("api/v1/dtables/{}/", grant.dtable_uuid))
            .map_err(|e| Error::config(format!("Invalid dtable server URL: {}", e)))?;

        info!("Authenticated against base {}", grant.dtable_uuid);

        Ok(Self {
            http,
            auth_url,
            api_token: api_token.to_string(),
            access_token: grant.access_token,
            rows_base,
            retry,
        })
    }

    /// Test connectivity by re-requesting an access grant.
    pub async fn ping(&self) -> Result<()> {
        fetch_access_grant(&self.http, &self.auth_url, &self.api_token).await?;
        Ok(())
    }

    /// Fetch the currently visible page of rows.
    ///
    /// The store returns a bounded page with no cursor; an empty page is the
    /// only way to observe an empty table. Transient failures are retried.
    pub async fn list_rows(&self, table: &str) -> Result<Vec<RemoteRow>> {
        let rows = backoff::future::retry(backoff_policy(&self.retry), || async {
            self.list_rows_once(table).await.map_err(|e| {
                if e.is_retryable() {
                    warn!("Listing rows of '{}' failed, will retry: {}", table, e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await?;

        debug!("Listed {} rows of '{}'", rows.len(), table);
        Ok(rows)
    }

    async fn list_rows_once(&self, table: &str) -> Result<Vec<RemoteRow>> {
        let mut url = self.rows_url("rows/")?;
        url.query_pairs_mut().append_pair("table_name", table);

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| Error::api("List rows request failed", e))?;
        let response = expect_success(response, "List rows").await?;

        let page: RowsPage = response
            .json()
            .await
            .map_err(|e| Error::api("List rows returned malformed JSON", e))?;
        Ok(page.rows)
    }

    /// Delete a batch of rows by identifier.
    #[instrument(skip(self, row_ids), fields(table = %table, count = row_ids.len()))]
    pub async fn batch_delete_rows(&self, table: &str, row_ids: &[String]) -> Result<()> {
        let response = self
            .http
            .delete(self.rows_url("batch-delete-rows/")?)
            .header(AUTHORIZATION, self.bearer())
            .json(&json!({ "table_name": table, "row_ids": row_ids }))
            .send()
            .await
            .map_err(|e| Error::api("Batch delete request failed", e))?;
        expect_success(response, "Batch delete").await?;
        Ok(())
    }

    /// Delete a single row by identifier.
    pub async fn delete_row(&self, table: &str, row_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.rows_url("rows/")?)
            .header(AUTHORIZATION, self.bearer())
            .json(&json!({ "table_name": table, "row_id": row_id }))
            .send()
            .await
            .map_err(|e| Error::api("Delete row request failed", e))?;
        expect_success(response, "Delete row").await?;
        Ok(())
    }

    /// Append a batch of records to the table.
    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    pub async fn batch_append_rows(&self, table: &str, rows: &[Record]) -> Result<()> {
        let response = self
            .http
            .post(self.rows_url("batch-append-rows/")?)
            .header(AUTHORIZATION, self.bearer())
            .json(&json!({ "table_name": table, "rows": rows }))
            .send()
            .await
            .map_err(|e| Error::api("Batch append request failed", e))?;
        expect_success(response, "Batch append").await?;
        Ok(())
    }

    fn rows_url(&self, endpoint: &str) -> Result<Url> {
        self.rows_base
            .join(endpoint)
            .map_err(|e| Error::config(format!("Invalid endpoint '{}': {}", endpoint, e)))
    }

    fn bearer(&self) -> String {
        format!("Token {}", self.access_token)
    }
}

async fn fetch_access_grant(
    http: &reqwest::Client,
    auth_url: &Url,
    api_token: &str,
) -> Result<AccessGrant> {
    let response = http
        .get(auth_url.clone())
        .header(AUTHORIZATION, format!("Token {}", api_token))
        .send()
        .await
        .map_err(|e| Error::api("App access token request failed", e))?;
    let response = expect_success(response, "App access token").await?;

    response
        .json()
        .await
        .map_err(|e| Error::api("App access token returned malformed JSON", e))
}

async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(Error::api_status(
        format!("{} failed with {}: {}", what, status, body),
        status.as_u16(),
    ))
}

/// Parse a base URL, forcing a trailing slash so joins keep the full path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| Error::config(format!("Invalid URL '{}': {}", raw, e)))
}

/// Exponential backoff for idempotent requests, from the retry config.
fn backoff_policy(config: &RetryConfig) -> ExponentialBackoff {
    let mut builder = ExponentialBackoffBuilder::new();
    builder
        .with_initial_interval(config.initial_backoff())
        .with_max_interval(config.max_backoff())
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(Some(Duration::from_secs(300)));
    if !config.jitter {
        builder.with_randomization_factor(0.0);
    }
    builder.build()
}
