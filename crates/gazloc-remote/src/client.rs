//! HTTP client for the hosted vendor table.
//!
//! Listing: `GET {base}/rest/v1/{table}?select=*`, a JSON array of rows.
//! Change feed: `GET {base}/realtime/v1/{table}/changes`, a long-lived body
//! of newline-delimited change envelopes. Both carry the project key as
//! `apikey` and as a bearer token when one is configured.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use gazloc_core::{AppConfig, ChangeEvent, VendorSet};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::RemoteError;
use crate::retry::retry_with_backoff;
use crate::source::RemoteDirectory;
use crate::subscription::Subscription;
use crate::wire::{parse_feed_line, parse_vendor_rows};

/// Connection settings for [`RemoteDirectoryClient`].
#[derive(Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub table: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub resubscribe_delay: Duration,
}

impl RemoteConfig {
    /// Settings with the stock defaults; useful for pointing at a mock server.
    #[must_use]
    pub fn new(base_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            table: table.into(),
            request_timeout_secs: 30,
            user_agent: "gazloc/0.1 (vendor-directory)".to_owned(),
            max_retries: 3,
            backoff_base_secs: 1,
            resubscribe_delay: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.remote_url.clone(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
            request_timeout_secs: config.request_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_retries: config.fetch_max_retries,
            backoff_base_secs: config.fetch_backoff_base_secs,
            resubscribe_delay: Duration::from_secs(config.resubscribe_delay_secs),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("table", &self.table)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .field("resubscribe_delay", &self.resubscribe_delay)
            .finish_non_exhaustive()
    }
}

struct Inner {
    /// Bounded request timeout, for listings.
    client: Client,
    /// Connect timeout only; the feed body stays open indefinitely.
    stream_client: Client,
    rows_url: Url,
    changes_url: Url,
    table: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base_secs: u64,
    resubscribe_delay: Duration,
    active_feed: Mutex<Option<CancellationToken>>,
}

/// [`RemoteDirectory`] over HTTP. Cheap to clone.
#[derive(Clone)]
pub struct RemoteDirectoryClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RemoteDirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDirectoryClient")
            .field("rows_url", &self.inner.rows_url.as_str())
            .field("changes_url", &self.inner.changes_url.as_str())
            .field("api_key", &self.inner.api_key.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl RemoteDirectoryClient {
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] if the base URL is not an
    /// `http(s)` URL or the table name is unusable, and
    /// [`RemoteError::Http`] if a `reqwest::Client` cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let invalid = |reason: String| RemoteError::InvalidUrl {
            url: config.base_url.clone(),
            reason,
        };

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", config.base_url.trim().trim_end_matches('/'));
        let base = Url::parse(&normalised).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }

        let table = config.table.trim();
        if table.is_empty() || table.contains(['/', '?', '#']) {
            return Err(invalid(format!("unusable table name '{}'", config.table)));
        }

        let mut rows_url = base
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| invalid(e.to_string()))?;
        rows_url.query_pairs_mut().append_pair("select", "*");
        let changes_url = base
            .join(&format!("realtime/v1/{table}/changes"))
            .map_err(|e| invalid(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                stream_client,
                rows_url,
                changes_url,
                table: table.to_owned(),
                api_key: config.api_key.filter(|k| !k.trim().is_empty()),
                max_retries: config.max_retries,
                backoff_base_secs: config.backoff_base_secs,
                resubscribe_delay: config.resubscribe_delay,
                active_feed: Mutex::new(None),
            }),
        })
    }

    /// # Errors
    ///
    /// See [`RemoteDirectoryClient::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, RemoteError> {
        Self::new(RemoteConfig::from_app_config(config))
    }

    #[must_use]
    pub fn rows_url(&self) -> &Url {
        &self.inner.rows_url
    }

    #[must_use]
    pub fn changes_url(&self) -> &Url {
        &self.inner.changes_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.inner.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn fetch_rows(&self) -> Result<Vec<Value>, RemoteError> {
        let url = &self.inner.rows_url;
        let response = self
            .authorized(self.inner.client.get(url.clone()))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body = check_status(response)?.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Deserialize {
            context: format!("vendor listing from {url}"),
            source: e,
        })
    }

    /// Reads one connection's worth of the feed. `Ok(())` means the server
    /// ended the body.
    async fn stream_changes<E>(
        &self,
        token: &CancellationToken,
        on_event: &mut E,
    ) -> Result<(), RemoteError>
    where
        E: FnMut(ChangeEvent) + Send,
    {
        let response = self
            .authorized(self.inner.stream_client.get(self.inner.changes_url.clone()))
            .header(ACCEPT, "application/x-ndjson")
            .send()
            .await?;
        let response = check_status(response)?;
        tracing::info!(table = %self.inner.table, "change feed connected");

        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = body.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                dispatch_line(&line, token, on_event);
            }
        }
        if !pending.is_empty() {
            dispatch_line(&pending, token, on_event);
        }
        Ok(())
    }
}

fn dispatch_line<E>(line: &[u8], token: &CancellationToken, on_event: &mut E)
where
    E: FnMut(ChangeEvent),
{
    if token.is_cancelled() {
        return;
    }
    let text = String::from_utf8_lossy(line);
    match parse_feed_line(&text) {
        Ok(Some(event)) => {
            tracing::debug!(vendor = %event.id(), "change event received");
            on_event(event);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "skipping malformed change feed line"),
    }
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(RemoteError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        return Err(RemoteError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

impl RemoteDirectory for RemoteDirectoryClient {
    async fn fetch_all(&self) -> Result<VendorSet, RemoteError> {
        let rows = retry_with_backoff(self.inner.max_retries, self.inner.backoff_base_secs, || {
            self.fetch_rows()
        })
        .await?;
        let (vendors, skipped) = parse_vendor_rows(&rows);
        tracing::info!(
            table = %self.inner.table,
            vendors = vendors.len(),
            skipped,
            "fetched vendor directory"
        );
        Ok(vendors)
    }

    /// One feed per client: subscribing again cancels the previous feed.
    fn subscribe<E, F>(&self, mut on_event: E, mut on_error: F) -> Subscription
    where
        E: FnMut(ChangeEvent) + Send + 'static,
        F: FnMut(RemoteError) + Send + 'static,
    {
        let token = CancellationToken::new();
        let previous = self
            .inner
            .active_feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous.filter(|t| !t.is_cancelled()) {
            tracing::info!(table = %self.inner.table, "replacing existing change feed");
            previous.cancel();
        }

        let client = self.clone();
        let feed_token = token.clone();
        let task = tokio::spawn(async move {
            let delay = client.inner.resubscribe_delay;
            let mut resubscriptions: u64 = 0;
            loop {
                let outcome = tokio::select! {
                    () = feed_token.cancelled() => break,
                    outcome = client.stream_changes(&feed_token, &mut on_event) => outcome,
                };
                if feed_token.is_cancelled() {
                    break;
                }

                let err = match outcome {
                    Ok(()) => RemoteError::StreamClosed {
                        url: client.inner.changes_url.to_string(),
                    },
                    Err(e) => e,
                };
                resubscriptions += 1;
                tracing::warn!(
                    table = %client.inner.table,
                    resubscriptions,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "change feed interrupted, resubscribing after delay"
                );
                on_error(err);

                tokio::select! {
                    () = feed_token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            tracing::debug!(table = %client.inner.table, "change feed stopped");
        });

        Subscription::new(token, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_listing_and_feed_urls() {
        let client =
            RemoteDirectoryClient::new(RemoteConfig::new("https://db.example.com/", "vendors"))
                .unwrap();
        assert_eq!(
            client.rows_url().as_str(),
            "https://db.example.com/rest/v1/vendors?select=*"
        );
        assert_eq!(
            client.changes_url().as_str(),
            "https://db.example.com/realtime/v1/vendors/changes"
        );
    }

    #[test]
    fn keeps_base_path_prefix() {
        let client =
            RemoteDirectoryClient::new(RemoteConfig::new("http://localhost:9000/api", "vendors"))
                .unwrap();
        assert_eq!(
            client.rows_url().as_str(),
            "http://localhost:9000/api/rest/v1/vendors?select=*"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = RemoteDirectoryClient::new(RemoteConfig::new("ftp://db.example.com", "vendors"))
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_bad_table_name() {
        let err = RemoteDirectoryClient::new(RemoteConfig::new("https://db.example.com", "a/b"))
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidUrl { .. }));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut config = RemoteConfig::new("https://db.example.com", "vendors");
        config.api_key = Some("super-secret".to_owned());
        assert!(!format!("{config:?}").contains("super-secret"));
        let client = RemoteDirectoryClient::new(config).unwrap();
        assert!(!format!("{client:?}").contains("super-secret"));
    }
}
