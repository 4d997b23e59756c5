//! Pocket API HTTP client
//!
//! Provides paginated access to `/v3/get` and the `/v3/stats` counters.
//! Uses synchronous HTTP (ureq) with a global timeout. Every failure is
//! mapped to a [`RemoteError`] so the retry controller can classify it.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::cell::Cell;
use std::time::Duration;
use ureq::Agent;

use super::api::{Page, RateHeaders, StatsResponse};
use super::normalize::int_field;
use crate::error::RemoteError;
use crate::sync::{Batch, Continuation, ItemSource};

/// Pocket API client for fetching saved items
pub struct PocketClient {
    agent: Agent,
    consumer_key: String,
    access_token: String,
    /// Shrinks when the server rejects a page as too large
    page_size: Cell<usize>,
}

impl PocketClient {
    /// Pocket API base URL
    const BASE_URL: &'static str = "https://getpocket.com/v3";

    /// Smallest page size the client will fall back to
    pub const MIN_PAGE_SIZE: usize = 10;

    /// Default number of items requested per page
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    /// Create a new client
    ///
    /// # Arguments
    /// * `consumer_key` - Pocket application consumer key
    /// * `access_token` - User access token from the authorize handshake
    /// * `timeout` - Upper bound on each HTTP call, including the body read
    pub fn new(
        consumer_key: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
            consumer_key: consumer_key.into(),
            access_token: access_token.into(),
            page_size: Cell::new(Self::DEFAULT_PAGE_SIZE),
        }
    }

    /// Set the number of items requested per page
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.page_size.set(page_size.max(Self::MIN_PAGE_SIZE));
        self
    }

    /// Current page size
    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    /// Fetch account counters
    pub fn fetch_stats(&self) -> Result<StatsResponse, RemoteError> {
        let body = self.post("stats", self.auth_form())?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::Transient(format!("malformed stats response: {e}")))?;

        let count = |key: &str| int_field(&value, key).unwrap_or(0).max(0) as u64;
        Ok(StatsResponse {
            count_list: count("count_list"),
            count_read: count("count_read"),
            count_unread: count("count_unread"),
        })
    }

    fn auth_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("consumer_key", self.consumer_key.clone()),
            ("access_token", self.access_token.clone()),
        ]
    }

    /// Request one page of `/v3/get` and return the raw body
    fn request_page(
        &self,
        since: DateTime<Utc>,
        offset: usize,
        count: usize,
    ) -> Result<String, RemoteError> {
        let mut form = self.auth_form();
        form.extend([
            ("state", "all".to_string()),
            ("sort", "oldest".to_string()),
            ("detailType", "complete".to_string()),
            ("count", count.to_string()),
            ("offset", offset.to_string()),
        ]);
        if since.timestamp() > 0 {
            form.push(("since", since.timestamp().to_string()));
        }

        debug!(
            "[API] Requesting /get offset={} count={} since={}",
            offset,
            count,
            since.timestamp()
        );
        self.post("get", form)
    }

    /// POST a form to an endpoint, classifying the HTTP outcome
    fn post(&self, endpoint: &str, form: Vec<(&'static str, String)>) -> Result<String, RemoteError> {
        let url = format!("{}/{}", Self::BASE_URL, endpoint);

        let mut response = self
            .agent
            .post(&url)
            .header("X-Accept", "application/json")
            .send_form(form)
            .map_err(|e| RemoteError::Transient(format!("request to /{endpoint} failed: {e}")))?;

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let rate = RateHeaders {
            retry_after: header("Retry-After"),
            user_remaining: header("X-Limit-User-Remaining"),
            user_reset: header("X-Limit-User-Reset"),
        };
        let x_error = header("X-Error");

        debug!("[API] /{} responded {}", endpoint, status);

        if let Some(error) = classify_status(status, &rate, x_error.as_deref()) {
            return Err(error);
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| RemoteError::Transient(format!("failed to read /{endpoint} body: {e}")))
    }

    /// Request one page, halving the page size while Pocket rejects it as too large
    ///
    /// `request` receives the page size to ask for and returns the raw body.
    fn fetch_shrinking(
        &self,
        offset: usize,
        mut request: impl FnMut(usize) -> Result<String, RemoteError>,
    ) -> Result<Batch, RemoteError> {
        loop {
            let count = self.page_size.get();
            let page = match request(count) {
                Ok(body) => parse_page(&body)?,
                Err(RemoteError::PayloadTooLarge(message)) => Page::TooLarge(message),
                Err(e) => return Err(e),
            };

            match page {
                Page::Items(items) => {
                    debug!("[API] Page at offset {} returned {} items", offset, items.len());
                    let next = (!items.is_empty()).then(|| Continuation {
                        offset: offset + items.len(),
                    });
                    return Ok(Batch { items, next });
                }
                Page::TooLarge(message) => {
                    let Some(reduced) = reduced_page_size(count) else {
                        return Err(RemoteError::PayloadTooLarge(format!(
                            "even the minimum page size ({}) is too large: {}",
                            Self::MIN_PAGE_SIZE,
                            message
                        )));
                    };
                    warn!(
                        "[API] Payload too large, reducing page size from {} to {}",
                        count, reduced
                    );
                    self.page_size.set(reduced);
                }
            }
        }
    }
}

impl ItemSource for PocketClient {
    fn fetch(
        &self,
        since: DateTime<Utc>,
        continuation: Option<Continuation>,
    ) -> Result<Batch, RemoteError> {
        let offset = continuation.map_or(0, |c| c.offset);
        self.fetch_shrinking(offset, |count| self.request_page(since, offset, count))
    }
}

/// Next page size to try after a payload-too-large rejection
fn reduced_page_size(current: usize) -> Option<usize> {
    (current > PocketClient::MIN_PAGE_SIZE).then(|| (current / 2).max(PocketClient::MIN_PAGE_SIZE))
}

/// Map an HTTP status and its headers to a remote error, if any
///
/// `x_error` is Pocket's `X-Error` header, used for the message.
pub fn classify_status(status: u16, rate: &RateHeaders, x_error: Option<&str>) -> Option<RemoteError> {
    let message = || match x_error {
        Some(detail) => format!("HTTP {status}: {detail}"),
        None => format!("HTTP {status}"),
    };

    let user_exhausted = rate.user_remaining.as_deref().map(str::trim) == Some("0");

    match status {
        200..=299 => None,
        429 => Some(rate_limited(rate, message())),
        403 if user_exhausted => Some(rate_limited(rate, message())),
        401 => Some(RemoteError::Unauthorized(message())),
        413 => Some(RemoteError::PayloadTooLarge(message())),
        500..=599 => Some(RemoteError::Transient(message())),
        _ => Some(RemoteError::Fatal(message())),
    }
}

fn rate_limited(rate: &RateHeaders, message: String) -> RemoteError {
    let seconds = |value: &Option<String>| value.as_deref().and_then(|v| v.trim().parse::<u64>().ok());
    let retry_after = seconds(&rate.retry_after)
        .or_else(|| seconds(&rate.user_reset))
        .map(Duration::from_secs);
    RemoteError::RateLimited {
        retry_after,
        message,
    }
}

/// Decode a `/v3/get` response body
///
/// `list` may be an object keyed by item id, an array (Pocket sends `[]`
/// when nothing matches) or absent. A present, non-null `error` is either a
/// page-size rejection or a fatal API error.
pub fn parse_page(body: &str) -> Result<Page, RemoteError> {
    let page: Value = serde_json::from_str(body)
        .map_err(|e| RemoteError::Transient(format!("malformed /get response: {e}")))?;

    if let Some(error) = page.get("error").filter(|e| !e.is_null()) {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if message.contains("413") || message.contains("Payload Too Large") {
            return Ok(Page::TooLarge(message));
        }
        return Err(RemoteError::Fatal(format!("Pocket API error: {message}")));
    }

    let items = match page.get("list") {
        Some(Value::Object(map)) => {
            let mut items: Vec<Value> = map.values().cloned().collect();
            items.sort_by_key(|item| int_field(item, "sort_id").unwrap_or(i64::MAX));
            items
        }
        Some(Value::Array(list)) => list.clone(),
        _ => Vec::new(),
    };

    Ok(Page::Items(items))
}
