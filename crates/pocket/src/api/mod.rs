//! Pocket API integration
//!
//! This module provides:
//! - The request-token / authorize handshake
//! - A paginated client for `/v3/get` implementing [`ItemSource`](crate::sync::ItemSource)
//! - Payload normalization to domain models

mod auth;
mod client;
mod normalize;

pub use auth::{AccessGrant, PocketAuth};
pub use client::{PocketClient, classify_status, parse_page};
pub use normalize::normalize_item;

/// Pocket API response types
pub mod api {
    use serde::Deserialize;

    /// Account counters from `/v3/stats`
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct StatsResponse {
        /// Every saved item, in any state
        pub count_list: u64,
        pub count_read: u64,
        pub count_unread: u64,
    }

    /// Response from `/v3/oauth/request`
    #[derive(Debug, Deserialize)]
    pub struct RequestTokenResponse {
        pub code: String,
    }

    /// Response from `/v3/oauth/authorize`
    #[derive(Debug, Deserialize)]
    pub struct AuthorizeResponse {
        pub access_token: String,
        pub username: String,
    }

    /// Rate limit headers attached to a response
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct RateHeaders {
        /// `Retry-After`, in seconds
        pub retry_after: Option<String>,
        /// `X-Limit-User-Remaining`
        pub user_remaining: Option<String>,
        /// `X-Limit-User-Reset`, seconds until the window resets
        pub user_reset: Option<String>,
    }

    /// Outcome of decoding one `/v3/get` response body
    #[derive(Debug, Clone, PartialEq)]
    pub enum Page {
        /// Raw item payloads in listing order
        Items(Vec<serde_json::Value>),
        /// The server refused the page size; carries its message
        TooLarge(String),
    }
}
