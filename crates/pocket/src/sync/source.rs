//! Remote item source abstraction

use chrono::{DateTime, Utc};

use crate::error::RemoteError;

/// Opaque marker for the next page of a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    /// Number of items already returned for this listing
    pub offset: usize,
}

/// One page of raw payloads plus the marker for the page after it
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub items: Vec<serde_json::Value>,
    /// `None` when the source has nothing further to return
    pub next: Option<Continuation>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A paginated source of raw item payloads
///
/// Implementations must be safe to call repeatedly with the same arguments;
/// fetches are read-only and are retried on transient failures.
pub trait ItemSource {
    /// Fetch the page after `continuation` of items updated since `since`
    fn fetch(
        &self,
        since: DateTime<Utc>,
        continuation: Option<Continuation>,
    ) -> Result<Batch, RemoteError>;
}
