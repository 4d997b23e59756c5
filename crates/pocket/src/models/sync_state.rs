//! Sync state tracking for incremental Pocket sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The "since" cursor plus bookkeeping for the last sync run
///
/// Persisted separately from items to enable incremental sync.
/// Only one SyncState per database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Maximum `time_updated` seen across all merged items
    pub since: DateTime<Utc>,
    /// When a batch was last committed
    pub last_sync_at: DateTime<Utc>,
    /// Schema version for migrations
    pub sync_version: u32,
    /// Whether a full sync has run to completion
    #[serde(default)]
    pub full_sync_complete: bool,
}

impl SyncState {
    /// Create a SyncState with the given cursor
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            since,
            last_sync_at: Utc::now(),
            sync_version: 1,
            full_sync_complete: false,
        }
    }

    /// Cursor value used when nothing has been synced yet
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    /// Advance the cursor to `candidate` if it is newer
    ///
    /// The cursor never moves backwards.
    pub fn advanced(mut self, candidate: Option<DateTime<Utc>>) -> Self {
        if let Some(candidate) = candidate
            && candidate > self.since
        {
            self.since = candidate;
        }
        self.last_sync_at = Utc::now();
        self
    }

    /// Mark a full sync as complete
    pub fn mark_full_complete(mut self) -> Self {
        self.last_sync_at = Utc::now();
        self.full_sync_complete = true;
        self
    }

    /// Whether the cursor has moved past the epoch
    pub fn has_cursor(&self) -> bool {
        self.since > Self::epoch()
    }
}
