//! Storage trait definitions

use crate::models::{Item, ItemId, ItemStatus, SyncState};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Outcome of merging a batch of items
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    /// Items whose key was not yet stored
    pub inserted: usize,
    /// Items that overwrote an existing row
    pub updated: usize,
}

impl MergeResult {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for MergeResult {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// Predicate on normalized item columns
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    /// When `Some(true)`, only favorites; `Some(false)`, only non-favorites
    pub favorite: Option<bool>,
}

impl ItemFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.favorite.is_none()
    }

    /// Evaluate the filter against an item
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(status) = self.status
            && item.status != Some(status)
        {
            return false;
        }
        if let Some(favorite) = self.favorite
            && item.is_favorite() != favorite
        {
            return false;
        }
        true
    }
}

/// Offset/limit window over an ordered listing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    /// `None` means no upper bound
    pub limit: Option<usize>,
}

impl Window {
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }

    /// Number of rows this window selects out of `total`
    pub fn span(&self, total: usize) -> usize {
        let remaining = total.saturating_sub(self.offset);
        self.limit.map_or(remaining, |limit| remaining.min(limit))
    }
}

/// A row of the `item_tags` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTag {
    pub item_id: String,
    pub tag: String,
}

/// Trait for item storage operations
///
/// All item mutations go through [`ItemStore::merge`] or
/// [`ItemStore::commit_batch`]; both apply a whole batch atomically.
pub trait ItemStore: Send + Sync {
    /// Upsert a batch of items in one atomic unit
    fn merge(&self, items: &[Item]) -> Result<MergeResult>;

    /// Upsert a batch of items and persist the advanced cursor atomically
    fn commit_batch(&self, items: &[Item], state: &SyncState) -> Result<MergeResult>;

    /// Get an item by ID
    fn get_item(&self, id: &ItemId) -> Result<Option<Item>>;

    /// Check if an item exists
    fn has_item(&self, id: &ItemId) -> Result<bool>;

    /// Count items matching a filter
    fn count_items(&self, filter: &ItemFilter) -> Result<usize>;

    /// List items matching a filter, ordered by time_added then item_id
    fn list_items(&self, filter: &ItemFilter, window: Window) -> Result<Vec<Item>>;

    /// Count rows in the item_tags table
    fn count_item_tags(&self) -> Result<usize>;

    /// List item_tags rows, ordered by item_id then tag
    fn list_item_tags(&self, window: Window) -> Result<Vec<ItemTag>>;

    /// Full-text search over titles and excerpts
    fn search_items(&self, query: &str, limit: usize) -> Result<Vec<Item>>;

    /// Get the persisted sync cursor
    fn get_sync_state(&self) -> Result<Option<SyncState>>;

    /// Save the sync cursor (upsert)
    fn save_sync_state(&self, state: &SyncState) -> Result<()>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
