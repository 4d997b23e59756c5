//! In-memory storage implementation
//!
//! Mirrors the SQLite store's merge semantics. Used by tests and by callers
//! that want a throwaway store.

use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::traits::{ItemFilter, ItemStore, ItemTag, MergeResult, Window};
use crate::models::{Item, ItemId, SyncState};

/// In-memory implementation of ItemStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryItemStore {
    items: RwLock<HashMap<String, Item>>,
    sync_state: RwLock<Option<SyncState>>,
}

impl InMemoryItemStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            sync_state: RwLock::new(None),
        }
    }

    fn merge_locked(items: &mut HashMap<String, Item>, batch: &[Item]) -> MergeResult {
        let mut result = MergeResult::default();
        let mut seen = HashSet::new();
        for incoming in batch {
            let first_in_batch = seen.insert(incoming.id.as_str());
            let mut incoming = incoming.clone();
            incoming.authors.sort_by_key(|a| a.author_id);
            incoming.authors.dedup_by_key(|a| a.author_id);

            match items.get_mut(incoming.id.as_str()) {
                Some(existing) => {
                    merge_item(existing, incoming);
                    if first_in_batch {
                        result.updated += 1;
                    }
                }
                None => {
                    items.insert(incoming.id.as_str().to_string(), incoming);
                    result.inserted += 1;
                }
            }
        }
        result
    }

    /// All items matching `filter` in listing order
    fn sorted_matching(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        let mut matching: Vec<Item> = items.values().filter(|i| filter.matches(i)).cloned().collect();
        matching.sort_by(|a, b| (a.time_added, &a.id).cmp(&(b.time_added, &b.id)));
        Ok(matching)
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `incoming` over `existing`, keeping fields the new payload lacks
fn merge_item(existing: &mut Item, incoming: Item) {
    fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
        if value.is_some() {
            *slot = value;
        }
    }

    keep(&mut existing.status, incoming.status);
    keep(&mut existing.favorite, incoming.favorite);
    keep(&mut existing.given_url, incoming.given_url);
    keep(&mut existing.resolved_url, incoming.resolved_url);
    keep(&mut existing.given_title, incoming.given_title);
    keep(&mut existing.resolved_title, incoming.resolved_title);
    keep(&mut existing.excerpt, incoming.excerpt);
    keep(&mut existing.lang, incoming.lang);
    keep(&mut existing.domain, incoming.domain);
    keep(&mut existing.word_count, incoming.word_count);
    keep(&mut existing.time_to_read, incoming.time_to_read);
    keep(&mut existing.time_read, incoming.time_read);
    keep(&mut existing.time_favorited, incoming.time_favorited);
    keep(&mut existing.time_deleted, incoming.time_deleted);

    // Option's ordering puts None first, so max keeps the newest known value
    existing.time_added = existing.time_added.max(incoming.time_added);
    existing.time_updated = existing.time_updated.max(incoming.time_updated);

    existing.tags = incoming.tags;
    existing.authors = incoming.authors;
    existing.raw = incoming.raw;
}

fn apply_window<T>(rows: Vec<T>, window: Window) -> Vec<T> {
    let iter = rows.into_iter().skip(window.offset);
    match window.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

impl ItemStore for InMemoryItemStore {
    fn merge(&self, items: &[Item]) -> Result<MergeResult> {
        let mut stored = self.items.write().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(Self::merge_locked(&mut stored, items))
    }

    fn commit_batch(&self, items: &[Item], state: &SyncState) -> Result<MergeResult> {
        let mut stored = self.items.write().map_err(|_| anyhow!("item lock poisoned"))?;
        let mut sync_state = self
            .sync_state
            .write()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        let result = Self::merge_locked(&mut stored, items);
        *sync_state = Some(state.clone());
        Ok(result)
    }

    fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.get(id.as_str()).cloned())
    }

    fn has_item(&self, id: &ItemId) -> Result<bool> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.contains_key(id.as_str()))
    }

    fn count_items(&self, filter: &ItemFilter) -> Result<usize> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.values().filter(|i| filter.matches(i)).count())
    }

    fn list_items(&self, filter: &ItemFilter, window: Window) -> Result<Vec<Item>> {
        Ok(apply_window(self.sorted_matching(filter)?, window))
    }

    fn count_item_tags(&self) -> Result<usize> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.values().map(|i| i.tags.len()).sum())
    }

    fn list_item_tags(&self, window: Window) -> Result<Vec<ItemTag>> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        let mut rows: Vec<ItemTag> = items
            .values()
            .flat_map(|item| {
                item.tags.iter().map(|tag| ItemTag {
                    item_id: item.id.as_str().to_string(),
                    tag: tag.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| (&a.item_id, &a.tag).cmp(&(&b.item_id, &b.tag)));
        Ok(apply_window(rows, window))
    }

    fn search_items(&self, query: &str, limit: usize) -> Result<Vec<Item>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self
            .sorted_matching(&ItemFilter::default())?
            .into_iter()
            .filter(|item| {
                let haystack = format!(
                    "{} {}",
                    item.resolved_title.as_deref().unwrap_or_default(),
                    item.excerpt.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                terms.iter().all(|term| haystack.contains(term.as_str()))
            })
            .take(limit)
            .collect();
        Ok(hits)
    }

    fn get_sync_state(&self) -> Result<Option<SyncState>> {
        let state = self
            .sync_state
            .read()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        Ok(state.clone())
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        let mut slot = self
            .sync_state
            .write()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        *slot = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items
            .write()
            .map_err(|_| anyhow!("item lock poisoned"))?
            .clear();
        *self
            .sync_state
            .write()
            .map_err(|_| anyhow!("sync state lock poisoned"))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_test_item(id: &str, added: i64) -> Item {
        let mut item = Item::new(id, json!({ "item_id": id }));
        item.status = Some(ItemStatus::Unread);
        item.resolved_title = Some(format!("Article {id}"));
        item.time_added = Some(ts(added));
        item.time_updated = Some(ts(added));
        item.tags = ["reading".to_string()].into();
        item
    }

    #[test]
    fn test_merge_counts_inserts_and_updates() {
        let store = InMemoryItemStore::new();
        let result = store
            .merge(&[make_test_item("a", 10), make_test_item("b", 20)])
            .unwrap();
        assert_eq!(result.inserted, 2);

        let result = store.merge(&[make_test_item("a", 10)]).unwrap();
        assert_eq!(result.inserted, 0);
        assert_eq!(result.updated, 1);
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 2);
    }

    #[test]
    fn test_repeated_id_counts_once() {
        let store = InMemoryItemStore::new();
        store.merge(&[make_test_item("a", 10)]).unwrap();

        let result = store
            .merge(&[
                make_test_item("a", 10),
                make_test_item("b", 20),
                make_test_item("a", 10),
                make_test_item("b", 20),
            ])
            .unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 2);
    }

    #[test]
    fn test_partial_merge_keeps_known_fields() {
        let store = InMemoryItemStore::new();
        store.merge(&[make_test_item("a", 10)]).unwrap();

        let mut partial = Item::new("a", json!({ "item_id": "a", "status": "1" }));
        partial.status = Some(ItemStatus::Archived);
        store.merge(&[partial]).unwrap();

        let item = store.get_item(&ItemId::new("a")).unwrap().unwrap();
        assert_eq!(item.status, Some(ItemStatus::Archived));
        assert_eq!(item.resolved_title.as_deref(), Some("Article a"));
        assert_eq!(item.time_added, Some(ts(10)));
        assert!(item.tags.is_empty());
    }

    #[test]
    fn test_list_items_orders_by_time_added() {
        let store = InMemoryItemStore::new();
        store
            .merge(&[
                make_test_item("c", 30),
                make_test_item("a", 10),
                make_test_item("b", 20),
            ])
            .unwrap();

        let listed = store
            .list_items(&ItemFilter::default(), Window::new(1, Some(5)))
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_search_matches_all_terms() {
        let store = InMemoryItemStore::new();
        let mut item = make_test_item("a", 10);
        item.excerpt = Some("Rust ownership explained".to_string());
        store.merge(&[item, make_test_item("b", 20)]).unwrap();

        assert_eq!(store.search_items("rust OWNERSHIP", 10).unwrap().len(), 1);
        assert!(store.search_items("rust python", 10).unwrap().is_empty());
    }

    #[test]
    fn test_commit_batch_sets_state() {
        let store = InMemoryItemStore::new();
        store
            .commit_batch(&[make_test_item("a", 10)], &SyncState::new(ts(10)))
            .unwrap();
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(10));

        store.clear().unwrap();
        assert!(store.get_sync_state().unwrap().is_none());
        assert!(!store.has_item(&ItemId::new("a")).unwrap());
    }
}
