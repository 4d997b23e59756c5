//! Pocket API payload normalization
//!
//! Converts raw Pocket item payloads to [`Item`] models. Pocket encodes most
//! numbers as strings and uses `"0"` for unset timestamps.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::RemoteError;
use crate::models::{Author, Item, ItemId, ItemStatus};

/// Normalize a raw Pocket payload to an Item
///
/// Only `item_id` is required; every other field is optional.
pub fn normalize_item(raw: Value) -> Result<Item, RemoteError> {
    let id = raw
        .get("item_id")
        .and_then(scalar_string)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RemoteError::Fatal("item payload has no item_id".to_string()))?;

    let mut item = Item::new(ItemId::new(id), Value::Null);

    item.status = int_field(&raw, "status").and_then(ItemStatus::from_code);
    item.favorite = int_field(&raw, "favorite").map(|f| f != 0);
    item.given_url = text_field(&raw, "given_url");
    item.resolved_url = text_field(&raw, "resolved_url");
    item.given_title = text_field(&raw, "given_title");
    item.resolved_title = text_field(&raw, "resolved_title");
    item.excerpt = text_field(&raw, "excerpt");
    item.lang = text_field(&raw, "lang");
    item.word_count = int_field(&raw, "word_count");
    item.time_to_read = int_field(&raw, "time_to_read");

    item.time_added = time_field(&raw, "time_added");
    item.time_updated = time_field(&raw, "time_updated");
    item.time_read = time_field(&raw, "time_read");
    item.time_favorited = time_field(&raw, "time_favorited");
    if item.status == Some(ItemStatus::Deleted) {
        item.time_deleted = item.time_updated;
    }

    item.domain = raw
        .get("domain_metadata")
        .and_then(|meta| text_field(meta, "name"))
        .or_else(|| item.url().and_then(host_of));

    if let Some(tags) = raw.get("tags").and_then(Value::as_object) {
        item.tags = tags
            .iter()
            .map(|(key, tag)| text_field(tag, "tag").unwrap_or_else(|| key.clone()))
            .collect();
    }

    if let Some(authors) = raw.get("authors").and_then(Value::as_object) {
        item.authors = authors.values().filter_map(parse_author).collect();
    }

    item.raw = raw;
    Ok(item)
}

/// Render a string or number as a string
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty text field
fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer field encoded as a JSON number or numeric string
pub(super) fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unix timestamp field; zero means unset
fn time_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    int_field(value, key)
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.trim_start_matches("www.").to_string())
}

fn parse_author(value: &Value) -> Option<Author> {
    Some(Author {
        author_id: int_field(value, "author_id")?,
        name: text_field(value, "name").unwrap_or_default(),
        url: text_field(value, "url"),
    })
}
