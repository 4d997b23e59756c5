//! Item model representing a saved Pocket article

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for an item (Pocket `item_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reading-list status of an item
///
/// Stored as Pocket's numeric code (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Unread,
    Archived,
    Deleted,
}

impl ItemStatus {
    /// Parse Pocket's numeric status code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unread),
            1 => Some(Self::Archived),
            2 => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Unread => 0,
            Self::Archived => 1,
            Self::Deleted => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    /// Accepts either the numeric code or the status name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code)
                .ok_or_else(|| format!("unknown status code '{}' (expected 0, 1 or 2)", trimmed));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "unread" => Ok(Self::Unread),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!(
                "unknown status '{}' (expected unread, archived or deleted)",
                trimmed
            )),
        }
    }
}

/// An article author referenced by an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub author_id: i64,
    pub name: String,
    pub url: Option<String>,
}

/// A saved article, normalized from its raw Pocket payload
///
/// Every normalized field is optional: Pocket sends partial payloads
/// (for example a bare `item_id` + `status` for deleted items), and the
/// store keeps previously known values for fields a payload leaves out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub status: Option<ItemStatus>,
    pub favorite: Option<bool>,
    pub given_url: Option<String>,
    pub resolved_url: Option<String>,
    pub given_title: Option<String>,
    pub resolved_title: Option<String>,
    pub excerpt: Option<String>,
    pub lang: Option<String>,
    pub domain: Option<String>,
    pub word_count: Option<i64>,
    pub time_to_read: Option<i64>,
    pub time_added: Option<DateTime<Utc>>,
    pub time_updated: Option<DateTime<Utc>>,
    pub time_read: Option<DateTime<Utc>>,
    pub time_favorited: Option<DateTime<Utc>>,
    pub time_deleted: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub authors: Vec<Author>,
    /// Raw payload as received from the API
    pub raw: serde_json::Value,
}

impl Item {
    /// Create an item with no normalized fields set
    pub fn new(id: impl Into<ItemId>, raw: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            status: None,
            favorite: None,
            given_url: None,
            resolved_url: None,
            given_title: None,
            resolved_title: None,
            excerpt: None,
            lang: None,
            domain: None,
            word_count: None,
            time_to_read: None,
            time_added: None,
            time_updated: None,
            time_read: None,
            time_favorited: None,
            time_deleted: None,
            tags: BTreeSet::new(),
            authors: Vec::new(),
            raw,
        }
    }

    /// Best available URL (resolved, then given)
    pub fn url(&self) -> Option<&str> {
        self.resolved_url
            .as_deref()
            .or(self.given_url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Best available title (resolved, then given)
    pub fn title(&self) -> Option<&str> {
        self.resolved_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.given_title.as_deref().filter(|t| !t.is_empty()))
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite.unwrap_or(false)
    }
}
