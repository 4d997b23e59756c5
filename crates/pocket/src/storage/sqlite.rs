//! SQLite-based item storage with zstd-compressed raw payloads

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use rusqlite_migration::{M, Migrations};

use super::traits::{ItemFilter, ItemStore, ItemTag, MergeResult, Window};
use crate::models::{Author, Item, ItemId, ItemStatus, SyncState};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Single-row sync cursor
            CREATE TABLE sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                since INTEGER NOT NULL,
                last_sync_at TEXT NOT NULL,
                sync_version INTEGER NOT NULL DEFAULT 1,
                full_sync_complete INTEGER NOT NULL DEFAULT 0
            );

            -- Normalized item columns plus the zstd-compressed raw payload
            CREATE TABLE items (
                item_id TEXT PRIMARY KEY,
                status INTEGER,
                favorite INTEGER,
                given_url TEXT,
                resolved_url TEXT,
                given_title TEXT,
                resolved_title TEXT,
                excerpt TEXT,
                lang TEXT,
                domain TEXT,
                word_count INTEGER,
                time_to_read INTEGER,
                time_added INTEGER,
                time_updated INTEGER,
                time_read INTEGER,
                time_favorited INTEGER,
                time_deleted INTEGER,
                raw_payload BLOB NOT NULL
            );

            CREATE INDEX idx_items_status ON items(status);
            CREATE INDEX idx_items_favorite ON items(favorite);
            CREATE INDEX idx_items_time_added ON items(time_added ASC, item_id ASC);

            -- Tags on items (many-to-many, replaced per item on update)
            CREATE TABLE item_tags (
                item_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (item_id, tag),
                FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE
            );

            CREATE INDEX idx_item_tags_tag ON item_tags(tag);

            -- Authors, shared across items
            CREATE TABLE authors (
                author_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT
            );

            CREATE TABLE item_authors (
                item_id TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                PRIMARY KEY (item_id, author_id),
                FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES authors(author_id)
            );
            "#,
        ),
        // Migration 2: Full-text search over titles and excerpts
        M::up(
            r#"
            CREATE VIRTUAL TABLE items_fts USING fts5(
                resolved_title,
                excerpt,
                content='items',
                content_rowid='rowid'
            );

            INSERT INTO items_fts(rowid, resolved_title, excerpt)
                SELECT rowid, resolved_title, excerpt FROM items;

            CREATE TRIGGER items_fts_ai AFTER INSERT ON items BEGIN
                INSERT INTO items_fts(rowid, resolved_title, excerpt)
                VALUES (new.rowid, new.resolved_title, new.excerpt);
            END;

            CREATE TRIGGER items_fts_ad AFTER DELETE ON items BEGIN
                INSERT INTO items_fts(items_fts, rowid, resolved_title, excerpt)
                VALUES ('delete', old.rowid, old.resolved_title, old.excerpt);
            END;

            CREATE TRIGGER items_fts_au AFTER UPDATE ON items BEGIN
                INSERT INTO items_fts(items_fts, rowid, resolved_title, excerpt)
                VALUES ('delete', old.rowid, old.resolved_title, old.excerpt);
                INSERT INTO items_fts(rowid, resolved_title, excerpt)
                VALUES (new.rowid, new.resolved_title, new.excerpt);
            END;
            "#,
        ),
    ])
}

/// Columns selected for an item, in the order [`map_item_row`] reads them
const ITEM_COLUMNS: &str = "i.item_id, i.status, i.favorite, i.given_url, i.resolved_url,
     i.given_title, i.resolved_title, i.excerpt, i.lang, i.domain, i.word_count,
     i.time_to_read, i.time_added, i.time_updated, i.time_read, i.time_favorited,
     i.time_deleted, i.raw_payload";

/// Stable listing order shared with the in-memory store
const ITEM_ORDER: &str = "ORDER BY i.time_added ASC, i.item_id ASC";

/// zstd level for raw payloads (3 = good balance of speed vs compression)
const PAYLOAD_COMPRESSION_LEVEL: i32 = 3;

/// SQLite-based item storage
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Open (or create) a store at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // foreign_keys is off by default and the join tables cascade
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Run raw SQL against the connection
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Run the batch upsert inside `tx`
    fn merge_in_tx(tx: &Transaction<'_>, items: &[Item]) -> Result<MergeResult> {
        let mut result = MergeResult::default();
        let mut seen = HashSet::new();
        for item in items {
            let inserted = upsert_item(tx, item)
                .with_context(|| format!("Failed to upsert item {}", item.id))?;
            // A repeated id in the same batch is one stored row
            if !seen.insert(item.id.as_str()) {
                continue;
            }
            if inserted {
                result.inserted += 1;
            } else {
                result.updated += 1;
            }
        }
        Ok(result)
    }

    /// Load tags and authors and decompress the payload for a fetched row
    fn hydrate(conn: &Connection, row: ItemRow) -> Result<Item> {
        let ItemRow { mut item, payload } = row;

        let raw = zstd::decode_all(payload.as_slice())
            .with_context(|| format!("Failed to decompress payload for item {}", item.id))?;
        item.raw = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse payload for item {}", item.id))?;

        let mut stmt = conn.prepare("SELECT tag FROM item_tags WHERE item_id = ? ORDER BY tag")?;
        item.tags = stmt
            .query_map([item.id.as_str()], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT a.author_id, a.name, a.url FROM item_authors ia
             JOIN authors a ON a.author_id = ia.author_id
             WHERE ia.item_id = ?
             ORDER BY a.author_id",
        )?;
        item.authors = stmt
            .query_map([item.id.as_str()], |row| {
                Ok(Author {
                    author_id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(item)
    }

    fn query_items(conn: &Connection, sql: &str, args: Vec<Value>) -> Result<Vec<Item>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), map_item_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| Self::hydrate(conn, row))
            .collect()
    }
}

/// An item row before tags, authors and payload are loaded
struct ItemRow {
    item: Item,
    payload: Vec<u8>,
}

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    let mut item = Item::new(ItemId::new(row.get::<_, String>(0)?), serde_json::Value::Null);
    item.status = row.get::<_, Option<i64>>(1)?.and_then(ItemStatus::from_code);
    item.favorite = row.get::<_, Option<i64>>(2)?.map(|f| f != 0);
    item.given_url = row.get(3)?;
    item.resolved_url = row.get(4)?;
    item.given_title = row.get(5)?;
    item.resolved_title = row.get(6)?;
    item.excerpt = row.get(7)?;
    item.lang = row.get(8)?;
    item.domain = row.get(9)?;
    item.word_count = row.get(10)?;
    item.time_to_read = row.get(11)?;
    item.time_added = from_secs(row.get(12)?);
    item.time_updated = from_secs(row.get(13)?);
    item.time_read = from_secs(row.get(14)?);
    item.time_favorited = from_secs(row.get(15)?);
    item.time_deleted = from_secs(row.get(16)?);

    Ok(ItemRow {
        item,
        payload: row.get(17)?,
    })
}

fn to_secs(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

fn from_secs(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Insert or update one item; returns true when the row was new
///
/// Columns absent from the new payload keep their stored value, and
/// time_added/time_updated never move backwards. Tags and author links are
/// replaced wholesale.
fn upsert_item(tx: &Transaction<'_>, item: &Item) -> Result<bool> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM items WHERE item_id = ?)",
        [item.id.as_str()],
        |row| row.get(0),
    )?;

    let payload = serde_json::to_vec(&item.raw)?;
    let compressed = zstd::encode_all(payload.as_slice(), PAYLOAD_COMPRESSION_LEVEL)
        .context("Failed to compress raw payload")?;

    // ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: REPLACE deletes
    // the old row first, which would cascade into item_tags/item_authors and
    // drop the columns we want to preserve.
    tx.execute(
        "INSERT INTO items
         (item_id, status, favorite, given_url, resolved_url, given_title,
          resolved_title, excerpt, lang, domain, word_count, time_to_read,
          time_added, time_updated, time_read, time_favorited, time_deleted,
          raw_payload)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(item_id) DO UPDATE SET
            status = COALESCE(excluded.status, items.status),
            favorite = COALESCE(excluded.favorite, items.favorite),
            given_url = COALESCE(excluded.given_url, items.given_url),
            resolved_url = COALESCE(excluded.resolved_url, items.resolved_url),
            given_title = COALESCE(excluded.given_title, items.given_title),
            resolved_title = COALESCE(excluded.resolved_title, items.resolved_title),
            excerpt = COALESCE(excluded.excerpt, items.excerpt),
            lang = COALESCE(excluded.lang, items.lang),
            domain = COALESCE(excluded.domain, items.domain),
            word_count = COALESCE(excluded.word_count, items.word_count),
            time_to_read = COALESCE(excluded.time_to_read, items.time_to_read),
            time_added = MAX(COALESCE(excluded.time_added, items.time_added),
                             COALESCE(items.time_added, excluded.time_added)),
            time_updated = MAX(COALESCE(excluded.time_updated, items.time_updated),
                               COALESCE(items.time_updated, excluded.time_updated)),
            time_read = COALESCE(excluded.time_read, items.time_read),
            time_favorited = COALESCE(excluded.time_favorited, items.time_favorited),
            time_deleted = COALESCE(excluded.time_deleted, items.time_deleted),
            raw_payload = excluded.raw_payload",
        params![
            item.id.as_str(),
            item.status.map(ItemStatus::code),
            item.favorite,
            item.given_url,
            item.resolved_url,
            item.given_title,
            item.resolved_title,
            item.excerpt,
            item.lang,
            item.domain,
            item.word_count,
            item.time_to_read,
            to_secs(item.time_added),
            to_secs(item.time_updated),
            to_secs(item.time_read),
            to_secs(item.time_favorited),
            to_secs(item.time_deleted),
            compressed,
        ],
    )?;

    tx.execute("DELETE FROM item_tags WHERE item_id = ?", [item.id.as_str()])?;
    let mut stmt = tx.prepare("INSERT OR IGNORE INTO item_tags (item_id, tag) VALUES (?, ?)")?;
    for tag in &item.tags {
        stmt.execute(params![item.id.as_str(), tag])?;
    }

    tx.execute("DELETE FROM item_authors WHERE item_id = ?", [item.id.as_str()])?;
    let mut author_stmt = tx.prepare(
        "INSERT INTO authors (author_id, name, url) VALUES (?, ?, ?)
         ON CONFLICT(author_id) DO UPDATE SET name = excluded.name, url = excluded.url",
    )?;
    let mut link_stmt =
        tx.prepare("INSERT OR IGNORE INTO item_authors (item_id, author_id) VALUES (?, ?)")?;
    for author in &item.authors {
        author_stmt.execute(params![author.author_id, author.name, author.url])?;
        link_stmt.execute(params![item.id.as_str(), author.author_id])?;
    }

    Ok(!exists)
}

fn write_sync_state(conn: &Connection, state: &SyncState) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (id, since, last_sync_at, sync_version, full_sync_complete)
         VALUES (1, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            since = excluded.since,
            last_sync_at = excluded.last_sync_at,
            sync_version = excluded.sync_version,
            full_sync_complete = excluded.full_sync_complete",
        params![
            state.since.timestamp(),
            state.last_sync_at.to_rfc3339(),
            state.sync_version,
            state.full_sync_complete,
        ],
    )?;
    Ok(())
}

/// Build the WHERE clause for a filter
fn filter_clause(filter: &ItemFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("i.status = ?");
        args.push(Value::Integer(status.code()));
    }
    if let Some(favorite) = filter.favorite {
        conditions.push("COALESCE(i.favorite, 0) = ?");
        args.push(Value::Integer(i64::from(favorite)));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), args)
    }
}

/// Quote each search term so user input is never parsed as FTS5 syntax
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn window_args(window: Window) -> [Value; 2] {
    // LIMIT -1 means unbounded in SQLite
    let limit = window.limit.map_or(-1, |l| l as i64);
    [Value::Integer(limit), Value::Integer(window.offset as i64)]
}

impl ItemStore for SqliteItemStore {
    fn merge(&self, items: &[Item]) -> Result<MergeResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = Self::merge_in_tx(&tx, items)?;
        tx.commit().context("Failed to commit merge")?;
        debug!(
            "[STORE] Merged {} items ({} new, {} updated)",
            items.len(),
            result.inserted,
            result.updated
        );
        Ok(result)
    }

    fn commit_batch(&self, items: &[Item], state: &SyncState) -> Result<MergeResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = Self::merge_in_tx(&tx, items)?;
        write_sync_state(&tx, state)?;
        tx.commit().context("Failed to commit batch")?;
        debug!(
            "[STORE] Committed batch of {} items, cursor now {}",
            items.len(),
            state.since.timestamp()
        );
        Ok(result)
    }

    fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.item_id = ?");
        let row = conn
            .query_row(&sql, [id.as_str()], map_item_row)
            .optional()?;

        row.map(|row| Self::hydrate(&conn, row)).transpose()
    }

    fn has_item(&self, id: &ItemId) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE item_id = ?)",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn count_items(&self, filter: &ItemFilter) -> Result<usize> {
        let conn = self.lock()?;
        let (clause, args) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM items i {clause}");
        let count: i64 = conn.query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_items(&self, filter: &ItemFilter, window: Window) -> Result<Vec<Item>> {
        let conn = self.lock()?;
        let (clause, mut args) = filter_clause(filter);
        args.extend(window_args(window));
        let sql =
            format!("SELECT {ITEM_COLUMNS} FROM items i {clause} {ITEM_ORDER} LIMIT ? OFFSET ?");
        Self::query_items(&conn, &sql, args)
    }

    fn count_item_tags(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM item_tags", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_item_tags(&self, window: Window) -> Result<Vec<ItemTag>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, tag FROM item_tags ORDER BY item_id ASC, tag ASC LIMIT ? OFFSET ?",
        )?;
        let tags = stmt
            .query_map(params_from_iter(window_args(window)), |row| {
                Ok(ItemTag {
                    item_id: row.get(0)?,
                    tag: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn search_items(&self, query: &str, limit: usize) -> Result<Vec<Item>> {
        let query = fts_query(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items_fts
             JOIN items i ON i.rowid = items_fts.rowid
             WHERE items_fts MATCH ?
             ORDER BY rank
             LIMIT ?"
        );
        Self::query_items(
            &conn,
            &sql,
            vec![Value::Text(query), Value::Integer(limit as i64)],
        )
    }

    fn get_sync_state(&self) -> Result<Option<SyncState>> {
        let conn = self.lock()?;

        let row: Option<(i64, String, u32, bool)> = conn
            .query_row(
                "SELECT since, last_sync_at, sync_version, full_sync_complete
                 FROM sync_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((since, last_sync_at_str, sync_version, full_sync_complete)) = row else {
            return Ok(None);
        };

        let since = DateTime::from_timestamp(since, 0)
            .with_context(|| format!("Stored cursor out of range: {since}"))?;
        let last_sync_at = DateTime::parse_from_rfc3339(&last_sync_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(SyncState {
            since,
            last_sync_at,
            sync_version,
            full_sync_complete,
        }))
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        let conn = self.lock()?;
        write_sync_state(&conn, state)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "DELETE FROM item_authors;
             DELETE FROM authors;
             DELETE FROM item_tags;
             DELETE FROM items;
             DELETE FROM sync_state;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteItemStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("pocket.test.sqlite");
        let store = SqliteItemStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_test_item(id: &str, updated: i64) -> Item {
        let mut item = Item::new(id, json!({ "item_id": id, "time_updated": updated.to_string() }));
        item.status = Some(ItemStatus::Unread);
        item.favorite = Some(false);
        item.resolved_title = Some(format!("Title {id}"));
        item.resolved_url = Some(format!("https://example.com/{id}"));
        item.excerpt = Some(format!("Excerpt for {id}"));
        item.word_count = Some(1200);
        item.time_added = Some(ts(updated - 10));
        item.time_updated = Some(ts(updated));
        item.tags = ["rust".to_string(), "sqlite".to_string()].into();
        item
    }

    #[test]
    fn test_item_crud() {
        let (store, _dir) = create_test_store();

        let result = store.merge(&[make_test_item("1", 100)]).unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(result.updated, 0);

        let item = store.get_item(&ItemId::new("1")).unwrap().unwrap();
        assert_eq!(item.resolved_title.as_deref(), Some("Title 1"));
        assert_eq!(item.status, Some(ItemStatus::Unread));
        assert_eq!(item.time_updated, Some(ts(100)));
        assert_eq!(item.raw["item_id"], "1");
        assert_eq!(item.tags.len(), 2);

        assert!(store.has_item(&ItemId::new("1")).unwrap());
        assert!(!store.has_item(&ItemId::new("2")).unwrap());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (store, _dir) = create_test_store();
        let item = make_test_item("1", 100);

        store.merge(std::slice::from_ref(&item)).unwrap();
        let first = store.get_item(&item.id).unwrap().unwrap();

        let result = store.merge(std::slice::from_ref(&item)).unwrap();
        assert_eq!(result.inserted, 0);
        assert_eq!(result.updated, 1);

        let second = store.get_item(&item.id).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 1);
        assert_eq!(store.count_item_tags().unwrap(), 2);
    }

    #[test]
    fn test_repeated_id_in_batch_is_one_row() {
        let (store, _dir) = create_test_store();
        store.merge(&[make_test_item("1", 100)]).unwrap();

        let result = store
            .merge(&[
                make_test_item("2", 200),
                make_test_item("1", 150),
                make_test_item("2", 250),
            ])
            .unwrap();

        assert_eq!(result.inserted, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(result.total(), 2);
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 2);
        let item = store.get_item(&ItemId::new("2")).unwrap().unwrap();
        assert_eq!(item.time_updated, Some(ts(250)));
    }

    #[test]
    fn test_partial_update_preserves_columns() {
        let (store, _dir) = create_test_store();
        store.merge(&[make_test_item("1", 100)]).unwrap();

        // Deleted items arrive as a bare id + status
        let mut partial = Item::new("1", json!({ "item_id": "1", "status": "2" }));
        partial.status = Some(ItemStatus::Deleted);
        partial.time_updated = Some(ts(50));
        store.merge(&[partial]).unwrap();

        let item = store.get_item(&ItemId::new("1")).unwrap().unwrap();
        assert_eq!(item.status, Some(ItemStatus::Deleted));
        assert_eq!(item.resolved_title.as_deref(), Some("Title 1"));
        assert_eq!(item.word_count, Some(1200));
        assert_eq!(item.favorite, Some(false));
        // time_updated never moves backwards
        assert_eq!(item.time_updated, Some(ts(100)));
        // raw payload is replaced
        assert_eq!(item.raw["status"], "2");
    }

    #[test]
    fn test_tags_and_authors_are_replaced() {
        let (store, _dir) = create_test_store();
        let mut item = make_test_item("1", 100);
        item.authors = vec![Author {
            author_id: 7,
            name: "Ada".to_string(),
            url: None,
        }];
        store.merge(std::slice::from_ref(&item)).unwrap();

        item.tags = ["python".to_string()].into();
        item.authors.clear();
        store.merge(&[item]).unwrap();

        let stored = store.get_item(&ItemId::new("1")).unwrap().unwrap();
        assert_eq!(stored.tags.iter().collect::<Vec<_>>(), vec!["python"]);
        assert!(stored.authors.is_empty());
        assert_eq!(
            store.list_item_tags(Window::default()).unwrap(),
            vec![ItemTag {
                item_id: "1".to_string(),
                tag: "python".to_string()
            }]
        );
    }

    #[test]
    fn test_commit_batch_writes_cursor() {
        let (store, _dir) = create_test_store();
        assert!(store.get_sync_state().unwrap().is_none());

        let state = SyncState::new(ts(100));
        store
            .commit_batch(&[make_test_item("1", 100)], &state)
            .unwrap();

        let loaded = store.get_sync_state().unwrap().unwrap();
        assert_eq!(loaded.since, ts(100));
        assert!(store.has_item(&ItemId::new("1")).unwrap());
    }

    #[test]
    fn test_list_items_filter_and_window() {
        let (store, _dir) = create_test_store();
        let mut items = Vec::new();
        for i in 1..=6 {
            let mut item = make_test_item(&i.to_string(), 100 + i);
            if i % 2 == 0 {
                item.status = Some(ItemStatus::Archived);
            }
            if i == 3 {
                item.favorite = Some(true);
            }
            items.push(item);
        }
        store.merge(&items).unwrap();

        let archived = ItemFilter {
            status: Some(ItemStatus::Archived),
            favorite: None,
        };
        assert_eq!(store.count_items(&archived).unwrap(), 3);

        let listed = store.list_items(&archived, Window::new(1, Some(1))).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "4");

        let favorites = ItemFilter {
            status: None,
            favorite: Some(true),
        };
        let listed = store.list_items(&favorites, Window::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "3");

        let all = store.list_items(&ItemFilter::default(), Window::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);
    }

    #[test]
    fn test_search_items() {
        let (store, _dir) = create_test_store();
        let mut item = make_test_item("1", 100);
        item.resolved_title = Some("Deep Learning: Our Miraculous Year".to_string());
        let mut other = make_test_item("2", 200);
        other.excerpt = Some("Notes on sourdough baking".to_string());
        store.merge(&[item, other]).unwrap();

        let hits = store.search_items("miraculous", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "1");

        let hits = store.search_items("sourdough", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "2");

        // FTS syntax in user input is treated literally
        assert!(store.search_items("\"unbalanced", 10).unwrap().is_empty());
        assert!(store.search_items("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_reflects_updates() {
        let (store, _dir) = create_test_store();
        let mut item = make_test_item("1", 100);
        item.resolved_title = Some("Original heading".to_string());
        store.merge(std::slice::from_ref(&item)).unwrap();

        item.resolved_title = Some("Replacement heading".to_string());
        store.merge(&[item]).unwrap();

        assert!(store.search_items("original", 10).unwrap().is_empty());
        assert_eq!(store.search_items("replacement", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let (store, _dir) = create_test_store();
        store
            .commit_batch(&[make_test_item("1", 100)], &SyncState::new(ts(100)))
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 0);
        assert!(store.get_sync_state().unwrap().is_none());
    }
}
