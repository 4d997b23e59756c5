use std::path::Path;

use anyhow::{Context, Result, bail};
use pocket::{Item, ItemStore, SqliteItemStore};
use serde_json::json;

pub fn run_search(db_path: &Path, query: &str, limit: usize, as_json: bool) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Search query cannot be empty");
    }
    if !db_path.exists() {
        bail!("Database not found: {}", db_path.display());
    }

    let store = SqliteItemStore::new(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let items = store.search_items(query, limit)?;

    if as_json {
        let rows: Vec<_> = items.iter().map(search_row).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for item in &items {
            println!("{}", format_line(item));
        }
    }
    Ok(())
}

fn search_row(item: &Item) -> serde_json::Value {
    json!({
        "item_id": item.id.as_str(),
        "title": item.title(),
        "url": item.url(),
        "status": item.status,
        "time_added": item.time_added.map(|t| t.to_rfc3339()),
    })
}

fn format_line(item: &Item) -> String {
    let added = item
        .time_added
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}",
        item.id,
        added,
        item.title().unwrap_or("(untitled)"),
        item.url().unwrap_or("")
    )
}
