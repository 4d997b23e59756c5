use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use pocket::{
    Credentials, ItemStore, PocketClient, SqliteItemStore, SyncEngine, SyncMode, SyncOptions,
    SyncProgress, SyncSettings,
};

pub fn run_fetch(db_path: &Path, auth_path: &Path, all: bool, silent: bool) -> Result<()> {
    let credentials = Credentials::load(auth_path)?;
    let settings = SyncSettings::load().context("Failed to load sync settings")?;

    let client = PocketClient::new(
        &credentials.consumer_key,
        &credentials.access_token,
        settings.timeout,
    )
    .with_page_size(settings.page_size);
    let store = SqliteItemStore::new(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let mode = if all { SyncMode::Full } else { SyncMode::Incremental };

    let first_run = store.get_sync_state()?.is_none_or(|state| !state.has_cursor());
    let expected_total = if !silent && (mode == SyncMode::Full || first_run) {
        match client.fetch_stats() {
            Ok(stats) => Some(stats.count_list),
            Err(e) => {
                warn!("[SYNC] Could not fetch account stats: {e}");
                None
            }
        }
    } else {
        None
    };

    let options = SyncOptions {
        retry: settings.retry,
        page_delay: settings.page_delay,
        expected_total,
    };
    let engine = SyncEngine::new(&client, &store, options);

    let mut on_progress = |progress: SyncProgress| {
        if silent {
            return;
        }
        match progress.expected_total {
            Some(total) => eprintln!("Fetched {}/{} items", progress.total_merged, total),
            None => eprintln!("Fetched {} items", progress.total_merged),
        }
    };

    info!("[SYNC] Starting {mode} fetch into {}", db_path.display());
    let report = engine.sync(mode, &mut on_progress)?;

    if !silent {
        eprintln!(
            "Done: {} items ({} new, {} updated) in {} batches, {:.1}s",
            report.items_merged,
            report.inserted,
            report.updated,
            report.batches,
            report.duration_ms as f64 / 1000.0
        );
    }
    Ok(())
}
