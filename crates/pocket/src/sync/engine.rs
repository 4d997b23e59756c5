//! Incremental sync engine
//!
//! Drives the fetch loop: fetch a page through the retry controller,
//! normalize it, commit it together with the advanced cursor, then move on
//! to the next page. A batch is durable before the next fetch begins.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::fmt;
use std::time::{Duration, Instant};

use super::retry::{RetryError, RetryPolicy, Sleeper, ThreadSleeper, call_with_retry, classify_remote};
use super::source::{Batch, Continuation, ItemSource};
use crate::api::normalize_item;
use crate::error::Error;
use crate::models::{Item, SyncState};
use crate::storage::ItemStore;

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Which part of the remote listing to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Items updated since the stored cursor
    Incremental,
    /// Everything, starting from the epoch; existing rows are never removed
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Tuning for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub retry: RetryPolicy,
    /// Pause between consecutive page requests
    pub page_delay: Duration,
    /// Size of the remote listing, when known, for progress output
    pub expected_total: Option<u64>,
}

/// Emitted after each committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub batch_items: usize,
    pub total_merged: usize,
    pub expected_total: Option<u64>,
}

/// Statistics from a sync run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Batches committed
    pub batches: usize,
    /// Items durably merged
    pub items_merged: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Cursor after the last committed batch
    pub since: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(mode: SyncMode, since: DateTime<Utc>) -> Self {
        Self {
            mode,
            batches: 0,
            items_merged: 0,
            inserted: 0,
            updated: 0,
            since,
            duration_ms: 0,
        }
    }

    fn finished(mut self, start: Instant) -> Self {
        self.duration_ms = start.elapsed().as_millis() as u64;
        self
    }
}

/// A sync run that stopped early, with the progress it made before stopping
#[derive(Debug, thiserror::Error)]
#[error("Sync stopped after merging {} items: {error}", .report.items_merged)]
pub struct SyncAborted {
    pub report: SyncReport,
    #[source]
    pub error: Error,
}

/// Pulls items from a source into a store
pub struct SyncEngine<'a> {
    source: &'a dyn ItemSource,
    store: &'a dyn ItemStore,
    sleeper: &'a dyn Sleeper,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(source: &'a dyn ItemSource, store: &'a dyn ItemStore, options: SyncOptions) -> Self {
        Self {
            source,
            store,
            sleeper: &THREAD_SLEEPER,
            options,
        }
    }

    /// Use `sleeper` for backoff and page delays instead of the current thread
    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run a sync to completion or until a failure
    ///
    /// `progress` is called once per committed batch.
    pub fn sync(
        &self,
        mode: SyncMode,
        progress: &mut dyn FnMut(SyncProgress),
    ) -> Result<SyncReport, SyncAborted> {
        let start = Instant::now();

        let stored = match self.store.get_sync_state() {
            Ok(stored) => stored,
            Err(e) => {
                return Err(SyncAborted {
                    report: SyncReport::new(mode, SyncState::epoch()).finished(start),
                    error: Error::Store(e),
                });
            }
        };

        let mut state = match (mode, stored) {
            (SyncMode::Incremental, Some(stored)) => stored,
            (SyncMode::Incremental, None) | (SyncMode::Full, _) => SyncState::new(SyncState::epoch()),
        };
        let request_since = state.since;
        let mut report = SyncReport::new(mode, state.since);

        info!(
            "[SYNC] Starting {} sync since {}",
            mode,
            request_since.to_rfc3339()
        );

        let mut continuation: Option<Continuation> = None;
        loop {
            let batch = match self.fetch_batch(request_since, continuation) {
                Ok(batch) => batch,
                Err(error) => return Err(SyncAborted { report: report.finished(start), error }),
            };

            if batch.is_empty() {
                debug!("[SYNC] Source returned an empty batch");
                break;
            }

            let items = match batch
                .items
                .into_iter()
                .map(normalize_item)
                .collect::<Result<Vec<Item>, _>>()
            {
                Ok(items) => items,
                Err(e) => {
                    return Err(SyncAborted {
                        report: report.finished(start),
                        error: Error::Remote(e),
                    });
                }
            };

            let newest = items.iter().filter_map(|item| item.time_updated).max();
            let next_state = state.clone().advanced(newest);

            let merged = match self.store.commit_batch(&items, &next_state) {
                Ok(merged) => merged,
                Err(e) => {
                    return Err(SyncAborted {
                        report: report.finished(start),
                        error: Error::MergeFailed(e),
                    });
                }
            };
            state = next_state;

            report.batches += 1;
            report.items_merged += merged.total();
            report.inserted += merged.inserted;
            report.updated += merged.updated;
            report.since = state.since;

            info!(
                "[SYNC] Batch {}: merged {} items ({} new), cursor at {}",
                report.batches,
                merged.total(),
                merged.inserted,
                state.since.to_rfc3339()
            );

            progress(SyncProgress {
                batch_items: merged.total(),
                total_merged: report.items_merged,
                expected_total: self.options.expected_total,
            });

            match batch.next {
                Some(next) => continuation = Some(next),
                None => break,
            }

            self.sleeper.sleep(self.options.page_delay);
        }

        // The stored cursor only changes once a batch has committed
        if report.batches == 0 {
            debug!("[SYNC] No batches committed, stored cursor left unchanged");
        } else {
            if mode == SyncMode::Full {
                state = state.mark_full_complete();
            }
            if let Err(e) = self.store.save_sync_state(&state.advanced(None)) {
                return Err(SyncAborted {
                    report: report.finished(start),
                    error: Error::Store(e),
                });
            }
        }

        let report = report.finished(start);
        info!(
            "[SYNC] {} sync complete: {} items in {} batches ({} new, {} updated) in {}ms",
            mode, report.items_merged, report.batches, report.inserted, report.updated, report.duration_ms
        );
        Ok(report)
    }

    /// Fetch one page through the retry controller
    fn fetch_batch(
        &self,
        since: DateTime<Utc>,
        continuation: Option<Continuation>,
    ) -> Result<Batch, Error> {
        call_with_retry(&self.options.retry, self.sleeper, classify_remote, |attempt| {
            if attempt > 1 {
                debug!("[SYNC] Fetch attempt {} at {:?}", attempt, continuation);
            }
            self.source.fetch(since, continuation)
        })
        .map_err(|e| match e {
            RetryError::Fatal(last) => Error::Remote(last),
            RetryError::Exhausted { attempts, last } => Error::SyncFailed { attempts, last },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::models::{ItemId, ItemStatus};
    use crate::storage::{InMemoryItemStore, ItemFilter, SqliteItemStore};
    use crate::sync::retry::tests::RecordingSleeper;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn payload(id: &str, updated: i64) -> Value {
        json!({
            "item_id": id,
            "status": "0",
            "resolved_title": format!("Article {id}"),
            "time_added": updated.to_string(),
            "time_updated": updated.to_string(),
        })
    }

    /// Replays scripted responses and records each request
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Batch, RemoteError>>>,
        requests: Mutex<Vec<(DateTime<Utc>, Option<Continuation>)>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Batch, RemoteError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<(DateTime<Utc>, Option<Continuation>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ItemSource for ScriptedSource {
        fn fetch(
            &self,
            since: DateTime<Utc>,
            continuation: Option<Continuation>,
        ) -> Result<Batch, RemoteError> {
            self.requests.lock().unwrap().push((since, continuation));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Batch::default()))
        }
    }

    fn page(items: Vec<Value>, next: Option<usize>) -> Result<Batch, RemoteError> {
        Ok(Batch {
            items,
            next: next.map(|offset| Continuation { offset }),
        })
    }

    fn rate_limited() -> Result<Batch, RemoteError> {
        Err(RemoteError::RateLimited {
            retry_after: None,
            message: "slow down".to_string(),
        })
    }

    fn options(max_attempts: u32) -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy::immediate(max_attempts),
            ..Default::default()
        }
    }

    fn no_progress(_: SyncProgress) {}

    #[test]
    fn test_two_page_sync_then_noop_incremental() {
        let store = InMemoryItemStore::new();
        let sleeper = RecordingSleeper::default();
        let first = ScriptedSource::new(vec![
            page((1..=5).map(|n| payload(&n.to_string(), 100 + n)).collect(), Some(5)),
            page(Vec::new(), None),
        ]);

        let mut seen = Vec::new();
        let report = SyncEngine::new(&first, &store, options(3))
            .with_sleeper(&sleeper)
            .sync(SyncMode::Incremental, &mut |p| seen.push(p))
            .unwrap();

        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 5);
        assert_eq!(report.items_merged, 5);
        assert_eq!(report.inserted, 5);
        assert_eq!(report.batches, 1);
        assert_eq!(report.since, ts(105));
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(105));
        assert_eq!(
            seen,
            vec![SyncProgress {
                batch_items: 5,
                total_merged: 5,
                expected_total: None
            }]
        );
        assert_eq!(
            first.requests(),
            vec![
                (SyncState::epoch(), None),
                (SyncState::epoch(), Some(Continuation { offset: 5 }))
            ]
        );

        let before = store.list_items(&ItemFilter::default(), Default::default()).unwrap();
        let second = ScriptedSource::new(vec![page(Vec::new(), None)]);
        let report = SyncEngine::new(&second, &store, options(3))
            .with_sleeper(&sleeper)
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap();

        assert_eq!(second.requests(), vec![(ts(105), None)]);
        assert_eq!(report.items_merged, 0);
        assert_eq!(
            store.list_items(&ItemFilter::default(), Default::default()).unwrap(),
            before
        );
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(105));
    }

    #[test]
    fn test_cursor_is_max_updated_and_never_decreases() {
        let store = InMemoryItemStore::new();
        let source = ScriptedSource::new(vec![
            page(vec![payload("a", 300), payload("b", 200)], Some(2)),
            page(vec![payload("c", 150)], Some(3)),
            page(vec![payload("d", 250)], None),
        ]);

        let report = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(report.since, ts(300));
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(300));
        assert!(source.requests().iter().all(|(since, _)| *since == SyncState::epoch()));
    }

    #[test]
    fn test_failed_merge_keeps_previous_cursor_and_no_partial_batch() {
        let store = SqliteItemStore::in_memory().unwrap();
        store
            .execute_raw(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON items
                 WHEN NEW.item_id = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned item'); END;",
            )
            .unwrap();

        let source = ScriptedSource::new(vec![
            page(vec![payload("a", 100), payload("b", 110)], Some(2)),
            page(vec![payload("c", 500), payload("poison", 600)], Some(4)),
        ]);

        let aborted = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap_err();

        assert!(matches!(aborted.error, Error::MergeFailed(_)));
        assert_eq!(aborted.report.items_merged, 2);
        assert_eq!(aborted.report.since, ts(110));
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(110));
        assert!(store.has_item(&ItemId::new("b")).unwrap());
        assert!(!store.has_item(&ItemId::new("c")).unwrap());
    }

    #[test]
    fn test_rate_limits_within_budget_succeed() {
        let store = InMemoryItemStore::new();
        let sleeper = RecordingSleeper::default();
        let source = ScriptedSource::new(vec![
            rate_limited(),
            rate_limited(),
            page(vec![payload("a", 100)], None),
        ]);

        let report = SyncEngine::new(&source, &store, options(3))
            .with_sleeper(&sleeper)
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap();

        assert_eq!(report.items_merged, 1);
        assert_eq!(source.requests().len(), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_exhausted_retries_raise_sync_failed_with_partial_report() {
        let store = InMemoryItemStore::new();
        let source = ScriptedSource::new(vec![
            page(vec![payload("a", 100)], Some(1)),
            rate_limited(),
            rate_limited(),
            rate_limited(),
            page(vec![payload("b", 200)], None),
        ]);

        let aborted = SyncEngine::new(&source, &store, options(3))
            .with_sleeper(&RecordingSleeper::default())
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap_err();

        match aborted.error {
            Error::SyncFailed { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, RemoteError::RateLimited { .. }));
            }
            other => panic!("expected SyncFailed, got {other:?}"),
        }
        assert_eq!(aborted.report.items_merged, 1);
        assert_eq!(source.requests().len(), 4);
        assert!(!store.has_item(&ItemId::new("b")).unwrap());
        assert_eq!(store.get_sync_state().unwrap().unwrap().since, ts(100));
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let store = InMemoryItemStore::new();
        let source = ScriptedSource::new(vec![Err(RemoteError::Unauthorized(
            "HTTP 401".to_string(),
        ))]);

        let aborted = SyncEngine::new(&source, &store, options(5))
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap_err();

        assert!(matches!(aborted.error, Error::Remote(RemoteError::Unauthorized(_))));
        assert_eq!(source.requests().len(), 1);
        assert_eq!(aborted.report.items_merged, 0);
    }

    #[test]
    fn test_payload_without_id_aborts_before_merge() {
        let store = InMemoryItemStore::new();
        let source = ScriptedSource::new(vec![page(
            vec![payload("a", 100), json!({ "status": "0" })],
            None,
        )]);

        let aborted = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap_err();

        assert!(matches!(aborted.error, Error::Remote(RemoteError::Fatal(_))));
        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 0);
    }

    #[test]
    fn test_full_sync_starts_from_epoch_and_keeps_rows() {
        let store = InMemoryItemStore::new();
        store
            .commit_batch(
                &[normalize_item(payload("old", 900)).unwrap()],
                &SyncState::new(ts(900)),
            )
            .unwrap();

        let mut deleted = payload("a", 50);
        deleted["status"] = json!("2");
        let source = ScriptedSource::new(vec![page(vec![deleted], None)]);

        let report = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Full, &mut no_progress)
            .unwrap();

        assert_eq!(source.requests(), vec![(SyncState::epoch(), None)]);
        assert_eq!(report.mode, SyncMode::Full);
        assert_eq!(report.since, ts(50));
        assert!(store.has_item(&ItemId::new("old")).unwrap());
        let item = store.get_item(&ItemId::new("a")).unwrap().unwrap();
        assert_eq!(item.status, Some(ItemStatus::Deleted));

        let state = store.get_sync_state().unwrap().unwrap();
        assert!(state.full_sync_complete);
        assert_eq!(state.since, ts(50));
    }

    #[test]
    fn test_empty_full_sync_keeps_stored_cursor() {
        let store = SqliteItemStore::in_memory().unwrap();
        store
            .commit_batch(
                &[normalize_item(payload("old", 900)).unwrap()],
                &SyncState::new(ts(900)),
            )
            .unwrap();

        let source = ScriptedSource::new(vec![page(Vec::new(), None)]);
        let report = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Full, &mut no_progress)
            .unwrap();

        assert_eq!(report.batches, 0);
        let state = store.get_sync_state().unwrap().unwrap();
        assert_eq!(state.since, ts(900));
        assert!(!state.full_sync_complete);
    }

    #[test]
    fn test_empty_first_sync_writes_no_state() {
        let store = InMemoryItemStore::new();
        let source = ScriptedSource::new(vec![page(Vec::new(), None)]);

        SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Incremental, &mut no_progress)
            .unwrap();

        assert!(store.get_sync_state().unwrap().is_none());
    }

    #[test]
    fn test_repeated_id_in_batch_counts_once() {
        let store = SqliteItemStore::in_memory().unwrap();
        let source = ScriptedSource::new(vec![page(
            vec![payload("a", 100), payload("a", 120), payload("b", 110)],
            None,
        )]);

        let mut seen = Vec::new();
        let report = SyncEngine::new(&source, &store, options(1))
            .sync(SyncMode::Incremental, &mut |p| seen.push(p.total_merged))
            .unwrap();

        assert_eq!(store.count_items(&ItemFilter::default()).unwrap(), 2);
        assert_eq!(report.items_merged, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(seen, vec![2]);
        let item = store.get_item(&ItemId::new("a")).unwrap().unwrap();
        assert_eq!(item.time_updated, Some(ts(120)));
    }

    #[test]
    fn test_page_delay_between_pages_only() {
        let store = InMemoryItemStore::new();
        let sleeper = RecordingSleeper::default();
        let source = ScriptedSource::new(vec![
            page(vec![payload("a", 100)], Some(1)),
            page(vec![payload("b", 200)], Some(2)),
            page(Vec::new(), None),
        ]);
        let options = SyncOptions {
            retry: RetryPolicy::immediate(1),
            page_delay: Duration::from_secs(2),
            expected_total: Some(2),
        };

        let mut seen = Vec::new();
        SyncEngine::new(&source, &store, options)
            .with_sleeper(&sleeper)
            .sync(SyncMode::Incremental, &mut |p| seen.push(p))
            .unwrap();

        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(2)]
        );
        assert_eq!(seen.last().map(|p| (p.total_merged, p.expected_total)), Some((2, Some(2))));
    }
}
