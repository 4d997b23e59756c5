//! Pocket crate - incremental sync of saved articles into SQLite
//!
//! This crate provides:
//! - Domain models (Item, ItemStatus, SyncState)
//! - Pocket API client and OAuth handshake
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Resumable sync engine with bounded retry and backoff
//! - Export adapter for JSON, CSV and Karakeep
//!
//! The crate is synchronous and has no UI dependencies.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod storage;
pub mod sync;

pub use api::{AccessGrant, PocketAuth, PocketClient, api::StatsResponse, normalize_item};
pub use self::config::{Credentials, DEFAULT_AUTH_FILE, SyncSettings};
pub use error::{Error, RemoteError, Result};
pub use export::{ExportFormat, ExportReport, ExportRequest, ExportTable, Exporter};
pub use models::{Author, Item, ItemId, ItemStatus, SyncState};
pub use storage::{InMemoryItemStore, ItemFilter, ItemStore, ItemTag, MergeResult, SqliteItemStore, Window};
pub use sync::{
    Batch, Continuation, FailureClass, ItemSource, RetryError, RetryPolicy, Sleeper, SyncAborted,
    SyncEngine, SyncMode, SyncOptions, SyncProgress, SyncReport, ThreadSleeper, call_with_retry,
};
