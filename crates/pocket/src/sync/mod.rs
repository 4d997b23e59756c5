//! Sync engine for fetching and storing saved items
//!
//! Provides idempotent, resumable sync operations that can be safely retried.

mod engine;
pub mod retry;
mod source;

pub use engine::{SyncAborted, SyncEngine, SyncMode, SyncOptions, SyncProgress, SyncReport};
pub use retry::{FailureClass, RetryError, RetryPolicy, Sleeper, ThreadSleeper, call_with_retry, classify_remote};
pub use source::{Batch, Continuation, ItemSource};
