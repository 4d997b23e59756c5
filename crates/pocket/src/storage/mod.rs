//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for saved items.
//! The trait-based design allows swapping between in-memory and SQLite
//! storage implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryItemStore;
pub use sqlite::SqliteItemStore;
pub use traits::{ItemFilter, ItemStore, ItemTag, MergeResult, Window};
