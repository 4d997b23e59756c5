//! Domain models for saved items and sync progress

mod item;
mod sync_state;

pub use item::{Author, Item, ItemId, ItemStatus};
pub use sync_state::SyncState;
