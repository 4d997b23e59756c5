mod auth;
mod export;
mod fetch;
mod search;

pub use auth::run_auth;
pub use export::run_export;
pub use fetch::run_fetch;
pub use search::run_search;
