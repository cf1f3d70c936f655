//! Storage crate: persistence of processed updates for tebo.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`history`] – `History` and the `HistoryStore` trait
//! - [`memory`] – `MemoryHistory` (in-process)
//! - [`sqlite_history`] – `SqliteHistory` (SQLite via sqlx)
//! - [`sqlite_pool`] – `SqlitePoolManager`

mod error;
mod history;
mod memory;
mod models;
mod sqlite_history;
mod sqlite_pool;

pub use error::StorageError;
pub use history::{History, HistoryStore};
pub use memory::MemoryHistory;
pub use models::ChatRecord;
pub use sqlite_history::SqliteHistory;
pub use sqlite_pool::SqlitePoolManager;
