//! Durable storage for Mnemon: the append-only conversation log and the
//! agent configuration / version store.
//!
//! Both stores share one SQLite database. All persisted state lives under
//! the configured deployment directory; nothing outside it is written.

pub mod conversation;
pub mod versions;

pub use conversation::{ConversationPage, ConversationStore};
pub use versions::VersionStore;

use mnemon_core::error::StorageError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open (and create if missing) the shared SQLite pool used by both stores.
///
/// Pass `"sqlite::memory:"` for an in-process ephemeral database.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| StorageError::Connection(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .pragma("foreign_keys", "ON");

    // An in-memory database exists per connection; the pool must not fan out.
    let max_connections = if path.contains(":memory:") { 1 } else { 4 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::Connection(format!("Failed to open SQLite: {e}")))
}
