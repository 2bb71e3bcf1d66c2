//! Repository layer for SQLite persistence.
//!
//! Each repository opens short-lived connections against the shared
//! database file. All timestamps are stored as RFC 3339 text so that
//! staleness comparisons work lexicographically.

pub mod item_lock;
pub mod price_history;
pub mod process_lock;
pub mod product;
pub mod run;
pub mod site_config;

pub use item_lock::ItemLockRepository;
pub use price_history::PriceHistoryRepository;
pub use process_lock::ProcessLockRepository;
pub use product::ProductRepository;
pub use run::RunRepository;
pub use site_config::SiteConfigRepository;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Open a connection to the shared database.
///
/// WAL mode plus a busy timeout lets multiple worker processes hammer
/// the lock tables without immediate SQLITE_BUSY failures.
pub(crate) fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// RFC 3339 cutoff for "older than `timeout_secs`" comparisons.
pub(crate) fn staleness_cutoff(timeout_secs: u64) -> String {
    (Utc::now() - chrono::Duration::seconds(timeout_secs as i64)).to_rfc3339()
}
