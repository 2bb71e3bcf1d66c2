//! Per-product item locks for parallel scraping.
//!
//! Acquisition is a single atomic insert against a `UNIQUE(product_id)`
//! constraint: a conflict means another live worker holds the item and
//! the caller must skip it. A check-then-insert pair would reintroduce
//! duplicate processing under a race.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;
use tracing::{debug, info};

use super::{staleness_cutoff, Result};
use crate::models::ItemLock;

/// SQLite-backed item lock table.
pub struct ItemLockRepository {
    db_path: PathBuf,
}

impl ItemLockRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS item_locks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL UNIQUE,
                run_id INTEGER NOT NULL,
                process_id INTEGER NOT NULL,
                locked_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_item_locks_run
                ON item_locks(run_id);
        "#,
        )?;
        Ok(())
    }

    /// Try to acquire a lock on one product.
    ///
    /// Any stale lock for this specific product is removed first, so a
    /// crashed holder cannot block the item past the timeout. Returns
    /// false when another live lock exists; the caller must skip the
    /// item rather than retry synchronously.
    pub fn try_acquire(
        &self,
        product_id: &str,
        run_id: i64,
        process_id: u32,
        timeout_secs: u64,
    ) -> Result<bool> {
        let conn = self.connect()?;

        conn.execute(
            "DELETE FROM item_locks WHERE product_id = ?1 AND locked_at < ?2",
            params![product_id, staleness_cutoff(timeout_secs)],
        )?;

        let inserted = conn.execute(
            "INSERT INTO item_locks (product_id, run_id, process_id, locked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, run_id, process_id, Utc::now().to_rfc3339()],
        );

        match inserted {
            Ok(_) => {
                debug!(product_id, run_id, process_id, "item lock acquired");
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(product_id, run_id, "item already locked by another worker");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock on one product.
    pub fn release(&self, product_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM item_locks WHERE product_id = ?1",
            params![product_id],
        )?;
        debug!(product_id, "item lock released");
        Ok(())
    }

    /// Release every lock owned by a run. Called unconditionally at the
    /// end of a batch so no item stays stuck behind a finished run.
    pub fn release_all(&self, run_id: i64) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute("DELETE FROM item_locks WHERE run_id = ?1", params![run_id])?;
        if count > 0 {
            info!(run_id, count, "released remaining item locks for run");
        }
        Ok(count)
    }

    /// Delete every lock older than the timeout. Run at batch start to
    /// clear locks orphaned by processes that died mid-scrape.
    pub fn sweep_stale(&self, timeout_secs: u64) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute(
            "DELETE FROM item_locks WHERE locked_at < ?1",
            params![staleness_cutoff(timeout_secs)],
        )?;
        if count > 0 {
            info!(count, timeout_secs, "swept stale item locks");
        }
        Ok(count)
    }

    /// Check whether a non-stale lock exists for a product.
    pub fn is_locked(&self, product_id: &str, timeout_secs: u64) -> Result<bool> {
        let conn = self.connect()?;
        let found = super::to_option(conn.query_row(
            "SELECT id FROM item_locks WHERE product_id = ?1 AND locked_at >= ?2",
            params![product_id, staleness_cutoff(timeout_secs)],
            |row| row.get::<_, i64>(0),
        ))?;
        Ok(found.is_some())
    }

    /// All current lock rows, newest first (for the CLI lock listing).
    pub fn all(&self) -> Result<Vec<ItemLock>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT product_id, run_id, process_id, locked_at
             FROM item_locks ORDER BY locked_at DESC",
        )?;

        let locks = stmt
            .query_map([], |row| {
                Ok(ItemLock {
                    product_id: row.get(0)?,
                    run_id: row.get(1)?,
                    process_id: row.get(2)?,
                    locked_at: super::parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locks)
    }
}
