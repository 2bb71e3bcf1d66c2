//! Process locks capping the worker fleet size.
//!
//! Each running worker holds one row. Liveness is decided against the
//! OS process table, so locks from crashed workers stop counting
//! immediately and are deleted on the next reclaim pass. The admission
//! check (`count_active` vs. the configured maximum) happens before
//! `acquire` and is only best-effort; two workers racing the check can
//! both get in.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;
use tracing::{info, warn};

use super::Result;
use crate::models::ProcessLock;
use crate::utils::process;

/// SQLite-backed process lock table.
pub struct ProcessLockRepository {
    db_path: PathBuf,
}

impl ProcessLockRepository {
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
            CREATE TABLE IF NOT EXISTS process_locks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process_id INTEGER NOT NULL,
                hostname TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                UNIQUE(process_id, hostname)
            );
        "#,
        )?;
        Ok(())
    }

    /// Acquire a lock for the current process. Dead-process locks are
    /// reclaimed first. Must be paired with `release` on every exit path.
    pub fn acquire(&self) -> Result<()> {
        self.reclaim_dead()?;

        let pid = process::current_pid();
        let host = process::current_hostname();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO process_locks (process_id, hostname, acquired_at)
             VALUES (?1, ?2, ?3)",
            params![pid, host, Utc::now().to_rfc3339()],
        )?;

        info!(pid, host = %host, "process lock acquired");
        Ok(())
    }

    /// Release the lock owned by the current process. Scoped by
    /// hostname as well as pid, since pids repeat across hosts.
    pub fn release(&self) -> Result<()> {
        let pid = process::current_pid();
        let host = process::current_hostname();
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM process_locks WHERE process_id = ?1 AND hostname = ?2",
            params![pid, host],
        )?;
        info!(pid, host = %host, "process lock released");
        Ok(())
    }

    /// Count locks whose owning process is alive. Dead pids are excluded
    /// even before an explicit reclaim.
    pub fn count_active(&self) -> Result<u32> {
        let count = self
            .all()?
            .iter()
            .filter(|lock| process::is_alive(lock.process_id))
            .count();
        Ok(count as u32)
    }

    /// Delete locks whose owning process is no longer alive.
    pub fn reclaim_dead(&self) -> Result<usize> {
        let dead: Vec<ProcessLock> = self
            .all()?
            .into_iter()
            .filter(|lock| !process::is_alive(lock.process_id))
            .collect();

        if dead.is_empty() {
            return Ok(0);
        }

        let conn = self.connect()?;
        for lock in &dead {
            conn.execute(
                "DELETE FROM process_locks WHERE process_id = ?1 AND hostname = ?2",
                params![lock.process_id, lock.hostname],
            )?;
            warn!(
                pid = lock.process_id,
                host = %lock.hostname,
                "reclaimed stale process lock"
            );
        }

        Ok(dead.len())
    }

    /// Delete every lock row. Use with caution.
    pub fn force_release_all(&self) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute("DELETE FROM process_locks", [])?;
        warn!(count, "all process locks force released");
        Ok(count)
    }

    /// All lock rows, including stale ones.
    pub fn all(&self) -> Result<Vec<ProcessLock>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT process_id, hostname, acquired_at
             FROM process_locks ORDER BY acquired_at",
        )?;

        let locks = stmt
            .query_map([], |row| {
                Ok(ProcessLock {
                    process_id: row.get(0)?,
                    hostname: row.get(1)?,
                    acquired_at: super::parse_datetime(&row.get::<_, String>(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locks)
    }

    /// Test-only: insert a lock row for an arbitrary pid.
    #[cfg(test)]
    fn insert_raw(&self, pid: u32, hostname: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO process_locks (process_id, hostname, acquired_at)
             VALUES (?1, ?2, ?3)",
            params![pid, hostname, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
