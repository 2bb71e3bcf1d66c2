//! Batch run lifecycle and statistics.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;
use tracing::{debug, warn};

use super::{Result, to_option};
use crate::models::{RunStatistics, RunStatus, ScraperRun};
use crate::utils::process;

/// SQLite-backed run ledger. Every batch invocation gets exactly one
/// row, created at start and terminated once via `complete` or `fail`.
pub struct RunRepository {
    db_path: PathBuf,
}

impl RunRepository {
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
            CREATE TABLE IF NOT EXISTS scraper_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process_id INTEGER NOT NULL,
                hostname TEXT NOT NULL,
                limit_requested INTEGER,
                status TEXT NOT NULL DEFAULT 'running',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_secs INTEGER,
                items_processed INTEGER NOT NULL DEFAULT 0,
                items_failed INTEGER NOT NULL DEFAULT 0,
                items_total INTEGER NOT NULL DEFAULT 0,
                bot_challenges INTEGER NOT NULL DEFAULT 0,
                successful_bypasses INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_runs_status ON scraper_runs(status);
        "#,
        )?;
        Ok(())
    }

    /// Record the start of a run and return its id.
    pub fn start(&self, limit: Option<u32>) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO scraper_runs (process_id, hostname, limit_requested, status, started_at)
             VALUES (?1, ?2, ?3, 'running', ?4)",
            params![
                process::current_pid(),
                process::current_hostname(),
                limit,
                Utc::now().to_rfc3339()
            ],
        )?;
        let run_id = conn.last_insert_rowid();
        debug!(run_id, ?limit, "run started");
        Ok(run_id)
    }

    /// Close a run as completed with its final counters.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        &self,
        run_id: i64,
        processed: u32,
        failed: u32,
        total: u32,
        bot_challenges: u32,
        successful_bypasses: u32,
    ) -> Result<()> {
        self.finish(
            run_id,
            RunStatus::Completed,
            processed,
            failed,
            total,
            bot_challenges,
            successful_bypasses,
            None,
        )
    }

    /// Close a run as failed, recording the error message.
    pub fn fail(&self, run_id: i64, message: &str) -> Result<()> {
        warn!(run_id, message, "run failed");
        self.finish(run_id, RunStatus::Failed, 0, 0, 0, 0, 0, Some(message))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        processed: u32,
        failed: u32,
        total: u32,
        bot_challenges: u32,
        successful_bypasses: u32,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.connect()?;

        // Duration is computed here rather than in SQL; the stored
        // timestamps carry sub-second precision SQLite date functions
        // do not parse.
        let started_at: Option<String> = to_option(conn.query_row(
            "SELECT started_at FROM scraper_runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        ))?;
        let now = Utc::now();
        let duration_secs = started_at
            .map(|s| (now - super::parse_datetime(&s)).num_seconds())
            .map(|d| d.max(0));

        conn.execute(
            "UPDATE scraper_runs
             SET status = ?1, ended_at = ?2, duration_secs = ?3,
                 items_processed = ?4, items_failed = ?5, items_total = ?6,
                 bot_challenges = ?7, successful_bypasses = ?8, error_message = ?9
             WHERE id = ?10",
            params![
                status.as_str(),
                now.to_rfc3339(),
                duration_secs,
                processed,
                failed,
                total,
                bot_challenges,
                successful_bypasses,
                error_message,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, run_id: i64) -> Result<Option<ScraperRun>> {
        let conn = self.connect()?;
        to_option(conn.query_row(
            &format!("SELECT {} FROM scraper_runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            row_to_run,
        ))
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<ScraperRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scraper_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit], row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Aggregate statistics over all terminated runs.
    pub fn statistics(&self) -> Result<RunStatistics> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(SUM(items_processed), 0),
                    COALESCE(SUM(items_failed), 0),
                    COALESCE(SUM(bot_challenges), 0),
                    COALESCE(SUM(successful_bypasses), 0),
                    AVG(duration_secs)
             FROM scraper_runs
             WHERE status != 'running'",
            [],
            |row| {
                Ok(RunStatistics {
                    total_runs: row.get(0)?,
                    completed_runs: row.get(1)?,
                    failed_runs: row.get(2)?,
                    total_items_processed: row.get(3)?,
                    total_items_failed: row.get(4)?,
                    total_bot_challenges: row.get(5)?,
                    total_successful_bypasses: row.get(6)?,
                    avg_duration_secs: row.get(7)?,
                })
            },
        )
        .map_err(Into::into)
    }
}

const RUN_COLUMNS: &str = "id, process_id, hostname, limit_requested, status, started_at, \
     ended_at, duration_secs, items_processed, items_failed, items_total, \
     bot_challenges, successful_bypasses, error_message";

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScraperRun> {
    let status: String = row.get(4)?;
    Ok(ScraperRun {
        id: row.get(0)?,
        process_id: row.get(1)?,
        hostname: row.get(2)?,
        limit_requested: row.get(3)?,
        status: RunStatus::from_str(&status).unwrap_or(RunStatus::Failed),
        started_at: super::parse_datetime(&row.get::<_, String>(5)?),
        ended_at: super::parse_datetime_opt(row.get(6)?),
        duration_secs: row.get(7)?,
        items_processed: row.get(8)?,
        items_failed: row.get(9)?,
        items_total: row.get(10)?,
        bot_challenges: row.get(11)?,
        successful_bypasses: row.get(12)?,
        error_message: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, RunRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_start_and_complete() {
        let (_dir, repo) = repo();

        let run_id = repo.start(Some(50)).unwrap();
        let run = repo.get(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.limit_requested, Some(50));
        assert!(run.ended_at.is_none());

        repo.complete(run_id, 48, 2, 50, 3, 1).unwrap();
        let run = repo.get(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.items_processed, 48);
        assert_eq!(run.items_failed, 2);
        assert_eq!(run.items_total, 50);
        assert_eq!(run.bot_challenges, 3);
        assert_eq!(run.successful_bypasses, 1);
        assert!(run.ended_at.is_some());
        assert!(run.duration_secs.is_some());
    }

    #[test]
    fn test_fail_records_message() {
        let (_dir, repo) = repo();

        let run_id = repo.start(None).unwrap();
        repo.fail(run_id, "database write failed").unwrap();

        let run = repo.get(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("database write failed"));
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let (_dir, repo) = repo();

        let first = repo.start(None).unwrap();
        let second = repo.start(None).unwrap();

        let runs = repo.recent(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);

        assert_eq!(repo.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_statistics_exclude_running() {
        let (_dir, repo) = repo();

        let a = repo.start(None).unwrap();
        let b = repo.start(None).unwrap();
        let _still_running = repo.start(None).unwrap();

        repo.complete(a, 10, 0, 10, 2, 2).unwrap();
        repo.fail(b, "boom").unwrap();

        let stats = repo.statistics().unwrap();
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.completed_runs, 1);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.total_items_processed, 10);
        assert_eq!(stats.total_bot_challenges, 2);
        assert_eq!(stats.total_successful_bypasses, 2);
    }
}
