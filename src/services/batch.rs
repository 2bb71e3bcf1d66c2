//! Batch orchestration: admission, locking, run lifecycle, cleanup.

use anyhow::Context;
use tracing::{info, warn};

use super::scrape::Scraper;
use crate::config::Settings;
use crate::models::ScraperRun;
use crate::repository::{ItemLockRepository, ProcessLockRepository, ProductRepository, RunRepository};

/// Why a batch did or did not run.
#[derive(Debug)]
pub enum BatchDecision {
    /// The batch ran; the terminated run row is attached.
    Ran(Box<ScraperRun>),
    /// The worker fleet is already at capacity.
    AtCapacity { active: u32, max: u32 },
    /// Nothing is due; no run was recorded.
    NoWork,
}

/// Run one batch end to end.
///
/// Order matters: admission check, process lock, no-work check, run
/// start, stale lock sweep, the item loop, then cleanup in the reverse
/// order of acquisition. Cleanup runs regardless of how the loop ended.
pub async fn run_batch(
    settings: Settings,
    limit: Option<u32>,
    site: Option<&str>,
    site_status: Option<&str>,
    show_progress: bool,
) -> anyhow::Result<BatchDecision> {
    let db = settings.database_path.clone();
    let process_locks = ProcessLockRepository::new(&db)?;
    let item_locks = ItemLockRepository::new(&db)?;
    let runs = RunRepository::new(&db)?;
    let products = ProductRepository::new(&db)?;

    // Best-effort admission check. Two workers racing it can both get
    // in; the cap is a throttle, not a hard invariant.
    let active = process_locks.count_active()?;
    if active >= settings.max_concurrent_scrapers {
        info!(
            active,
            max = settings.max_concurrent_scrapers,
            "worker fleet at capacity, not starting"
        );
        return Ok(BatchDecision::AtCapacity {
            active,
            max: settings.max_concurrent_scrapers,
        });
    }

    process_locks.acquire()?;

    // Look for work before recording a run, so idle invocations leave
    // no empty run rows behind.
    let due_check = products.find_due(settings.min_interval_secs, site, site_status, Some(1));
    match due_check {
        Ok(due) if due.is_empty() => {
            info!("nothing due, exiting");
            let _ = process_locks.release();
            return Ok(BatchDecision::NoWork);
        }
        Ok(_) => {}
        Err(e) => {
            let _ = process_locks.release();
            return Err(e.into());
        }
    }

    let reclaimed = item_locks.sweep_stale(settings.item_lock_timeout_secs)?;
    if reclaimed > 0 {
        warn!(reclaimed, "reclaimed stale item locks before batch");
    }

    let run_id = runs.start(limit)?;
    info!(run_id, ?limit, site, site_status, "batch started");

    let mut scraper = Scraper::new(settings)?;
    let result = scraper
        .scrape_batch(run_id, limit, site, site_status, show_progress)
        .await;

    // Terminate the run, release item locks, release the process lock.
    // Each step happens even when an earlier one fails.
    let challenges = scraper.bot_challenges();
    let bypasses = scraper.successful_bypasses();

    let run_result = match &result {
        Ok(report) => runs.complete(
            run_id,
            report.processed,
            report.failed,
            report.total,
            challenges,
            bypasses,
        ),
        Err(e) => runs.fail(run_id, &e.to_string()),
    };
    if let Err(e) = run_result {
        warn!(run_id, error = %e, "could not terminate run row");
    }

    if let Err(e) = item_locks.release_all(run_id) {
        warn!(run_id, error = %e, "item lock cleanup failed");
    }
    if let Err(e) = process_locks.release() {
        warn!(error = %e, "process lock release failed");
    }

    let report = result?;
    info!(
        run_id,
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped,
        challenges,
        bypasses,
        "batch finished"
    );

    let run = runs
        .get(run_id)?
        .context("run row vanished after completion")?;
    Ok(BatchDecision::Ran(Box::new(run)))
}
