//! Scraper run lifecycle models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a batch run. Exactly one terminal transition
/// (`Completed` or `Failed`) happens per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One batch invocation with its aggregate statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperRun {
    /// Database row id.
    pub id: i64,
    pub process_id: u32,
    pub hostname: String,
    /// Requested item limit, if any.
    pub limit_requested: Option<u32>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub items_processed: u32,
    pub items_failed: u32,
    pub items_total: u32,
    pub bot_challenges: u32,
    pub successful_bypasses: u32,
    pub error_message: Option<String>,
}

/// Aggregates over all terminated runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_runs: u32,
    pub completed_runs: u32,
    pub failed_runs: u32,
    pub total_items_processed: u64,
    pub total_items_failed: u64,
    pub total_bot_challenges: u64,
    pub total_successful_bypasses: u64,
    pub avg_duration_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::from_str(status.as_str()), Some(status));
        }
    }
}
