//! Lock models for cross-process coordination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-product mutex row. At most one non-stale lock exists per
/// product id at any instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLock {
    pub product_id: String,
    pub run_id: i64,
    pub process_id: u32,
    pub locked_at: DateTime<Utc>,
}

/// One live worker process. Many may exist concurrently, bounded by
/// `max_concurrent_scrapers`; a lock whose pid is no longer alive is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLock {
    pub process_id: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}
