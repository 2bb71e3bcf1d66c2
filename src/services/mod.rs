//! Scrape execution and batch orchestration.

pub mod batch;
pub mod scrape;

pub use batch::{BatchDecision, run_batch};
pub use scrape::{BatchReport, ScrapeOutcome, Scraper};
