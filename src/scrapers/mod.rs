//! Fetch tiers, extraction, and page classification.
//!
//! Fetching escalates through an ordered list of tiers: a direct HTTP
//! client, then a headless browser, then an optional external helper
//! command. Each tier reports whether it got usable HTML, hit a bot
//! challenge, or failed outright; a challenge or failure hands the URL
//! to the next tier.

pub mod browser;
pub mod classify;
pub mod external;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod normalize;

pub use browser::BrowserTier;
pub use classify::{Verdict, classify};
pub use external::ExternalTier;
pub use extract::{Extraction, extract};
pub use fetch::{FetchOutcome, TieredFetcher};
pub use http_client::HttpTier;
pub use normalize::{clean_price, map_availability};

use async_trait::async_trait;

/// Which tier produced a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    Http,
    Browser,
    External,
}

impl FetchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
            Self::External => "external",
        }
    }
}

/// Result of one tier's attempt on a URL.
#[derive(Debug, Clone)]
pub enum TierOutcome {
    /// Usable HTML body.
    Success(String),
    /// A bot challenge was detected; escalate to the next tier.
    Challenged,
    /// The tier failed for a non-challenge reason; escalate anyway.
    Failed,
}

/// One escalation step in the fetch pipeline.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn tier(&self) -> FetchTier;

    async fn fetch(&self, url: &str) -> TierOutcome;
}
