//! Direct HTTP fetch tier.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::{debug, warn};

use super::{FetchStrategy, FetchTier, TierOutcome};
use crate::config::{HttpSettings, Settings};

pub const USER_AGENT: &str = "pricewatch/0.4 (price tracking; +https://github.com/pricewatch)";

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Response headers whose presence marks a managed bot challenge.
const CHALLENGE_MARKERS: &[&str] = &["x-kpsdk-ct", "x-kpsdk-cd", "cf-mitigated"];

/// Resolve a user agent from config.
/// - `None` => fixed pricewatch identity
/// - `Some("impersonate")` => random real browser user agent
/// - `Some(custom)` => used verbatim
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => IMPERSONATE_USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENT)
            .to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// First fetch tier: plain HTTP with retries and challenge detection.
pub struct HttpTier {
    client: Client,
    settings: HttpSettings,
}

impl HttpTier {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let user_agent = resolve_user_agent(settings.user_agent.as_deref());
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(settings.http.timeout_secs))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            settings: settings.http.clone(),
        })
    }

    /// One GET attempt: a 2xx body is success; challenge-marker headers
    /// on a non-success response mean a bot challenge.
    async fn attempt(&self, url: &str) -> Result<AttemptResult, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return Ok(AttemptResult::Body(body));
        }

        let challenged = CHALLENGE_MARKERS
            .iter()
            .any(|marker| response.headers().contains_key(*marker));
        if challenged {
            return Ok(AttemptResult::Challenged);
        }

        Ok(AttemptResult::Status(status.as_u16()))
    }
}

enum AttemptResult {
    Body(String),
    Challenged,
    Status(u16),
}

#[async_trait]
impl FetchStrategy for HttpTier {
    fn tier(&self) -> FetchTier {
        FetchTier::Http
    }

    async fn fetch(&self, url: &str) -> TierOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(url).await {
                Ok(AttemptResult::Body(body)) => {
                    debug!(url, attempt, bytes = body.len(), "http fetch succeeded");
                    return TierOutcome::Success(body);
                }
                Ok(AttemptResult::Challenged) => {
                    warn!(url, attempt, "bot challenge detected on http tier");
                    return TierOutcome::Challenged;
                }
                Ok(AttemptResult::Status(status)) => {
                    if attempt >= self.settings.max_retries {
                        warn!(url, status, "http tier exhausted retries");
                        return TierOutcome::Failed;
                    }
                    // 202 means the site accepted the request but is still
                    // deciding; 429 is an explicit rate limit.
                    let wait = match status {
                        202 => self.settings.challenge_wait_secs,
                        429 => self.settings.rate_limit_wait_secs,
                        _ => self.settings.retry_wait_secs,
                    };
                    debug!(url, status, attempt, wait, "retrying http fetch");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => {
                    if attempt >= self.settings.max_retries {
                        warn!(url, error = %e, "http tier failed");
                        return TierOutcome::Failed;
                    }
                    debug!(url, error = %e, attempt, "http request error, retrying");
                    tokio::time::sleep(Duration::from_secs(self.settings.retry_wait_secs)).await;
                }
            }
        }
    }
}
