//! Tiered fetch escalation.

use tracing::{debug, info, warn};

use super::{BrowserTier, ExternalTier, FetchStrategy, FetchTier, HttpTier, TierOutcome};
use crate::config::Settings;

/// Final result of running a URL through the tier pipeline.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Page HTML, if any tier succeeded.
    pub body: Option<String>,
    /// The tier that produced the body.
    pub tier: Option<FetchTier>,
    /// At least one tier hit a bot challenge for this URL.
    pub challenged: bool,
    /// Body present but suspiciously small; likely a soft block page.
    pub soft_blocked: bool,
}

/// Runs each URL through the configured tiers in order, counting
/// challenges and successful bypasses across the whole batch.
pub struct TieredFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
    soft_block_threshold: usize,
    bot_challenges: u32,
    successful_bypasses: u32,
}

impl TieredFetcher {
    /// Build the pipeline from settings: HTTP always, browser when
    /// enabled, external helper when configured.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut strategies: Vec<Box<dyn FetchStrategy>> =
            vec![Box::new(HttpTier::new(settings)?)];

        if settings.browser.enabled {
            strategies.push(Box::new(BrowserTier::new(settings.browser.clone())));
        }
        if let Some(external) = ExternalTier::from_settings(&settings.external) {
            strategies.push(Box::new(external));
        }

        Ok(Self::new(strategies, settings.soft_block_threshold))
    }

    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>, soft_block_threshold: usize) -> Self {
        Self {
            strategies,
            soft_block_threshold,
            bot_challenges: 0,
            successful_bypasses: 0,
        }
    }

    /// Escalate the URL through the tiers until one succeeds.
    pub async fn fetch(&mut self, url: &str) -> FetchOutcome {
        let mut challenged = false;
        let mut last_was_challenge = false;

        for strategy in &self.strategies {
            let tier = strategy.tier();
            debug!(url, tier = tier.as_str(), "trying fetch tier");

            match strategy.fetch(url).await {
                TierOutcome::Success(body) => {
                    if last_was_challenge {
                        self.successful_bypasses += 1;
                        info!(url, tier = tier.as_str(), "bot challenge bypassed");
                    }
                    let soft_blocked = body.len() < self.soft_block_threshold;
                    if soft_blocked {
                        warn!(
                            url,
                            tier = tier.as_str(),
                            bytes = body.len(),
                            "suspiciously small body, possible soft block"
                        );
                    }
                    return FetchOutcome {
                        body: Some(body),
                        tier: Some(tier),
                        challenged,
                        soft_blocked,
                    };
                }
                TierOutcome::Challenged => {
                    self.bot_challenges += 1;
                    challenged = true;
                    last_was_challenge = true;
                    warn!(url, tier = tier.as_str(), "tier challenged, escalating");
                }
                TierOutcome::Failed => {
                    last_was_challenge = false;
                    debug!(url, tier = tier.as_str(), "tier failed, escalating");
                }
            }
        }

        warn!(url, "all fetch tiers exhausted");
        FetchOutcome {
            body: None,
            tier: None,
            challenged,
            soft_blocked: false,
        }
    }

    pub fn bot_challenges(&self) -> u32 {
        self.bot_challenges
    }

    pub fn successful_bypasses(&self) -> u32 {
        self.successful_bypasses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedTier {
        tier: FetchTier,
        outcome: TierOutcome,
    }

    #[async_trait]
    impl FetchStrategy for FixedTier {
        fn tier(&self) -> FetchTier {
            self.tier
        }

        async fn fetch(&self, _url: &str) -> TierOutcome {
            self.outcome.clone()
        }
    }

    fn tier(tier: FetchTier, outcome: TierOutcome) -> Box<dyn FetchStrategy> {
        Box::new(FixedTier { tier, outcome })
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let mut fetcher = TieredFetcher::new(
            vec![
                tier(FetchTier::Http, TierOutcome::Success("x".repeat(20_000))),
                tier(FetchTier::Browser, TierOutcome::Failed),
            ],
            10_240,
        );

        let outcome = fetcher.fetch("https://example.com").await;
        assert_eq!(outcome.tier, Some(FetchTier::Http));
        assert!(!outcome.challenged);
        assert!(!outcome.soft_blocked);
        assert_eq!(fetcher.bot_challenges(), 0);
    }

    #[tokio::test]
    async fn test_challenge_escalates_and_counts_bypass() {
        let mut fetcher = TieredFetcher::new(
            vec![
                tier(FetchTier::Http, TierOutcome::Challenged),
                tier(FetchTier::Browser, TierOutcome::Success("x".repeat(20_000))),
            ],
            10_240,
        );

        let outcome = fetcher.fetch("https://example.com").await;
        assert_eq!(outcome.tier, Some(FetchTier::Browser));
        assert!(outcome.challenged);
        assert_eq!(fetcher.bot_challenges(), 1);
        assert_eq!(fetcher.successful_bypasses(), 1);
    }

    #[tokio::test]
    async fn test_failure_between_challenge_and_success_is_not_a_bypass() {
        let mut fetcher = TieredFetcher::new(
            vec![
                tier(FetchTier::Http, TierOutcome::Challenged),
                tier(FetchTier::Browser, TierOutcome::Failed),
                tier(FetchTier::External, TierOutcome::Success("x".repeat(20_000))),
            ],
            10_240,
        );

        let outcome = fetcher.fetch("https://example.com").await;
        assert_eq!(outcome.tier, Some(FetchTier::External));
        assert_eq!(fetcher.bot_challenges(), 1);
        assert_eq!(fetcher.successful_bypasses(), 0);
    }

    #[tokio::test]
    async fn test_all_tiers_exhausted() {
        let mut fetcher = TieredFetcher::new(
            vec![
                tier(FetchTier::Http, TierOutcome::Failed),
                tier(FetchTier::Browser, TierOutcome::Challenged),
            ],
            10_240,
        );

        let outcome = fetcher.fetch("https://example.com").await;
        assert!(outcome.body.is_none());
        assert!(outcome.tier.is_none());
        assert!(outcome.challenged);
    }

    #[tokio::test]
    async fn test_small_body_flags_soft_block() {
        let mut fetcher = TieredFetcher::new(
            vec![tier(
                FetchTier::Http,
                TierOutcome::Success("tiny page".into()),
            )],
            10_240,
        );

        let outcome = fetcher.fetch("https://example.com").await;
        assert!(outcome.soft_blocked);
        assert!(outcome.body.is_some());
    }
}
