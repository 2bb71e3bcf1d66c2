//! Per-item scrape execution.

use std::time::Duration;

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::models::{Availability, PriceEntry, Product, SiteConfig, UrlStatus};
use crate::repository::{
    ItemLockRepository, PriceHistoryRepository, ProductRepository, RepositoryError,
    SiteConfigRepository,
};
use crate::scrapers::{self, FetchTier, TieredFetcher};
use crate::utils::{jittered_delay_secs, process};

/// Result of scraping one product.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub product_id: String,
    pub status: UrlStatus,
    pub price: Option<f64>,
    pub name: Option<String>,
    pub availability: Availability,
    pub tier: Option<FetchTier>,
    pub challenged: bool,
}

/// Aggregate result of one batch loop.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Items that yielded usable data.
    pub processed: u32,
    /// Items attempted but yielding nothing.
    pub failed: u32,
    /// Items skipped because another worker held their lock.
    pub skipped: u32,
    /// Items attempted (`processed + failed`).
    pub total: u32,
}

/// Scrapes products through the tiered fetch pipeline and persists the
/// results. One instance per batch; it owns the challenge counters.
pub struct Scraper {
    settings: Settings,
    products: ProductRepository,
    history: PriceHistoryRepository,
    sites: SiteConfigRepository,
    item_locks: ItemLockRepository,
    fetcher: TieredFetcher,
}

impl Scraper {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let db = &settings.database_path;
        let fetcher = TieredFetcher::from_settings(&settings)?;
        Ok(Self {
            products: ProductRepository::new(db)?,
            history: PriceHistoryRepository::new(db)?,
            sites: SiteConfigRepository::new(db)?,
            item_locks: ItemLockRepository::new(db)?,
            settings,
            fetcher,
        })
    }

    pub fn bot_challenges(&self) -> u32 {
        self.fetcher.bot_challenges()
    }

    pub fn successful_bypasses(&self) -> u32 {
        self.fetcher.successful_bypasses()
    }

    /// Scrape a URL that may not be tracked yet. Tracked URLs update
    /// their product; untracked ones are fetched and reported only.
    pub async fn scrape_url(&mut self, url: &str) -> anyhow::Result<ScrapeOutcome> {
        match self.products.get_by_url(url)? {
            Some(product) => self.scrape_product(&product).await,
            None => {
                let transient = Product::new(format!("adhoc:{url}"), url.to_string());
                self.run_pipeline(&transient, false).await
            }
        }
    }

    pub async fn scrape_by_product_id(&mut self, product_id: &str) -> anyhow::Result<ScrapeOutcome> {
        let product = self
            .products
            .get(product_id)?
            .with_context(|| format!("unknown product: {product_id}"))?;
        self.scrape_product(&product).await
    }

    /// Scrape one tracked product and persist the result.
    pub async fn scrape_product(&mut self, product: &Product) -> anyhow::Result<ScrapeOutcome> {
        self.run_pipeline(product, true).await
    }

    async fn run_pipeline(
        &mut self,
        product: &Product,
        persist: bool,
    ) -> anyhow::Result<ScrapeOutcome> {
        let site_config = self.site_config_for(&product.url)?;

        let outcome = self.fetcher.fetch(&product.url).await;
        if outcome.body.is_none() {
            if persist {
                self.products.set_url_status(
                    &product.product_id,
                    UrlStatus::Error,
                    product.consecutive_failed_scrapes,
                )?;
            }
            return Ok(ScrapeOutcome {
                product_id: product.product_id.clone(),
                status: UrlStatus::Error,
                price: None,
                name: None,
                availability: Availability::Unknown,
                tier: None,
                challenged: outcome.challenged,
            });
        }

        let body = outcome.body.as_deref().unwrap_or_default();
        let extraction = scrapers::extract(body, &site_config);
        let verdict = scrapers::classify(
            &outcome,
            &extraction,
            product.consecutive_failed_scrapes,
            &self.settings,
        );

        if persist {
            self.products.apply_scrape(
                &product.product_id,
                extraction.name.as_deref(),
                extraction.price,
                extraction.uvp,
                extraction.image_url.as_deref(),
                extraction.site_status.as_deref(),
                verdict.status,
                verdict.consecutive_failures,
            )?;

            if let Some(price) = extraction.price {
                let entry = PriceEntry {
                    product_id: product.product_id.clone(),
                    price,
                    uvp: extraction.uvp,
                    currency: site_config.currency.clone(),
                    seller: extraction.seller.clone(),
                    site_status: extraction.site_status.clone(),
                    availability: extraction.availability,
                    fetched_at: chrono::Utc::now(),
                };
                self.history.append(&entry)?;
            }
        }

        info!(
            product_id = %product.product_id,
            status = verdict.status.as_str(),
            price = ?extraction.price,
            tier = ?outcome.tier.map(|t| t.as_str()),
            "scrape finished"
        );

        Ok(ScrapeOutcome {
            product_id: product.product_id.clone(),
            status: verdict.status,
            price: extraction.price,
            name: extraction.name,
            availability: extraction.availability,
            tier: outcome.tier,
            challenged: outcome.challenged,
        })
    }

    /// Work through due products under item locks until `limit` items
    /// were attempted or the due list runs out.
    pub async fn scrape_batch(
        &mut self,
        run_id: i64,
        limit: Option<u32>,
        site: Option<&str>,
        site_status: Option<&str>,
        show_progress: bool,
    ) -> anyhow::Result<BatchReport> {
        // Over-fetch so that items locked by other workers do not eat
        // into the requested batch size.
        let buffer = limit.map(|l| l.saturating_mul(3).min(1000));
        let due = self
            .products
            .find_due(self.settings.min_interval_secs, site, site_status, buffer)?;

        let goal = limit.unwrap_or(due.len() as u32);
        let bar = progress_bar(show_progress, goal as u64);
        let pid = process::current_pid();
        let mut report = BatchReport::default();

        for product in &due {
            if report.total >= goal {
                break;
            }

            let acquired = self.item_locks.try_acquire(
                &product.product_id,
                run_id,
                pid,
                self.settings.item_lock_timeout_secs,
            )?;
            if !acquired {
                debug!(product_id = %product.product_id, "item locked elsewhere, skipping");
                report.skipped += 1;
                continue;
            }

            let result = self.scrape_product(product).await;

            // The lock is released no matter how the scrape went
            if let Err(e) = self.item_locks.release(&product.product_id) {
                warn!(product_id = %product.product_id, error = %e, "item lock release failed");
            }

            match result {
                Ok(outcome) => {
                    report.total += 1;
                    if outcome.status == UrlStatus::Valid {
                        report.processed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    // A failing database aborts the whole batch; anything
                    // else only fails this item.
                    if e.downcast_ref::<RepositoryError>().is_some() {
                        return Err(e.context("persistence failed, aborting batch"));
                    }
                    warn!(product_id = %product.product_id, error = %e, "item scrape errored");
                    report.total += 1;
                    report.failed += 1;
                }
            }

            if let Some(ref bar) = bar {
                bar.inc(1);
            }

            let delay = jittered_delay_secs(self.settings.base_delay_secs);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        Ok(report)
    }

    fn site_config_for(&self, url: &str) -> anyhow::Result<SiteConfig> {
        let parsed = Url::parse(url).with_context(|| format!("invalid product url: {url}"))?;
        let hostname = parsed
            .host_str()
            .with_context(|| format!("product url has no host: {url}"))?;

        match self.sites.find_by_hostname(hostname)? {
            Some(config) => Ok(config),
            None => bail!("no site configuration for {hostname}"),
        }
    }
}

fn progress_bar(show: bool, len: u64) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let bar = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    Some(bar)
}
