//! Configuration for pricewatch.
//!
//! Settings are loaded once from a TOML file (plus environment overrides)
//! and passed explicitly to every component. There is no process-wide
//! mutable configuration cache; the lock and run tables are the only
//! shared mutable state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "pricewatch.toml";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the shared SQLite database.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Base delay between requests in seconds. The actual delay is drawn
    /// uniformly from `[base, 2 * base]`.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    /// Minimum re-scrape interval: a product observed more recently than
    /// this is never selected for another scrape.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Item locks older than this are considered orphaned and reclaimed.
    #[serde(default = "default_item_lock_timeout")]
    pub item_lock_timeout_secs: u64,

    /// Maximum number of concurrently running worker processes.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scrapers: u32,

    /// User agent configuration.
    /// - unset: fixed pricewatch identity
    /// - "impersonate": randomly selected real browser user agent
    /// - anything else: used verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Bodies smaller than this (bytes) are flagged as suspected soft
    /// blocks regardless of which fetch tier produced them.
    #[serde(default = "default_soft_block_threshold")]
    pub soft_block_threshold: usize,

    /// Phrases that mark a page as a 404 / not-found page. Matched
    /// case-insensitively in the title and the start of the body.
    #[serde(default = "default_not_found_markers")]
    pub not_found_markers: Vec<String>,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub external: ExternalSettings,
}

/// Direct HTTP fetch tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts before the tier reports failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait after an async-acceptance response (202) before retrying.
    #[serde(default = "default_challenge_wait")]
    pub challenge_wait_secs: u64,

    /// Wait after a rate-limited response (429) before retrying.
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,

    /// Wait after any other failed attempt before retrying.
    #[serde(default = "default_retry_wait")]
    pub retry_wait_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            max_retries: default_max_retries(),
            challenge_wait_secs: default_challenge_wait(),
            rate_limit_wait_secs: default_rate_limit_wait(),
            retry_wait_secs: default_retry_wait(),
        }
    }
}

/// Headless browser fetch tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Whether the browser tier is available for escalation.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Run in headless mode. Set to false for debugging or if headless
    /// detection is an issue.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Page load timeout in seconds.
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,

    /// Rendered documents below this size keep being polled until
    /// `max_wait_secs` elapses (client-side challenges resolve slowly).
    #[serde(default = "default_min_content_bytes")]
    pub min_content_bytes: usize,

    /// Interval between content polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum total time to wait for the rendered document to grow.
    #[serde(default = "default_browser_max_wait")]
    pub max_wait_secs: u64,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            timeout_secs: default_browser_timeout(),
            min_content_bytes: default_min_content_bytes(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_browser_max_wait(),
            chrome_args: Vec::new(),
        }
    }
}

/// External browser-automation helper settings (last fetch tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSettings {
    /// Helper command. Invoked as `<command> <url> <timeout> <challenge_wait>`
    /// and expected to print the page HTML to stdout. Unset disables the tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Helper timeout in seconds.
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Challenge-wait budget passed to the helper.
    #[serde(default = "default_external_challenge_wait")]
    pub challenge_wait_secs: u64,
}

impl Default for ExternalSettings {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_external_timeout(),
            challenge_wait_secs: default_external_challenge_wait(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("pricewatch.db")
}

fn default_base_delay() -> u64 {
    1
}

fn default_min_interval() -> u64 {
    3600
}

fn default_item_lock_timeout() -> u64 {
    180
}

fn default_max_concurrent() -> u32 {
    5
}

fn default_soft_block_threshold() -> usize {
    10_240
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_challenge_wait() -> u64 {
    10
}

fn default_rate_limit_wait() -> u64 {
    5
}

fn default_retry_wait() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_browser_timeout() -> u64 {
    90
}

fn default_min_content_bytes() -> usize {
    10_240
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_browser_max_wait() -> u64 {
    30
}

fn default_external_timeout() -> u64 {
    90
}

fn default_external_challenge_wait() -> u64 {
    15
}

fn default_not_found_markers() -> Vec<String> {
    [
        "404",
        "not found",
        "page not found",
        "error 404",
        "page doesn't exist",
        // German retail sites
        "seite nicht gefunden",
        "diese seite existiert nicht",
        "fehler 404",
        "nicht verf\u{fc}gbar",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            base_delay_secs: default_base_delay(),
            min_interval_secs: default_min_interval(),
            item_lock_timeout_secs: default_item_lock_timeout(),
            max_concurrent_scrapers: default_max_concurrent(),
            user_agent: None,
            soft_block_threshold: default_soft_block_threshold(),
            not_found_markers: default_not_found_markers(),
            http: HttpSettings::default(),
            browser: BrowserSettings::default(),
            external: ExternalSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, `$PRICEWATCH_CONFIG`, or
    /// `pricewatch.toml` in the working directory. A missing file yields
    /// defaults; a malformed file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os("PRICEWATCH_CONFIG")
                .map(PathBuf::from)
                .or_else(|| {
                    let default = PathBuf::from(CONFIG_FILE);
                    default.exists().then_some(default)
                }),
        };

        let mut settings = match candidate {
            Some(p) => {
                let raw = std::fs::read_to_string(&p)
                    .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", p.display(), e))?;
                toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", p.display(), e))?
            }
            None => Settings::default(),
        };

        // Environment override for the database location
        if let Some(db) = std::env::var_os("PRICEWATCH_DB") {
            settings.database_path = PathBuf::from(db);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.min_interval_secs, 3600);
        assert_eq!(settings.item_lock_timeout_secs, 180);
        assert_eq!(settings.max_concurrent_scrapers, 5);
        assert_eq!(settings.soft_block_threshold, 10_240);
        assert!(settings.browser.enabled);
        assert!(settings.external.command.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            base_delay_secs = 3

            [http]
            max_retries = 5

            [browser]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.base_delay_secs, 3);
        assert_eq!(settings.http.max_retries, 5);
        assert_eq!(settings.http.timeout_secs, 30);
        assert!(!settings.browser.enabled);
        assert_eq!(settings.browser.min_content_bytes, 10_240);
    }

    #[test]
    fn test_not_found_markers_default() {
        let markers = default_not_found_markers();
        assert!(markers.iter().any(|m| m == "page not found"));
        assert!(markers.iter().any(|m| m == "seite nicht gefunden"));
    }
}
