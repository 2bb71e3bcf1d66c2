//! Headless browser fetch tier for anti-bot protected sites.
//!
//! Uses chromiumoxide (CDP) with stealth evasion scripts. Client-side
//! challenges (Akamai, Cloudflare, Kasada) resolve inside the real
//! browser, so the rendered document is polled until it grows past the
//! configured minimum size or the wait budget runs out.

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

use super::{FetchStrategy, FetchTier, TierOutcome};
use crate::config::BrowserSettings;

/// Stealth evasion JavaScript injected after navigation.
/// Based on puppeteer-extra-plugin-stealth techniques.
#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix permissions
    r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // Fix languages
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // Remove automation-related properties
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
    // Fix WebGL vendor/renderer (common detection vector)
    r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) {
            return 'Intel Inc.';
        }
        if (parameter === 37446) {
            return 'Intel Iris OpenGL Engine';
        }
        return getParameter.call(this, parameter);
    };
    "#,
];

/// Second fetch tier: headless Chrome with stealth patches.
#[cfg(feature = "browser")]
pub struct BrowserTier {
    settings: BrowserSettings,
    browser: Mutex<Option<Browser>>,
}

#[cfg(feature = "browser")]
impl BrowserTier {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: Mutex::new(None),
        }
    }

    /// Find a Chrome executable.
    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Please install it:\n\
             - Arch/Manjaro: sudo pacman -S chromium\n\
             - Ubuntu/Debian: sudo apt install chromium-browser\n\
             - Fedora: sudo dnf install chromium\n\
             - Or download from: https://www.google.com/chrome/"
        ))
    }

    /// Launch the browser if not already running.
    async fn ensure_browser(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        info!("Launching browser (headless={})", self.settings.headless);

        let chrome_path = Self::find_chrome()?;
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !self.settings.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        *guard = Some(browser);
        Ok(())
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.ensure_browser().await?;

        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("browser not running"))?;
        let page = browser.new_page("about:blank").await?;

        // Close the page on every exit path to prevent tab accumulation
        let result = self.fetch_in_page(&page, url).await;
        let _ = page.close().await;
        result
    }

    async fn fetch_in_page(&self, page: &Page, url: &str) -> Result<String> {
        // Set a realistic user agent before navigation
        let user_agent = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await?;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;
        page.execute(nav_params).await?;

        // Wait for the document to be ready instead of a fixed timeout
        let wait_for_ready_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                    setTimeout(() => resolve('timeout'), 10000);
                }
            })
        "#;

        let ready_timeout = Duration::from_secs(self.settings.timeout_secs);
        match tokio::time::timeout(
            ready_timeout,
            page.evaluate(wait_for_ready_script.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state: {}", e);
            }
            Err(_) => {
                warn!("Timeout waiting for page ready state");
            }
        }

        self.apply_stealth(page).await;

        // Challenges render the real document only after their scripts
        // settle; keep polling until the content reaches a plausible size.
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.settings.max_wait_secs);

        let mut content = page.content().await?;
        while content.len() < self.settings.min_content_bytes
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(poll_interval).await;
            content = page.content().await?;
        }

        debug!(url, bytes = content.len(), "browser fetch finished");
        Ok(content)
    }

    /// Apply stealth evasion scripts to a page. Best effort.
    async fn apply_stealth(&self, page: &Page) {
        for script in STEALTH_SCRIPTS {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Stealth script injection skipped: {}", e);
            }
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl FetchStrategy for BrowserTier {
    fn tier(&self) -> FetchTier {
        FetchTier::Browser
    }

    async fn fetch(&self, url: &str) -> TierOutcome {
        match self.fetch_page(url).await {
            Ok(content) if !content.is_empty() => TierOutcome::Success(content),
            Ok(_) => {
                warn!(url, "browser returned empty document");
                TierOutcome::Failed
            }
            Err(e) => {
                warn!(url, error = %e, "browser fetch failed");
                TierOutcome::Failed
            }
        }
    }
}

// Stub for when the browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct BrowserTier {
    _settings: BrowserSettings,
}

#[cfg(not(feature = "browser"))]
impl BrowserTier {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            _settings: settings,
        }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl FetchStrategy for BrowserTier {
    fn tier(&self) -> FetchTier {
        FetchTier::Browser
    }

    async fn fetch(&self, _url: &str) -> TierOutcome {
        tracing::warn!("browser support not compiled; rebuild with --features browser");
        TierOutcome::Failed
    }
}
