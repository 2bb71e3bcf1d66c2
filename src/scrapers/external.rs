//! External helper fetch tier.
//!
//! Last escalation step: hand the URL to an operator-provided command
//! (typically a full browser-automation script) and read the page HTML
//! from its stdout. Invoked as `<command> <url> <timeout> <challenge_wait>`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{FetchStrategy, FetchTier, TierOutcome};
use crate::config::ExternalSettings;

pub struct ExternalTier {
    command: String,
    settings: ExternalSettings,
}

impl ExternalTier {
    /// Returns `None` when no helper command is configured.
    pub fn from_settings(settings: &ExternalSettings) -> Option<Self> {
        let command = settings.command.clone()?;
        // Resolve through PATH up front so a missing helper is reported
        // once at startup rather than per URL.
        match which::which(&command) {
            Ok(resolved) => Some(Self {
                command: resolved.to_string_lossy().into_owned(),
                settings: settings.clone(),
            }),
            Err(e) => {
                warn!(command, error = %e, "external helper not found, tier disabled");
                None
            }
        }
    }

    async fn run(&self, url: &str) -> anyhow::Result<Option<String>> {
        debug!(command = %self.command, url, "invoking external helper");

        let child = Command::new(&self.command)
            .arg(url)
            .arg(self.settings.timeout_secs.to_string())
            .arg(self.settings.challenge_wait_secs.to_string())
            .kill_on_drop(true)
            .output();

        // Grace on top of the helper's own budget before giving up
        let budget = Duration::from_secs(self.settings.timeout_secs + 30);
        let output = tokio::time::timeout(budget, child)
            .await
            .map_err(|_| anyhow::anyhow!("external helper timed out"))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url, status = ?output.status.code(), %stderr, "external helper failed");
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

#[async_trait]
impl FetchStrategy for ExternalTier {
    fn tier(&self) -> FetchTier {
        FetchTier::External
    }

    async fn fetch(&self, url: &str) -> TierOutcome {
        match self.run(url).await {
            Ok(Some(body)) if !body.trim().is_empty() => TierOutcome::Success(body),
            Ok(_) => TierOutcome::Failed,
            Err(e) => {
                warn!(url, error = %e, "external tier error");
                TierOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalSettings;

    #[test]
    fn test_unconfigured_tier_is_disabled() {
        let settings = ExternalSettings::default();
        assert!(ExternalTier::from_settings(&settings).is_none());
    }

    #[test]
    fn test_missing_command_is_disabled() {
        let settings = ExternalSettings {
            command: Some("definitely-not-a-real-command-xyz".into()),
            ..ExternalSettings::default()
        };
        assert!(ExternalTier::from_settings(&settings).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_stdout_becomes_body() {
        let settings = ExternalSettings {
            command: Some("echo".into()),
            ..ExternalSettings::default()
        };
        let tier = ExternalTier::from_settings(&settings).unwrap();
        match tier.fetch("https://example.com/p/1").await {
            TierOutcome::Success(body) => {
                assert!(body.contains("https://example.com/p/1"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_failure_is_reported() {
        let settings = ExternalSettings {
            command: Some("false".into()),
            ..ExternalSettings::default()
        };
        let tier = ExternalTier::from_settings(&settings).unwrap();
        assert!(matches!(
            tier.fetch("https://example.com").await,
            TierOutcome::Failed
        ));
    }
}
