//! Run configuration: compiled defaults, then `PITCHSCRAPE_*` environment
//! variables, then command-line flags (applied by the binary).

use crate::live::{RestartThresholds, WarmUp};
use crate::retry::{Backoff, RetryPolicy};
use pitchscrape::{OutputFormat, ScrapeError, ScrapeResult, StatsPeriod};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.flashscore.com";

/// Consent and dialog close buttons clicked after the warm-up navigation.
pub const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "[data-testid='wcl-dialogCloseButton']",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    /// Work items processed at once.
    pub concurrency: usize,
    /// Save a checkpoint after this many completed items.
    pub checkpoint_every: usize,
    /// Write results to the sink after this many successes.
    pub flush_every: usize,
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub thresholds: RestartThresholds,
    /// Older checkpoints are discarded instead of resumed.
    pub checkpoint_max_age: Duration,
    pub stats_period: StatsPeriod,
    pub output_format: OutputFormat,
    pub output_dir: PathBuf,
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub warmup_timeout: Duration,
    /// Random pause before each work item, `[min, max]`.
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub base_url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            checkpoint_every: 10,
            flush_every: 10,
            max_attempts: 4,
            backoff_step: Duration::from_millis(500),
            thresholds: RestartThresholds::default(),
            checkpoint_max_age: Duration::from_secs(2 * 3600),
            stats_period: StatsPeriod::FullTime,
            output_format: OutputFormat::Json,
            output_dir: PathBuf::from("./data"),
            headless: true,
            chromium_path: None,
            navigation_timeout: Duration::from_secs(60),
            selector_timeout: Duration::from_millis(2500),
            warmup_timeout: Duration::from_secs(90),
            delay_min: Duration::from_millis(500),
            delay_max: Duration::from_millis(1500),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults overlaid with any `PITCHSCRAPE_*` variables that parse.
    pub fn from_env() -> Self {
        let d = Self::default();
        let thresholds = RestartThresholds {
            max_memory_bytes: megabytes(read_env_u64(
                "PITCHSCRAPE_MAX_MEMORY_MB",
                d.thresholds.max_memory_bytes / MIB,
            )),
            max_pages: read_env_usize("PITCHSCRAPE_MAX_PAGES", d.thresholds.max_pages),
            max_matches: read_env_u32("PITCHSCRAPE_MAX_MATCHES", d.thresholds.max_matches),
            max_elapsed: minutes(read_env_u64(
                "PITCHSCRAPE_MAX_SESSION_MINUTES",
                d.thresholds.max_elapsed.as_secs() / 60,
            )),
        };

        Self {
            concurrency: read_env_usize("PITCHSCRAPE_CONCURRENCY", d.concurrency),
            checkpoint_every: read_env_usize("PITCHSCRAPE_CHECKPOINT_EVERY", d.checkpoint_every),
            flush_every: read_env_usize("PITCHSCRAPE_FLUSH_EVERY", d.flush_every),
            max_attempts: read_env_u32("PITCHSCRAPE_MAX_ATTEMPTS", d.max_attempts),
            thresholds,
            output_dir: read_env_string("PITCHSCRAPE_OUTPUT_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.output_dir.clone()),
            chromium_path: read_env_string("PITCHSCRAPE_CHROMIUM_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            base_url: read_env_string("PITCHSCRAPE_BASE_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or(d.base_url.clone()),
            ..d
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ScrapeResult<()> {
        let checks: [(bool, &str); 6] = [
            (self.concurrency == 0, "concurrency must be at least 1"),
            (self.max_attempts == 0, "max attempts must be at least 1"),
            (self.checkpoint_every == 0, "checkpoint interval must be at least 1"),
            (self.flush_every == 0, "flush interval must be at least 1"),
            (self.delay_max < self.delay_min, "delay max is below delay min"),
            (
                self.thresholds.max_matches == 0,
                "max matches per session must be at least 1",
            ),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(ScrapeError::Config((*message).to_string()));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ScrapeError::Config(format!(
                "base URL is not a valid URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Linear {
                step: self.backoff_step,
            },
        )
    }

    pub fn warm_up(&self) -> WarmUp {
        WarmUp {
            url: Some(self.base_url.clone()),
            timeout: self.warmup_timeout,
            settle: Duration::from_secs(2),
            dismiss: CONSENT_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const MIB: u64 = 1024 * 1024;

/// Megabytes to bytes, saturating on huge values.
pub fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(MIB)
}

/// Minutes to a duration, saturating on huge values.
pub fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions_saturate() {
        assert_eq!(megabytes(500), 500 * 1024 * 1024);
        assert_eq!(megabytes(u64::MAX), u64::MAX);
        assert_eq!(minutes(15), Duration::from_secs(900));
        assert_eq!(minutes(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ScrapeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.max_memory_bytes, 500 * 1024 * 1024);
        assert_eq!(config.retry_policy().max_attempts, 4);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ScrapeConfig {
            concurrency: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = ScrapeConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        // Names unique to this test so parallel tests don't interfere.
        std::env::set_var("PITCHSCRAPE_MAX_MATCHES", "12");
        std::env::set_var("PITCHSCRAPE_MAX_MEMORY_MB", "256");
        std::env::set_var("PITCHSCRAPE_FLUSH_EVERY", "not-a-number");
        let config = ScrapeConfig::from_env();
        std::env::remove_var("PITCHSCRAPE_MAX_MATCHES");
        std::env::remove_var("PITCHSCRAPE_MAX_MEMORY_MB");
        std::env::remove_var("PITCHSCRAPE_FLUSH_EVERY");

        assert_eq!(config.thresholds.max_matches, 12);
        assert_eq!(config.thresholds.max_memory_bytes, 256 * 1024 * 1024);
        assert_eq!(config.flush_every, 10);
    }

    #[test]
    fn test_warm_up_targets_base_url() {
        let warm_up = ScrapeConfig::default().warm_up();
        assert_eq!(warm_up.url.as_deref(), Some(DEFAULT_BASE_URL));
        assert_eq!(warm_up.dismiss.len(), 2);
    }
}
