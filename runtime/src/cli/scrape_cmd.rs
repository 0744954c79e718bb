//! `pitchscrape scrape`: run one league (or one explicit results page) to
//! completion.

use crate::cli::output;
use crate::config::{megabytes, minutes, ScrapeConfig};
use crate::live::SessionManager;
use crate::orchestrator::{Job, RunSummary, ScrapeOrchestrator};
use crate::progress::{self, Progress, ProgressEventKind, ProgressReceiver};
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::Launcher;
use crate::site::{self, FlashscoreDiscovery, FlashscoreExtractor};
use anyhow::{bail, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use pitchscrape::{CheckpointStore, FileSink, OutputFormat, StatsPeriod};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Job selection plus per-run overrides of the environment configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct ScrapeArgs {
    /// Country slug as it appears in the site URL (e.g. "england")
    #[arg(long)]
    pub country: Option<String>,
    /// League slug (e.g. "premier-league")
    #[arg(long)]
    pub league: Option<String>,
    /// Season (e.g. "2023-2024"); omit for the current season
    #[arg(long)]
    pub season: Option<String>,
    /// Explicit results page URL (requires --name)
    #[arg(long)]
    pub url: Option<String>,
    /// Job name for --url; also the checkpoint key and output file stem
    #[arg(long)]
    pub name: Option<String>,

    /// Work items processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Save a checkpoint after this many completed items
    #[arg(long)]
    pub checkpoint_every: Option<usize>,
    /// Write results after this many successful items
    #[arg(long)]
    pub flush_every: Option<usize>,
    /// Attempts per item before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Restart the browser above this JS heap size
    #[arg(long)]
    pub max_memory_mb: Option<u64>,
    /// Restart the browser above this many open pages
    #[arg(long)]
    pub max_pages: Option<usize>,
    /// Restart the browser after this many matches
    #[arg(long)]
    pub max_matches: Option<u32>,
    /// Restart the browser after this many minutes
    #[arg(long)]
    pub max_session_minutes: Option<u64>,
    /// Statistics periods: fulltime or all-periods
    #[arg(long)]
    pub stats: Option<StatsPeriod>,
    /// Output format: json, json-array, or csv
    #[arg(long)]
    pub format: Option<OutputFormat>,
    /// Directory for results and checkpoints
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Path to the Chromium executable
    #[arg(long)]
    pub chromium_path: Option<PathBuf>,
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
    /// Discard any checkpoint and start over
    #[arg(long)]
    pub fresh: bool,
}

impl ScrapeArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ScrapeConfig) {
        if let Some(v) = self.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = self.checkpoint_every {
            config.checkpoint_every = v;
        }
        if let Some(v) = self.flush_every {
            config.flush_every = v;
        }
        if let Some(v) = self.max_attempts {
            config.max_attempts = v;
        }
        if let Some(mb) = self.max_memory_mb {
            config.thresholds.max_memory_bytes = megabytes(mb);
        }
        if let Some(v) = self.max_pages {
            config.thresholds.max_pages = v;
        }
        if let Some(v) = self.max_matches {
            config.thresholds.max_matches = v;
        }
        if let Some(mins) = self.max_session_minutes {
            config.thresholds.max_elapsed = minutes(mins);
        }
        if let Some(v) = self.stats {
            config.stats_period = v;
        }
        if let Some(v) = self.format {
            config.output_format = v;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.chromium_path {
            config.chromium_path = Some(path.clone());
        }
        if self.headed {
            config.headless = false;
        }
    }

    /// The job these flags describe.
    pub fn job(&self, base_url: &str) -> Result<Job> {
        match (&self.url, &self.name, &self.country, &self.league) {
            (Some(url), Some(name), _, _) => Ok(Job::new(name.trim(), url.trim())),
            (Some(_), None, _, _) => bail!("--url needs --name to key its checkpoint and output"),
            (None, _, Some(country), Some(league)) => Ok(site::league_job(
                base_url,
                country,
                league,
                self.season.as_deref(),
            )),
            _ => bail!("give --country and --league, or --url with --name"),
        }
    }
}

/// Checkpoint directory under the output directory.
pub fn checkpoint_dir(config: &ScrapeConfig) -> PathBuf {
    config.output_dir.join("checkpoints")
}

/// Run the scrape command.
pub async fn run(args: ScrapeArgs) -> Result<()> {
    let mut config = ScrapeConfig::from_env();
    args.apply(&mut config);
    config.validate()?;
    let job = args.job(&config.base_url)?;

    let (tx, rx) = progress::channel();
    let progress = Progress::new(tx, uuid::Uuid::new_v4().to_string());
    let bar = (!output::is_quiet() && !output::is_json()).then(|| spawn_progress_bar(rx));

    let launcher: Arc<dyn Launcher> = Arc::new(ChromiumLauncher::new(
        config.chromium_path.clone(),
        config.headless,
    ));
    let session = Arc::new(
        SessionManager::new(launcher, config.thresholds.clone(), config.warm_up())
            .with_progress(progress.clone()),
    );
    let orchestrator = ScrapeOrchestrator::new(
        config.clone(),
        Arc::clone(&session),
        Arc::new(FlashscoreDiscovery::new(&config)),
        Arc::new(FlashscoreExtractor::new(&config)),
        Arc::new(FileSink::new(&config.output_dir)),
        CheckpointStore::new(checkpoint_dir(&config)),
    )
    .with_progress(progress.clone());

    tracing::info!(job = %job.name, run_id = progress.run_id(), "scrape starting");
    let result = orchestrator.run(&job, args.fresh).await;

    session.close().await;
    // Dropping every emitter closes the channel and ends the bar task.
    drop(orchestrator);
    drop(session);
    drop(progress);
    if let Some(bar) = bar {
        let _ = bar.await;
    }

    let summary = result?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    if output::is_json() {
        output::print_json(summary);
    } else {
        if !output::is_quiet() {
            println!();
            println!("Scrape complete: {}", summary.job);
            output::field("matches", summary.total);
            output::field("succeeded", summary.succeeded);
            output::field("failed", summary.failed());
            output::field("restarts", summary.restarts);
            output::field("elapsed", format!("{:.1}s", summary.elapsed_ms as f64 / 1000.0));
            if let Some(path) = &summary.output {
                output::field("output", path.display());
            }
            if summary.resumed {
                println!("  (resumed from checkpoint)");
            }
        }
        if !summary.failed_ids.is_empty() {
            println!("  Failed ids: {}", summary.failed_ids.join(", "));
        }
    }

    if let Some(error) = &summary.final_flush_error {
        eprintln!("  Error: results could not be written: {error}");
        eprintln!("  The checkpoint was kept; run the same job again to retry.");
    }
}

fn spawn_progress_bar(mut rx: ProgressReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed_precise}]")
        {
            bar.set_style(style.progress_chars("=> "));
        }

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.event {
                ProgressEventKind::RunStarted {
                    total,
                    already_processed,
                    ..
                } => {
                    bar.set_length(total as u64);
                    bar.set_position(already_processed as u64);
                }
                ProgressEventKind::ItemCompleted { id, success, .. } => {
                    bar.inc(1);
                    if !success {
                        bar.println(format!("  failed: {id}"));
                    }
                }
                ProgressEventKind::SessionRestarted { reason, restarts } => {
                    bar.set_message(format!("browser restarts: {restarts} (last: {reason})"));
                }
                ProgressEventKind::Warning { message } => {
                    bar.println(format!("  warning: {message}"));
                }
                ProgressEventKind::RunComplete { .. } => {
                    bar.finish_and_clear();
                }
                ProgressEventKind::CheckpointSaved { .. }
                | ProgressEventKind::ResultsFlushed { .. } => {}
            }
        }
        if !bar.is_finished() {
            bar.finish_and_clear();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_job_from_league_flags() {
        let args = ScrapeArgs {
            country: Some("england".into()),
            league: Some("premier-league".into()),
            season: Some("2023-2024".into()),
            ..Default::default()
        };
        let job = args.job("https://www.flashscore.com").unwrap();
        assert_eq!(job.name, "england-premier-league-2023-2024");
        assert_eq!(
            job.url,
            "https://www.flashscore.com/football/england/premier-league-2023-2024/results/"
        );
    }

    #[test]
    fn test_url_needs_name() {
        let args = ScrapeArgs {
            url: Some("https://www.flashscore.com/football/x/y/results/".into()),
            ..Default::default()
        };
        assert!(args.job("https://www.flashscore.com").is_err());

        let named = ScrapeArgs {
            name: Some("cup-run".into()),
            ..args
        };
        assert_eq!(named.job("https://www.flashscore.com").unwrap().name, "cup-run");
    }

    #[test]
    fn test_no_job_flags_is_an_error() {
        assert!(ScrapeArgs::default().job("https://www.flashscore.com").is_err());
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let mut config = ScrapeConfig::default();
        let args = ScrapeArgs {
            concurrency: Some(6),
            max_memory_mb: Some(300),
            max_session_minutes: Some(5),
            stats: Some(StatsPeriod::AllPeriods),
            headed: true,
            ..Default::default()
        };
        args.apply(&mut config);
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.thresholds.max_memory_bytes, 300 * 1024 * 1024);
        assert_eq!(config.thresholds.max_elapsed, Duration::from_secs(300));
        assert_eq!(config.stats_period, StatsPeriod::AllPeriods);
        assert!(!config.headless);
        assert_eq!(config.flush_every, ScrapeConfig::default().flush_every);
    }

    #[test]
    fn test_apply_huge_limits_does_not_overflow() {
        let mut config = ScrapeConfig::default();
        let args = ScrapeArgs {
            max_memory_mb: Some(u64::MAX),
            max_session_minutes: Some(u64::MAX),
            ..Default::default()
        };
        args.apply(&mut config);
        assert_eq!(config.thresholds.max_memory_bytes, u64::MAX);
        assert_eq!(config.thresholds.max_elapsed, Duration::from_secs(u64::MAX));
        assert!(config.validate().is_ok());
    }
}
