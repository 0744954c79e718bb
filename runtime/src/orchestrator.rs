//! End-to-end run coordination.
//!
//! A run resolves its work items (from a fresh checkpoint, or through
//! [`LinkDiscovery`]), pushes every unprocessed item through the
//! [`ConcurrencyLimiter`], extracts each one under the [`RetryPolicy`], and
//! folds results into a shared accumulator. The accumulator is snapshotted
//! to the [`CheckpointStore`] every `checkpoint_every` completions and on
//! every failure, and written to the [`OutputSink`] every `flush_every`
//! successes. A final flush followed by checkpoint deletion marks the job
//! complete.
//!
//! Only a browser launch failure ends a run early. Per-item failures are
//! recorded and the run continues.

use crate::config::ScrapeConfig;
use crate::live::act;
use crate::live::{RestartReason, SessionHandle, SessionManager};
use crate::pool::ConcurrencyLimiter;
use crate::progress::{Progress, ProgressEventKind};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::Utc;
use pitchscrape::{
    Checkpoint, CheckpointStore, MatchRecord, OutputSink, RawRecord, ScrapeError, ScrapeResult,
    WorkItem,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Finds the work items for a job.
#[async_trait]
pub trait LinkDiscovery: Send + Sync {
    /// Fails with [`ScrapeError::NoItemsFound`] when the page lists nothing.
    async fn discover(&self, session: &SessionHandle, job_url: &str) -> ScrapeResult<Vec<WorkItem>>;
}

/// Reads one work item's page.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, session: &SessionHandle, item: &WorkItem) -> ScrapeResult<RawRecord>;
}

/// A named scrape job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Checkpoint key and output file stem.
    pub name: String,
    pub url: String,
}

impl Job {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// What a finished run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub job: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed_ids: Vec<String>,
    /// Whether the run picked up from a checkpoint.
    pub resumed: bool,
    pub restarts: u32,
    pub output: Option<PathBuf>,
    /// Set when the final write failed; the checkpoint is kept in that case.
    pub final_flush_error: Option<String>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failed_ids.len()
    }
}

/// Mutable run state shared by all tasks.
struct Accumulator {
    checkpoint: Checkpoint,
    completed_since_checkpoint: usize,
    successes_since_flush: usize,
    last_output: Option<PathBuf>,
}

/// Everything a task needs, cloned once per run.
struct RunContext {
    job: Job,
    config: ScrapeConfig,
    policy: RetryPolicy,
    total: usize,
    session: Arc<SessionManager>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn OutputSink>,
    checkpoints: CheckpointStore,
    progress: Progress,
    state: Mutex<Accumulator>,
    /// First fatal error; once set, unstarted tasks are skipped.
    fatal: Mutex<Option<ScrapeError>>,
}

impl RunContext {
    /// Write `snapshot` on the blocking pool. Callers hold the accumulator
    /// lock, so snapshots land in order.
    async fn save_checkpoint(&self, snapshot: &Checkpoint) -> ScrapeResult<PathBuf> {
        let store = self.checkpoints.clone();
        let key = self.job.name.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || store.save(&key, &snapshot))
            .await
            .map_err(|e| ScrapeError::Io(std::io::Error::other(e)))?
    }

    /// Hand the results to the sink on the blocking pool.
    async fn persist(&self, records: &BTreeMap<String, MatchRecord>) -> ScrapeResult<PathBuf> {
        let sink = Arc::clone(&self.sink);
        let name = self.job.name.clone();
        let format = self.config.output_format;
        let records = records.clone();
        tokio::task::spawn_blocking(move || sink.persist(&records, &name, format))
            .await
            .map_err(|e| ScrapeError::Io(std::io::Error::other(e)))?
    }
}

pub struct ScrapeOrchestrator {
    config: ScrapeConfig,
    session: Arc<SessionManager>,
    discovery: Arc<dyn LinkDiscovery>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn OutputSink>,
    checkpoints: CheckpointStore,
    progress: Progress,
}

impl ScrapeOrchestrator {
    pub fn new(
        config: ScrapeConfig,
        session: Arc<SessionManager>,
        discovery: Arc<dyn LinkDiscovery>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn OutputSink>,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            config,
            session,
            discovery,
            extractor,
            sink,
            checkpoints,
            progress: Progress::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Run `job` to completion.
    ///
    /// `fresh` discards any existing checkpoint. Returns `Err` only for
    /// fatal conditions: the browser cannot be launched, or no work items
    /// could be resolved.
    pub async fn run(&self, job: &Job, fresh: bool) -> ScrapeResult<RunSummary> {
        let started = Instant::now();
        self.config.validate()?;
        self.session.start().await?;

        let (checkpoint, resumed) = match self.resume(job, fresh) {
            Some(checkpoint) => (checkpoint, true),
            None => {
                let items = self.discover(job).await?;
                let checkpoint = Checkpoint::new(&job.name, &job.url, items);
                if let Err(e) = self.checkpoints.save(&job.name, &checkpoint) {
                    self.warn(format!("initial checkpoint not saved: {e}"));
                }
                (checkpoint, false)
            }
        };

        let remaining = checkpoint.remaining();
        let total = checkpoint.work_items.len();
        let already_processed = checkpoint.processed_ids.len();
        tracing::info!(
            job = %job.name,
            total,
            remaining = remaining.len(),
            resumed,
            "starting run"
        );
        self.progress.emit(ProgressEventKind::RunStarted {
            job: job.name.clone(),
            total,
            already_processed,
            resumed,
        });

        let ctx = Arc::new(RunContext {
            job: job.clone(),
            config: self.config.clone(),
            policy: self.config.retry_policy(),
            total,
            session: Arc::clone(&self.session),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            checkpoints: self.checkpoints.clone(),
            progress: self.progress.clone(),
            state: Mutex::new(Accumulator {
                checkpoint,
                completed_since_checkpoint: 0,
                successes_since_flush: 0,
                last_output: None,
            }),
            fatal: Mutex::new(None),
        });

        let limiter = ConcurrencyLimiter::new(self.config.concurrency);
        let (items, pending): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .map(|item| {
                let task = limiter.schedule(process_item(Arc::clone(&ctx), item.clone()));
                (item, task)
            })
            .unzip();
        let finished = futures::future::join_all(pending).await;
        for (item, task) in items.into_iter().zip(finished) {
            if task.is_none() {
                // The task panicked before recording its outcome.
                tracing::error!(item = %item.id, "scrape task ended without reporting");
                let error = ScrapeError::TaskAborted(item.id.clone());
                record_outcome(&ctx, item, Err(error)).await;
            }
        }

        let mut state = ctx.state.lock().await;

        if let Some(error) = ctx.fatal.lock().await.take() {
            state.checkpoint.created_at = Utc::now();
            if let Err(e) = ctx.save_checkpoint(&state.checkpoint).await {
                tracing::error!("checkpoint not saved after fatal error: {e}");
            }
            return Err(error);
        }

        let mut final_flush_error = None;
        match ctx.persist(&state.checkpoint.results).await {
            Ok(path) => {
                self.progress.emit(ProgressEventKind::ResultsFlushed {
                    records: state.checkpoint.results.len(),
                    path: path.display().to_string(),
                });
                state.last_output = Some(path);
                if let Err(e) = ctx.checkpoints.delete(&job.name) {
                    self.warn(format!("checkpoint not deleted: {e}"));
                }
            }
            Err(e) => {
                tracing::error!(job = %job.name, "final write failed: {e}");
                final_flush_error = Some(e.to_string());
                state.checkpoint.created_at = Utc::now();
                if let Err(e) = ctx.save_checkpoint(&state.checkpoint).await {
                    tracing::error!("checkpoint not saved after failed write: {e}");
                }
            }
        }

        let summary = RunSummary {
            job: job.name.clone(),
            total,
            succeeded: state.checkpoint.succeeded_ids.len(),
            failed_ids: state.checkpoint.failed_ids.clone(),
            resumed,
            restarts: self.session.restart_count(),
            output: state.last_output.clone(),
            final_flush_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.progress.emit(ProgressEventKind::RunComplete {
            succeeded: summary.succeeded,
            failed: summary.failed(),
            elapsed_ms: summary.elapsed_ms,
        });
        tracing::info!(
            job = %job.name,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            restarts = summary.restarts,
            "run complete"
        );
        Ok(summary)
    }

    /// A checkpoint worth resuming, if any. Stale or mismatched ones are
    /// deleted.
    fn resume(&self, job: &Job, fresh: bool) -> Option<Checkpoint> {
        if fresh {
            if let Err(e) = self.checkpoints.delete(&job.name) {
                self.warn(format!("checkpoint not deleted: {e}"));
            }
            return None;
        }
        let checkpoint = self.checkpoints.load(&job.name)?;

        let same_job = checkpoint.job_name == job.name && checkpoint.job_url == job.url;
        let fresh_enough = checkpoint.is_fresh(self.config.checkpoint_max_age, Utc::now());
        if same_job && fresh_enough {
            tracing::info!(
                job = %job.name,
                processed = checkpoint.processed_ids.len(),
                "resuming from checkpoint"
            );
            return Some(checkpoint);
        }

        tracing::info!(job = %job.name, same_job, fresh_enough, "discarding checkpoint");
        if let Err(e) = self.checkpoints.delete(&job.name) {
            self.warn(format!("checkpoint not deleted: {e}"));
        }
        None
    }

    async fn discover(&self, job: &Job) -> ScrapeResult<Vec<WorkItem>> {
        let policy = self.config.retry_policy();
        let generation = AtomicU64::new(0);
        let items = policy
            .execute(&job.name, |attempt| {
                let generation = &generation;
                async move {
                    let handle = if attempt.after_transient() {
                        self.session
                            .restart_if_current(
                                generation.load(Ordering::SeqCst),
                                RestartReason::TransientFailure,
                            )
                            .await?
                    } else {
                        self.session.acquire().await?
                    };
                    generation.store(handle.generation, Ordering::SeqCst);
                    self.discovery.discover(&handle, &job.url).await
                }
            })
            .await?;

        let mut seen = std::collections::HashSet::new();
        let items: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        if items.is_empty() {
            return Err(ScrapeError::NoItemsFound(job.url.clone()));
        }
        tracing::info!(job = %job.name, count = items.len(), "work items discovered");
        Ok(items)
    }

    fn warn(&self, message: String) {
        tracing::warn!("{message}");
        self.progress.emit(ProgressEventKind::Warning { message });
    }
}

/// One scheduled unit of work.
async fn process_item(ctx: Arc<RunContext>, item: WorkItem) {
    if ctx.fatal.lock().await.is_some() {
        return;
    }

    act::settle(ctx.config.delay_min, ctx.config.delay_max).await;

    let generation = AtomicU64::new(0);
    let outcome = ctx
        .policy
        .execute(&item.id, |attempt| {
            let ctx = &ctx;
            let item = &item;
            let generation = &generation;
            async move {
                let handle = if attempt.after_transient() {
                    ctx.session
                        .restart_if_current(
                            generation.load(Ordering::SeqCst),
                            RestartReason::TransientFailure,
                        )
                        .await?
                } else {
                    ctx.session.acquire().await?
                };
                generation.store(handle.generation, Ordering::SeqCst);

                let raw = ctx.extractor.extract(&handle, item).await?;
                raw.ensure_required()?;
                Ok(raw.into_record())
            }
        })
        .await;

    let outcome = match outcome {
        Err(e) if e.is_fatal() => {
            tracing::error!(item = %item.id, "fatal error, stopping run: {e}");
            ctx.fatal.lock().await.get_or_insert(e);
            return;
        }
        other => other,
    };

    ctx.session.record_unit_of_work();
    record_outcome(&ctx, item, outcome).await;
}

async fn record_outcome(ctx: &RunContext, item: WorkItem, outcome: ScrapeResult<MatchRecord>) {
    let mut state = ctx.state.lock().await;
    let success = outcome.is_ok();
    let error = outcome.as_ref().err().map(|e| e.to_string());

    match outcome {
        Ok(record) => {
            state.checkpoint.results.insert(item.id.clone(), record);
            state.checkpoint.succeeded_ids.push(item.id.clone());
            state.successes_since_flush += 1;
        }
        Err(e) => {
            tracing::warn!(item = %item.id, "giving up on item: {e}");
            state.checkpoint.failed_ids.push(item.id.clone());
        }
    }
    state.checkpoint.processed_ids.push(item.id.clone());
    state.checkpoint.cursor = state.checkpoint.processed_ids.len();
    state.completed_since_checkpoint += 1;

    ctx.progress.emit(ProgressEventKind::ItemCompleted {
        id: item.id,
        success,
        completed: state.checkpoint.processed_ids.len(),
        total: ctx.total,
        error,
    });

    if !success || state.completed_since_checkpoint >= ctx.config.checkpoint_every {
        state.checkpoint.created_at = Utc::now();
        match ctx.save_checkpoint(&state.checkpoint).await {
            Ok(_) => {
                state.completed_since_checkpoint = 0;
                ctx.progress.emit(ProgressEventKind::CheckpointSaved {
                    processed: state.checkpoint.processed_ids.len(),
                });
            }
            Err(e) => {
                let message = format!("checkpoint not saved: {e}");
                tracing::warn!("{message}");
                ctx.progress.emit(ProgressEventKind::Warning { message });
            }
        }
    }

    if success && state.successes_since_flush >= ctx.config.flush_every {
        match ctx.persist(&state.checkpoint.results).await {
            Ok(path) => {
                state.successes_since_flush = 0;
                ctx.progress.emit(ProgressEventKind::ResultsFlushed {
                    records: state.checkpoint.results.len(),
                    path: path.display().to_string(),
                });
                state.last_output = Some(path);
            }
            Err(e) => {
                let message = format!("results not written: {e}");
                tracing::warn!("{message}");
                ctx.progress.emit(ProgressEventKind::Warning { message });
            }
        }
    }
}
