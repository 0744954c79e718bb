//! Browser session lifecycle.
//!
//! The [`SessionManager`] owns exactly one live renderer at a time. Tasks
//! call [`SessionManager::acquire`] before every attempt; that call checks
//! the session's health and replaces the browser when a threshold is
//! crossed, so a restart always happens between task executions and never
//! leaves two live sessions around.
//!
//! ```text
//! Uninitialized -> Starting -> Ready -> Restarting -> Starting -> Ready ... -> Closed
//! ```

use crate::live::act;
use crate::progress::{Progress, ProgressEventKind};
use crate::renderer::{Launcher, Renderer};
use pitchscrape::{ScrapeError, ScrapeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Lifecycle state of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Ready,
    Restarting,
    Closed,
}

/// Point-in-time health of the current session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHealth {
    pub connected: bool,
    pub open_pages: usize,
    pub matches_since_restart: u32,
    pub elapsed_since_restart: Duration,
    /// `None` when the engine gave no memory signal.
    pub memory_bytes: Option<u64>,
}

impl SessionHealth {
    fn disconnected(matches_since_restart: u32, elapsed_since_restart: Duration) -> Self {
        Self {
            connected: false,
            open_pages: 0,
            matches_since_restart,
            elapsed_since_restart,
            memory_bytes: None,
        }
    }
}

/// Limits past which the browser is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartThresholds {
    pub max_memory_bytes: u64,
    pub max_pages: usize,
    pub max_matches: u32,
    pub max_elapsed: Duration,
}

impl Default for RestartThresholds {
    fn default() -> Self {
        Self {
            max_memory_bytes: 500 * 1024 * 1024,
            max_pages: 10,
            max_matches: 30,
            max_elapsed: Duration::from_secs(15 * 60),
        }
    }
}

/// Why a session was (or should be) replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RestartReason {
    Disconnected,
    TooManyPages { open: usize, max: usize },
    MatchLimit { matches: u32, max: u32 },
    Elapsed { secs: u64, max_secs: u64 },
    Memory { bytes: u64, max: u64 },
    /// Requested by a task after a transient failure.
    TransientFailure,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "browser disconnected"),
            Self::TooManyPages { open, max } => write!(f, "{open} open pages (max {max})"),
            Self::MatchLimit { matches, max } => {
                write!(f, "{matches} matches since restart (max {max})")
            }
            Self::Elapsed { secs, max_secs } => {
                write!(f, "session age {secs}s (max {max_secs}s)")
            }
            Self::Memory { bytes, max } => write!(
                f,
                "JS heap {}MB (max {}MB)",
                bytes / (1024 * 1024),
                max / (1024 * 1024)
            ),
            Self::TransientFailure => write!(f, "transient failure"),
        }
    }
}

impl RestartThresholds {
    /// The first threshold `health` violates, checked in a fixed order:
    /// disconnect, open pages, match count, elapsed time, memory.
    ///
    /// The match limit trips once the count reaches the cap; the others once
    /// they exceed it. A missing memory reading never trips.
    pub fn restart_reason(&self, health: &SessionHealth) -> Option<RestartReason> {
        if !health.connected {
            return Some(RestartReason::Disconnected);
        }
        if health.open_pages > self.max_pages {
            return Some(RestartReason::TooManyPages {
                open: health.open_pages,
                max: self.max_pages,
            });
        }
        if health.matches_since_restart >= self.max_matches {
            return Some(RestartReason::MatchLimit {
                matches: health.matches_since_restart,
                max: self.max_matches,
            });
        }
        if health.elapsed_since_restart > self.max_elapsed {
            return Some(RestartReason::Elapsed {
                secs: health.elapsed_since_restart.as_secs(),
                max_secs: self.max_elapsed.as_secs(),
            });
        }
        match health.memory_bytes {
            Some(bytes) if bytes > self.max_memory_bytes => Some(RestartReason::Memory {
                bytes,
                max: self.max_memory_bytes,
            }),
            _ => None,
        }
    }

    pub fn should_restart(&self, health: &SessionHealth) -> bool {
        self.restart_reason(health).is_some()
    }
}

/// First navigation after every launch.
#[derive(Debug, Clone)]
pub struct WarmUp {
    /// Skip warm-up entirely when `None`.
    pub url: Option<String>,
    pub timeout: Duration,
    /// Pause after the page loads.
    pub settle: Duration,
    /// Consent and dialog buttons to click.
    pub dismiss: Vec<String>,
}

impl Default for WarmUp {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(90),
            settle: Duration::from_secs(2),
            dismiss: Vec::new(),
        }
    }
}

/// A handle to the session current at acquisition time.
///
/// Re-acquire before each attempt; a handle from before a restart points at
/// a browser that has been shut down.
#[derive(Clone)]
pub struct SessionHandle {
    pub renderer: Arc<dyn Renderer>,
    /// Increments on every (re)start.
    pub generation: u64,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .finish()
    }
}

struct Inner {
    state: SessionState,
    renderer: Option<Arc<dyn Renderer>>,
    generation: u64,
    started_at: Instant,
}

/// Owns the single live browser session.
pub struct SessionManager {
    launcher: Arc<dyn Launcher>,
    thresholds: RestartThresholds,
    warm_up: WarmUp,
    inner: Mutex<Inner>,
    restarts: AtomicU32,
    matches_since_restart: AtomicU32,
    progress: Progress,
}

impl SessionManager {
    /// Create a manager. Nothing is launched until [`start`](Self::start)
    /// or [`acquire`](Self::acquire).
    pub fn new(launcher: Arc<dyn Launcher>, thresholds: RestartThresholds, warm_up: WarmUp) -> Self {
        Self {
            launcher,
            thresholds,
            warm_up,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                renderer: None,
                generation: 0,
                started_at: Instant::now(),
            }),
            restarts: AtomicU32::new(0),
            matches_since_restart: AtomicU32::new(0),
            progress: Progress::disabled(),
        }
    }

    /// Report restarts on `progress`.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn thresholds(&self) -> &RestartThresholds {
        &self.thresholds
    }

    /// Launch the session if none is live.
    ///
    /// A launch failure is fatal and not retried here.
    pub async fn start(&self) -> ScrapeResult<SessionHandle> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return Err(ScrapeError::Launch("session manager is closed".into()));
        }
        if inner.state != SessionState::Ready || inner.renderer.is_none() {
            self.launch_locked(&mut inner).await?;
        }
        handle_of(&inner)
    }

    /// Current session, restarted first if any threshold is crossed.
    pub async fn acquire(&self) -> ScrapeResult<SessionHandle> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Closed => {
                return Err(ScrapeError::Launch("session manager is closed".into()))
            }
            SessionState::Ready if inner.renderer.is_some() => {
                let health = self.health_locked(&inner).await;
                if let Some(reason) = self.thresholds.restart_reason(&health) {
                    self.restart_locked(&mut inner, reason).await?;
                }
            }
            _ => self.launch_locked(&mut inner).await?,
        }
        handle_of(&inner)
    }

    /// Current health. Query failures report `connected = false`.
    pub async fn health_check(&self) -> SessionHealth {
        let inner = self.inner.lock().await;
        self.health_locked(&inner).await
    }

    /// Whether the current session should be replaced, and why.
    pub async fn should_restart(&self) -> Option<RestartReason> {
        let health = self.health_check().await;
        self.thresholds.restart_reason(&health)
    }

    /// Replace the session unconditionally.
    pub async fn restart(&self, reason: RestartReason) -> ScrapeResult<SessionHandle> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return Err(ScrapeError::Launch("session manager is closed".into()));
        }
        self.restart_locked(&mut inner, reason).await?;
        handle_of(&inner)
    }

    /// Replace the session only if it is still the one from `generation`.
    ///
    /// Concurrent tasks that failed on the same browser all ask for a
    /// restart; only the first one gets it.
    pub async fn restart_if_current(
        &self,
        generation: u64,
        reason: RestartReason,
    ) -> ScrapeResult<SessionHandle> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return Err(ScrapeError::Launch("session manager is closed".into()));
        }
        if inner.generation == generation {
            self.restart_locked(&mut inner, reason).await?;
        } else {
            tracing::debug!(
                generation,
                current = inner.generation,
                "session already replaced"
            );
        }
        handle_of(&inner)
    }

    /// Count one finished work item against the current session.
    pub fn record_unit_of_work(&self) {
        self.matches_since_restart.fetch_add(1, Ordering::SeqCst);
    }

    /// Restarts since this manager was created.
    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Shut the browser down. Further `acquire` calls fail.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(renderer) = inner.renderer.take() {
            if let Err(e) = renderer.shutdown().await {
                tracing::warn!("error closing browser: {e:#}");
            }
        }
        inner.state = SessionState::Closed;
    }

    async fn launch_locked(&self, inner: &mut Inner) -> ScrapeResult<()> {
        inner.state = SessionState::Starting;
        let renderer = match self.launcher.launch().await {
            Ok(renderer) => renderer,
            Err(e) => {
                inner.state = SessionState::Uninitialized;
                return Err(ScrapeError::Launch(format!("{e:#}")));
            }
        };

        self.run_warm_up(renderer.as_ref()).await;

        inner.renderer = Some(renderer);
        inner.generation += 1;
        inner.started_at = Instant::now();
        inner.state = SessionState::Ready;
        self.matches_since_restart.store(0, Ordering::SeqCst);
        tracing::info!(generation = inner.generation, "browser session ready");
        Ok(())
    }

    async fn restart_locked(&self, inner: &mut Inner, reason: RestartReason) -> ScrapeResult<()> {
        tracing::info!(%reason, generation = inner.generation, "restarting browser session");
        inner.state = SessionState::Restarting;
        if let Some(old) = inner.renderer.take() {
            if let Err(e) = old.shutdown().await {
                tracing::warn!("error closing browser during restart: {e:#}");
            }
        }
        let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        self.launch_locked(inner).await?;
        self.progress.emit(ProgressEventKind::SessionRestarted {
            reason: reason.to_string(),
            restarts,
        });
        Ok(())
    }

    async fn health_locked(&self, inner: &Inner) -> SessionHealth {
        let matches = self.matches_since_restart.load(Ordering::SeqCst);
        let elapsed = inner.started_at.elapsed();
        let Some(renderer) = inner.renderer.as_ref() else {
            return SessionHealth::disconnected(matches, elapsed);
        };
        if !renderer.is_connected() {
            return SessionHealth::disconnected(matches, elapsed);
        }
        let open_pages = match renderer.open_pages().await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("page count query failed: {e:#}");
                return SessionHealth::disconnected(matches, elapsed);
            }
        };
        let memory_bytes = match renderer.memory_usage().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("memory query failed: {e:#}");
                None
            }
        };
        SessionHealth {
            connected: true,
            open_pages,
            matches_since_restart: matches,
            elapsed_since_restart: elapsed,
            memory_bytes,
        }
    }

    /// Navigate to the base site and clear consent dialogs. Failures only warn.
    async fn run_warm_up(&self, renderer: &dyn Renderer) {
        let Some(url) = self.warm_up.url.as_deref() else {
            return;
        };
        let mut ctx = match renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!("warm-up skipped, could not open a page: {e:#}");
                return;
            }
        };
        match ctx
            .navigate(url, self.warm_up.timeout.as_millis() as u64)
            .await
        {
            Ok(_) => {
                tokio::time::sleep(self.warm_up.settle).await;
                let selectors: Vec<&str> = self.warm_up.dismiss.iter().map(String::as_str).collect();
                act::dismiss_overlays(ctx.as_ref(), &selectors).await;
            }
            Err(e) => tracing::warn!("warm-up navigation failed: {e:#}"),
        }
        if let Err(e) = ctx.close().await {
            tracing::debug!("warm-up page close failed: {e:#}");
        }
    }
}

fn handle_of(inner: &Inner) -> ScrapeResult<SessionHandle> {
    inner
        .renderer
        .clone()
        .map(|renderer| SessionHandle {
            renderer,
            generation: inner.generation,
        })
        .ok_or(ScrapeError::Disconnected)
}
