//! Bounded-parallelism task scheduling.
//!
//! Submissions go onto an unbounded queue drained by one dispatcher task.
//! The dispatcher takes a semaphore permit before spawning each task, so
//! tasks start in submission order and at most `max_concurrent` run at once.
//! A task's permit is released when it finishes, whatever its outcome.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

type Job = Box<dyn FnOnce(OwnedSemaphorePermit) -> BoxFuture<'static, ()> + Send>;

/// Runs scheduled futures with a fixed concurrency ceiling.
pub struct ConcurrencyLimiter {
    tx: mpsc::UnboundedSender<Job>,
    max_concurrent: usize,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

/// Counts a task as running until dropped, including on panic.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Completion of a scheduled task.
///
/// Resolves to `None` if the task panicked or the limiter was dropped
/// before the task ran.
pub struct Scheduled<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Scheduled<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl ConcurrencyLimiter {
    /// Create a limiter. Must be called inside a Tokio runtime.
    ///
    /// `max_concurrent` is clamped to at least 1.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let queued = Arc::new(AtomicUsize::new(0));

        let dispatcher_queued = Arc::clone(&queued);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::error!("limiter semaphore closed unexpectedly");
                        break;
                    }
                };
                dispatcher_queued.fetch_sub(1, Ordering::SeqCst);
                tokio::spawn(job(permit));
            }
        });

        Self {
            tx,
            max_concurrent,
            active: Arc::new(AtomicUsize::new(0)),
            queued,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Tasks currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Queue `task`. It starts once every earlier submission has started and
    /// a slot is free.
    pub fn schedule<F, T>(&self, task: F) -> Scheduled<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let active = Arc::clone(&self.active);
        let job: Job = Box::new(move |permit: OwnedSemaphorePermit| {
            async move {
                let running = RunningGuard::enter(active);
                let output = task.await;
                drop(running);
                drop(permit);
                let _ = done_tx.send(output);
            }
            .boxed()
        });

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("limiter dispatcher is gone, task dropped");
        }
        Scheduled { rx: done_rx }
    }
}
