// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for real-time run telemetry.
//!
//! The orchestrator and session manager emit `ProgressEvent`s during a run,
//! which flow through a `tokio::sync::broadcast` channel to all subscribers
//! (progress bar, JSON log). When no subscriber exists, events are silently
//! dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A progress event emitted during a scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// Work items are known and scheduling begins.
    RunStarted {
        job: String,
        total: usize,
        /// Items already processed by a resumed checkpoint.
        already_processed: usize,
        resumed: bool,
    },
    /// One work item finished, successfully or not.
    ItemCompleted {
        id: String,
        success: bool,
        completed: usize,
        total: usize,
        error: Option<String>,
    },
    /// The browser was replaced.
    SessionRestarted { reason: String, restarts: u32 },
    /// A checkpoint snapshot was written.
    CheckpointSaved { processed: usize },
    /// Accumulated records were written to the output sink.
    ResultsFlushed { records: usize, path: String },
    /// The run finished.
    RunComplete {
        succeeded: usize,
        failed: usize,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an error
/// which we silently ignore (zero cost when nobody's watching).
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Cloneable emitter shared by everything that reports on one run.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Option<ProgressSender>,
    run_id: Arc<str>,
    seq: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(tx: ProgressSender, run_id: impl Into<String>) -> Self {
        Self {
            tx: Some(tx),
            run_id: Arc::from(run_id.into()),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            run_id: Arc::from(""),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn subscribe(&self) -> Option<ProgressReceiver> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Emit an event, silently ignoring send errors (which occur when no
    /// receivers are listening).
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.to_string(),
                seq,
                event,
            });
        }
    }
}
