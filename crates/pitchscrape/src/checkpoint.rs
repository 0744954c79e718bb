//! Durable snapshots of in-progress scrape jobs.
//!
//! One JSON document per job at `<dir>/checkpoint_<job>.json`. Writes go to a
//! sibling temp file first and are renamed into place, so a reader sees
//! either the previous snapshot or the new one, never a torn write.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::file_stem;
use crate::types::{MatchRecord, ScrapeResult, WorkItem};

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_name: String,
    pub job_url: String,
    /// Every discovered work item, in discovery order.
    pub work_items: Vec<WorkItem>,
    /// Successful records so far, keyed by match id.
    pub results: BTreeMap<String, MatchRecord>,
    pub succeeded_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    /// Ids that were attempted to completion, success or exhausted failure.
    pub processed_ids: Vec<String>,
    /// Number of completed items when the snapshot was taken.
    pub cursor: usize,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// An empty snapshot for a freshly discovered job.
    pub fn new(job_name: impl Into<String>, job_url: impl Into<String>, work_items: Vec<WorkItem>) -> Self {
        Self {
            job_name: job_name.into(),
            job_url: job_url.into(),
            work_items,
            results: BTreeMap::new(),
            succeeded_ids: Vec::new(),
            failed_ids: Vec::new(),
            processed_ids: Vec::new(),
            cursor: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether the snapshot is younger than `max_age` at `now`.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match age.to_std() {
            Ok(age) => age <= max_age,
            // Timestamp in the future (clock skew): treat as fresh.
            Err(_) => true,
        }
    }

    /// Work items not yet in `processed_ids`, in discovery order.
    pub fn remaining(&self) -> Vec<WorkItem> {
        let processed: BTreeSet<&str> = self.processed_ids.iter().map(String::as_str).collect();
        self.work_items
            .iter()
            .filter(|item| !processed.contains(item.id.as_str()))
            .cloned()
            .collect()
    }
}

/// Filesystem-backed checkpoint storage.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", file_stem(key)))
    }

    /// Atomically replace the snapshot for `key`.
    pub fn save(&self, key: &str, snapshot: &Checkpoint) -> ScrapeResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(
            job = key,
            processed = snapshot.processed_ids.len(),
            "checkpoint saved"
        );
        Ok(path)
    }

    /// Load the snapshot for `key`.
    ///
    /// Missing, unreadable, or unparseable files all yield `None`.
    pub fn load(&self, key: &str) -> Option<Checkpoint> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read checkpoint");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt checkpoint");
                None
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Remove the snapshot for `key`. A missing file is not an error.
    pub fn delete(&self, key: &str) -> ScrapeResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
