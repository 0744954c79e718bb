//! `pitchscrape checkpoint show|clear`: inspect or discard a job's saved
//! progress.

use crate::cli::output;
use crate::cli::scrape_cmd::checkpoint_dir;
use crate::config::ScrapeConfig;
use anyhow::Result;
use chrono::Utc;
use pitchscrape::CheckpointStore;
use std::path::PathBuf;

fn store(output_dir: Option<PathBuf>) -> CheckpointStore {
    let mut config = ScrapeConfig::from_env();
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    CheckpointStore::new(checkpoint_dir(&config))
}

/// Print the checkpoint for `name`.
pub async fn run_show(name: &str, output_dir: Option<PathBuf>) -> Result<()> {
    let store = store(output_dir);
    let Some(checkpoint) = store.load(name) else {
        if output::is_json() {
            output::print_json(&serde_json::json!({ "job": name, "checkpoint": null }));
        } else {
            println!("No checkpoint for {name}");
        }
        return Ok(());
    };

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "job": name,
            "path": store.path_for(name),
            "checkpoint": {
                "job_url": checkpoint.job_url,
                "created_at": checkpoint.created_at,
                "total": checkpoint.work_items.len(),
                "processed": checkpoint.processed_ids.len(),
                "succeeded": checkpoint.succeeded_ids.len(),
                "failed_ids": checkpoint.failed_ids,
            }
        }));
        return Ok(());
    }

    let age = Utc::now() - checkpoint.created_at;
    println!("Checkpoint: {}", checkpoint.job_name);
    output::field("path", store.path_for(name).display());
    output::field("url", &checkpoint.job_url);
    output::field("saved", format!("{} ({} min ago)", checkpoint.created_at, age.num_minutes()));
    output::field("matches", checkpoint.work_items.len());
    output::field("processed", checkpoint.processed_ids.len());
    output::field("succeeded", checkpoint.succeeded_ids.len());
    output::field("remaining", checkpoint.remaining().len());
    if !checkpoint.failed_ids.is_empty() {
        output::field("failed", checkpoint.failed_ids.join(", "));
    }
    Ok(())
}

/// Delete the checkpoint for `name`.
pub async fn run_clear(name: &str, output_dir: Option<PathBuf>) -> Result<()> {
    let store = store(output_dir);
    let existed = store.exists(name);
    store.delete(name)?;
    if output::is_json() {
        output::print_json(&serde_json::json!({ "job": name, "cleared": existed }));
    } else if !output::is_quiet() {
        if existed {
            println!("Cleared checkpoint for {name}");
        } else {
            println!("No checkpoint for {name}");
        }
    }
    Ok(())
}
