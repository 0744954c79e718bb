//! Environment readiness check.

use crate::config::ScrapeConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability, the output directory, and configuration.
pub async fn run() -> Result<()> {
    println!("pitchscrape doctor");
    println!("==================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let config = ScrapeConfig::from_env();

    let chromium = config.chromium_path.clone().or_else(find_chromium);
    match &chromium {
        Some(path) if path.exists() => println!("[OK] Chromium found: {}", path.display()),
        Some(path) => println!("[!!] Chromium path does not exist: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set PITCHSCRAPE_CHROMIUM_PATH."
        ),
    }

    let writable = output_dir_writable(&config.output_dir);
    if writable {
        println!("[OK] Output directory is writable: {}", config.output_dir.display());
    } else {
        println!("[!!] Output directory is not writable: {}", config.output_dir.display());
    }

    let valid = match config.validate() {
        Ok(()) => {
            println!(
                "[OK] Configuration: concurrency {}, {} attempts, restart after {} matches",
                config.concurrency, config.max_attempts, config.thresholds.max_matches
            );
            true
        }
        Err(e) => {
            println!("[!!] {e}");
            false
        }
    };

    println!();
    if chromium.is_some_and(|p| p.exists()) && writable && valid {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

fn output_dir_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".pitchscrape-doctor");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}
