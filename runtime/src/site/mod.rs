//! Site-specific collaborators and job naming.

pub mod flashscore;

pub use flashscore::{FlashscoreDiscovery, FlashscoreExtractor};

use crate::orchestrator::Job;

/// Results page for a league, optionally for one season (`2023-2024`).
pub fn results_url(base_url: &str, country: &str, league: &str, season: Option<&str>) -> String {
    format!(
        "{}/football/{}/{}/results/",
        base_url.trim_end_matches('/'),
        country.trim().to_lowercase(),
        league_segment(league, season)
    )
}

/// Checkpoint key and output file stem: `<country>-<league>[-<season>]`.
pub fn job_name(country: &str, league: &str, season: Option<&str>) -> String {
    format!(
        "{}-{}",
        country.trim().to_lowercase(),
        league_segment(league, season)
    )
}

/// Job for a league results page.
pub fn league_job(base_url: &str, country: &str, league: &str, season: Option<&str>) -> Job {
    Job::new(
        job_name(country, league, season),
        results_url(base_url, country, league, season),
    )
}

fn league_segment(league: &str, season: Option<&str>) -> String {
    let league = league.trim().to_lowercase();
    match season.map(str::trim).filter(|s| !s.is_empty()) {
        Some(season) => format!("{league}-{season}"),
        None => league,
    }
}
