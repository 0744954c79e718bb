//! CLI subcommand implementations for the `pitchscrape` binary.

pub mod checkpoint_cmd;
pub mod doctor;
pub mod output;
pub mod scrape_cmd;
