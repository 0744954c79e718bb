//! Terminal output helpers shared by the subcommands.
//!
//! The global `--json` and `--quiet` flags are exported as environment
//! variables by `main`, so any command can check them without threading
//! the parsed CLI through.

use serde::Serialize;

pub const JSON_ENV: &str = "PITCHSCRAPE_JSON";
pub const QUIET_ENV: &str = "PITCHSCRAPE_QUIET";

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// Machine-readable output requested.
pub fn is_json() -> bool {
    flag(JSON_ENV)
}

/// Non-essential output suppressed.
pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

/// Pretty-print `value` to stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: could not serialize output: {e}"),
    }
}

/// Print a `label: value` line, aligned.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<12} {value}", format!("{label}:"));
}
