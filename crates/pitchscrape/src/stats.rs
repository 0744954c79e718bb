//! Statistics normalization against a fixed, ordered catalog.
//!
//! Scraped statistic labels drift between pages and site revisions
//! ("Offside" vs "Offsides", "xG" vs "Expected Goals (xG)"). [`normalize`]
//! maps whatever was scraped onto [`CATALOG`] so every record carries exactly
//! one entry per canonical category, in catalog order, with explicit zero
//! placeholders for anything that was not found.
//!
//! ## Matching
//!
//! Names are compared after [`normalize_name`]. A canonical category matches
//! a scraped one by exact name, then through [`SYNONYMS`], then (unless the
//! category is listed in [`NO_PARTIAL_MATCH`]) by containment when the
//! shorter name is at least 70% of the longer one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{NormalizedStat, RawStat, StatValue};

/// Canonical statistics, grouped by section, in output order.
pub const CATALOG: &[(&str, &[&str])] = &[
    (
        "Shots",
        &[
            "Expected Goals (xG)",
            "xG on target (xGOT)",
            "Total shots",
            "Shots on target",
            "Shots off target",
            "Blocked Shots",
            "Shots inside the Box",
            "Shots outside the Box",
            "Hit the Woodwork",
            "Headed Goals",
        ],
    ),
    (
        "Attack",
        &[
            "Big Chances",
            "Corner Kicks",
            "Touches in opposition box",
            "Accurate through passes",
            "Offsides",
            "Free Kicks",
        ],
    ),
    (
        "Passes",
        &[
            "Ball Possession",
            "Passes",
            "Long passes",
            "Passes in final third",
            "Crosses",
            "Expected assists (xA)",
            "Throw-ins",
        ],
    ),
    (
        "Defense",
        &[
            "Yellow Cards",
            "Red Cards",
            "Fouls",
            "Tackles",
            "Duels won",
            "Clearances",
            "Interceptions",
            "Errors leading to shot",
            "Errors leading to goal",
        ],
    ),
    (
        "Goalkeeping",
        &["Goalkeeper Saves", "xGOT faced", "Goals prevented"],
    ),
];

/// Number of canonical categories.
pub const CATALOG_SIZE: usize = 35;

/// Known alternate spellings, keyed by the normalized canonical name.
pub const SYNONYMS: &[(&str, &[&str])] = &[
    ("expected goals xg", &["xg", "expected goals"]),
    ("xg on target xgot", &["xgot", "xg on target"]),
    ("expected assists xa", &["xa", "expected assists"]),
    ("xgot faced", &["xg on target faced"]),
    ("offsides", &["offside"]),
    ("throw ins", &["throwins", "throw in"]),
    (
        "touches in opposition box",
        &["touches opposition box", "touches in opp box"],
    ),
    ("shots inside the box", &["shots inside box"]),
    ("shots outside the box", &["shots outside box"]),
    ("hit the woodwork", &["woodwork", "hit woodwork"]),
    ("errors leading to shot", &["error leading to shot"]),
    ("errors leading to goal", &["error leading to goal"]),
    ("goalkeeper saves", &["saves", "gk saves", "goalkeeper save"]),
    ("goals prevented", &["goal prevented"]),
];

/// Short or overlapping names that must match exactly or via a synonym.
pub const NO_PARTIAL_MATCH: &[&str] = &[
    "passes",
    "long passes",
    "passes in final third",
    "accurate through passes",
    "big chances",
    "corner kicks",
    "total shots",
    "shots on target",
    "shots off target",
];

const MIN_PARTIAL_LEN: usize = 5;
const MIN_OVERLAP_RATIO: f64 = 0.7;

/// A catalog position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub section: &'static str,
    pub category: &'static str,
}

/// Iterate the catalog in output order.
pub fn catalog() -> impl Iterator<Item = CatalogEntry> {
    CATALOG.iter().flat_map(|(section, categories)| {
        categories.iter().map(move |category| CatalogEntry {
            section,
            category,
        })
    })
}

/// Lowercase, drop punctuation, turn `-`/`_`/`/` into spaces, collapse
/// whitespace.
pub fn normalize_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .filter_map(|c| match c {
            '-' | '_' | '/' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    mapped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn synonyms_of(normalized: &str) -> &'static [&'static str] {
    SYNONYMS
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, variants)| *variants)
        .unwrap_or(&[])
}

/// Whether a scraped name (already normalized) refers to a canonical one.
fn names_match(extracted: &str, canonical: &str) -> bool {
    if extracted == canonical {
        return true;
    }
    if synonyms_of(canonical).contains(&extracted) || synonyms_of(extracted).contains(&canonical)
    {
        return true;
    }
    if NO_PARTIAL_MATCH.contains(&canonical) || NO_PARTIAL_MATCH.contains(&extracted) {
        return false;
    }

    let (shorter, longer) = if extracted.len() <= canonical.len() {
        (extracted, canonical)
    } else {
        (canonical, extracted)
    };
    if shorter.len() < MIN_PARTIAL_LEN || !longer.contains(shorter) {
        return false;
    }
    shorter.len() as f64 / longer.len() as f64 >= MIN_OVERLAP_RATIO
}

/// Group by normalized category name and keep the last occurrence of each
/// group. Groups stay in order of first appearance.
pub fn deduplicate(stats: &[RawStat]) -> Vec<(String, &RawStat)> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, &RawStat> = HashMap::new();
    for stat in stats {
        let key = normalize_name(&stat.category);
        if latest.insert(key.clone(), stat).is_none() {
            order.push(key);
        }
    }
    order
        .into_iter()
        .filter_map(|key| latest.remove(&key).map(|stat| (key, stat)))
        .collect()
}

/// Parse a scraped statistic cell.
///
/// Handles plain numbers (`"12"`, `"1.87"`), percentages (`"58%"`), and
/// ratios with or without a percentage (`"81% (325/400)"`, `"325/400 (81%)"`).
pub fn parse_stat_value(raw: &str) -> StatValue {
    let text = raw.trim();

    let percentage = text.find('%').and_then(|idx| {
        let head = &text[..idx];
        let start = head
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map_or(0, |i| i + 1);
        head[start..].parse::<f64>().ok()
    });

    let ratio = text.find('/').and_then(|idx| {
        let head = &text[..idx];
        let tail = &text[idx + 1..];
        let start = head
            .rfind(|c: char| !c.is_ascii_digit())
            .map_or(0, |i| i + 1);
        let end = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        let successful = head[start..].parse::<u32>().ok()?;
        let total = tail[..end].parse::<u32>().ok()?;
        Some((successful, total))
    });

    let value = percentage.or_else(|| first_number(text));

    StatValue {
        raw: text.to_string(),
        value,
        percentage,
        successful: ratio.map(|(s, _)| s),
        total: ratio.map(|(_, t)| t),
    }
}

fn first_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let number: f64 = rest[..end].parse().ok()?;
    // "Goals prevented" can be negative.
    if text[..start].ends_with('-') {
        Some(-number)
    } else {
        Some(number)
    }
}

/// The placeholder used for a category that was not scraped.
pub fn zero_value() -> StatValue {
    parse_stat_value("0")
}

/// Map scraped statistics onto the catalog.
///
/// The output always has [`CATALOG_SIZE`] entries in catalog order,
/// whatever the input length or order.
pub fn normalize(stats: &[RawStat]) -> Vec<NormalizedStat> {
    let deduplicated = deduplicate(stats);

    catalog()
        .map(|entry| {
            let canonical = normalize_name(entry.category);
            let found = deduplicated
                .iter()
                .find(|(name, _)| names_match(name, &canonical))
                .map(|(_, stat)| *stat);

            match found {
                Some(stat) => NormalizedStat {
                    category: entry.category.to_string(),
                    section: entry.section.to_string(),
                    home: parse_stat_value(&stat.home),
                    away: parse_stat_value(&stat.away),
                },
                None => NormalizedStat {
                    category: entry.category.to_string(),
                    section: entry.section.to_string(),
                    home: zero_value(),
                    away: zero_value(),
                },
            }
        })
        .collect()
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// Check a normalized list against the catalog.
///
/// Flags a wrong count, any missing canonical category, and duplicate
/// names. Duplicates cannot come out of [`normalize`]; seeing one means the
/// normalizer is broken.
pub fn validate(stats: &[NormalizedStat]) -> StatsValidation {
    let mut issues = Vec::new();

    if stats.len() != CATALOG_SIZE {
        issues.push(format!(
            "Expected {CATALOG_SIZE} stats, got {}",
            stats.len()
        ));
    }

    for entry in catalog() {
        if !stats.iter().any(|s| s.category == entry.category) {
            issues.push(format!("Missing stat: {}", entry.category));
        }
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for stat in stats {
        *seen.entry(normalize_name(&stat.category)).or_default() += 1;
    }
    let mut duplicates: Vec<&String> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| name)
        .collect();
    duplicates.sort();
    if !duplicates.is_empty() {
        let names: Vec<&str> = duplicates.iter().map(|s| s.as_str()).collect();
        issues.push(format!("Duplicate stats found: {}", names.join(", ")));
    }

    StatsValidation {
        is_valid: issues.is_empty(),
        issues,
    }
}

/// Group normalized stats by section, sections in catalog order.
pub fn group_by_section(stats: &[NormalizedStat]) -> Vec<(&'static str, Vec<&NormalizedStat>)> {
    CATALOG
        .iter()
        .map(|(section, _)| {
            let members: Vec<&NormalizedStat> = stats.iter().filter(|s| s.section == *section).collect();
            (*section, members)
        })
        .filter(|(_, members)| !members.is_empty())
        .collect()
}
