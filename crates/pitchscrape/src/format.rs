//! Parsing helpers for the loosely formatted text a match page shows.

use chrono::{NaiveDate, NaiveDateTime};

use crate::types::{CardColour, Half, IncidentKind, Minute};

/// Parse an integer, ignoring embedded whitespace (`"60 260"` → 60260).
pub fn parse_integer(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

pub(crate) fn parse_u32(text: &str) -> Option<u32> {
    parse_integer(text).and_then(|v| u32::try_from(v).ok())
}

/// Parse a minute marker: `"16'"`, `"90+3'"`.
pub fn parse_minute(text: &str) -> Minute {
    let cleaned = text.replace('\'', "");
    let cleaned = cleaned.trim();
    let (minute, stoppage) = match cleaned.split_once('+') {
        Some((base, extra)) => (parse_u32(base), parse_u32(extra)),
        None => (parse_u32(cleaned), None),
    };
    Minute {
        minute,
        stoppage,
        display: text.trim().to_string(),
    }
}

impl Half {
    /// 1–45 first half, 46–90 second half, anything later is extra time.
    pub fn from_minute(minute: Option<u32>) -> Self {
        match minute {
            Some(1..=45) => Half::First,
            Some(46..=90) => Half::Second,
            Some(m) if m > 90 => Half::ExtraTime,
            _ => Half::Unknown,
        }
    }
}

/// Parse `"0 - 1"` into `(0, 1)`.
pub fn parse_score(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split('-').map(str::trim);
    let home = parts.next().and_then(parse_u32)?;
    let away = parts.next().and_then(parse_u32)?;
    if parts.next().is_some() {
        return None;
    }
    Some((home, away))
}

/// Convert `"27.10.2025 12:00"` to `"2025-10-27T12:00:00Z"`.
///
/// A date without a time is taken as midnight. Returns `None` when the
/// text is not in the day-first dotted format.
pub fn to_iso8601(text: &str) -> Option<String> {
    let text = text.trim();
    let parsed = NaiveDateTime::parse_from_str(text, "%d.%m.%Y %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%d.%m.%Y")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Lowercase, underscore-separated identifier (`"Man Utd."` → `"man_utd"`).
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_sep = true;
        }
    }
    out
}

/// A job name made safe to use as a file stem inside one directory.
///
/// Anything other than letters, digits, `-` and `_` becomes `_`, so path
/// separators and `..` cannot leave the directory.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strip parentheses and surrounding whitespace; empty text becomes `None`.
pub fn clean_text(text: Option<&str>) -> Option<String> {
    let cleaned: String = text?.chars().filter(|c| *c != '(' && *c != ')').collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Map a scraped incident label onto [`IncidentKind`].
pub fn incident_kind(label: Option<&str>) -> IncidentKind {
    let label = label.unwrap_or_default().to_ascii_lowercase();
    if label.contains("var") || label.contains("disallowed") {
        IncidentKind::VarDisallowed
    } else if label.contains("penalty missed") {
        IncidentKind::PenaltyMissed
    } else if label.contains("own goal") {
        IncidentKind::OwnGoal
    } else if label.contains("goal") {
        IncidentKind::Goal
    } else if label.contains("substitution") {
        IncidentKind::Substitution
    } else if label.contains("card") {
        IncidentKind::Card
    } else {
        IncidentKind::Unknown
    }
}

/// Map a scraped card label (`"Yellow"`, `"Yellow/Red"`, `"Red"`).
pub fn card_colour(label: Option<&str>) -> Option<CardColour> {
    let label = label?.to_ascii_lowercase();
    let yellow = label.contains("yellow");
    let red = label.contains("red");
    match (yellow, red) {
        (true, true) => Some(CardColour::YellowRed),
        (true, false) => Some(CardColour::Yellow),
        (false, true) => Some(CardColour::Red),
        (false, false) => None,
    }
}
