//! Core data types for work items, match records, and statistics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One unit of extractable work (one match page).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub source_url: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
        }
    }
}

/// A team as shown in the match header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Score strings exactly as read from the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub home: Option<String>,
    pub away: Option<String>,
    pub regulation_time: Option<String>,
    pub penalties: Option<String>,
}

/// A `{category, value}` pair from the match information block
/// (referee, venue, capacity, attendance, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoEntry {
    pub category: String,
    pub value: String,
}

/// Which side of the pitch an incident belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// An incident row as read from the match summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIncident {
    pub minute: String,
    pub side: Side,
    pub kind: Option<String>,
    pub card: Option<String>,
    pub player: Option<String>,
    pub assist: Option<String>,
    pub out_player: Option<String>,
    pub score: Option<String>,
    pub detail: Option<String>,
}

/// One scraped statistic row before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStat {
    pub category: String,
    pub home: String,
    pub away: String,
}

impl RawStat {
    pub fn new(category: impl Into<String>, home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            home: home.into(),
            away: away.into(),
        }
    }
}

impl From<&NormalizedStat> for RawStat {
    fn from(stat: &NormalizedStat) -> Self {
        Self {
            category: stat.category.clone(),
            home: stat.home.raw.clone(),
            away: stat.away.raw.clone(),
        }
    }
}

/// A parsed statistic value for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatValue {
    pub raw: String,
    pub value: Option<f64>,
    pub percentage: Option<f64>,
    pub successful: Option<u32>,
    pub total: Option<u32>,
}

/// A statistic mapped onto the canonical catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedStat {
    pub category: String,
    pub section: String,
    pub home: StatValue,
    pub away: StatValue,
}

/// Statistics for the period(s) that were scraped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum PeriodStats<S> {
    FullTime {
        stats: Vec<S>,
    },
    AllPeriods {
        full_time: Vec<S>,
        first_half: Vec<S>,
        second_half: Vec<S>,
    },
}

impl<S> PeriodStats<S> {
    /// Apply `f` to every period list.
    pub fn map<T, F>(self, mut f: F) -> PeriodStats<T>
    where
        F: FnMut(Vec<S>) -> Vec<T>,
    {
        match self {
            PeriodStats::FullTime { stats } => PeriodStats::FullTime { stats: f(stats) },
            PeriodStats::AllPeriods {
                full_time,
                first_half,
                second_half,
            } => PeriodStats::AllPeriods {
                full_time: f(full_time),
                first_half: f(first_half),
                second_half: f(second_half),
            },
        }
    }

    /// The full-time list, present in both shapes.
    pub fn full_time(&self) -> &[S] {
        match self {
            PeriodStats::FullTime { stats } => stats,
            PeriodStats::AllPeriods { full_time, .. } => full_time,
        }
    }
}

/// Everything the extraction step returns for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub match_id: String,
    pub source_url: String,
    pub stage: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
    pub home: TeamInfo,
    pub away: TeamInfo,
    pub score: RawScore,
    pub information: Vec<InfoEntry>,
    pub incidents: Vec<RawIncident>,
    pub statistics: PeriodStats<RawStat>,
}

impl RawRecord {
    /// Fail with [`ScrapeError::MissingField`] when a field every record
    /// needs (team names, score) is absent.
    pub fn ensure_required(&self) -> ScrapeResult<()> {
        let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let field = if missing(&self.home.name) {
            Some("home.name")
        } else if missing(&self.away.name) {
            Some("away.name")
        } else if missing(&self.score.home) {
            Some("score.home")
        } else if missing(&self.score.away) {
            Some("score.away")
        } else {
            None
        };
        match field {
            Some(field) => Err(ScrapeError::MissingField {
                id: self.match_id.clone(),
                field,
            }),
            None => Ok(()),
        }
    }
}

/// A team in a finished record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Stable slug derived from the team name.
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

/// Parsed final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub home: Option<u32>,
    pub away: Option<u32>,
    pub regulation_time: Option<String>,
    pub penalties: Option<String>,
}

/// A minute marker such as `16'` or `90+3'`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Minute {
    pub minute: Option<u32>,
    pub stoppage: Option<u32>,
    pub display: String,
}

/// Which part of the match a minute falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    First,
    Second,
    ExtraTime,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Goal,
    OwnGoal,
    PenaltyMissed,
    Card,
    Substitution,
    VarDisallowed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardColour {
    Yellow,
    Red,
    YellowRed,
}

/// A structured incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub sequence: u32,
    pub minute: Minute,
    pub half: Half,
    pub side: Side,
    pub kind: IncidentKind,
    pub card: Option<CardColour>,
    pub player: Option<String>,
    pub assist: Option<String>,
    pub out_player: Option<String>,
    pub home_goals_after: Option<u32>,
    pub away_goals_after: Option<u32>,
    pub detail: Option<String>,
}

/// The extraction result for one work item, keyed by `match_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub source_url: String,
    pub stage: Option<String>,
    /// ISO 8601 when the scraped date could be parsed, otherwise the raw text.
    pub date: Option<String>,
    pub status: Option<String>,
    pub home: Team,
    pub away: Team,
    pub score: Score,
    pub information: Vec<InfoEntry>,
    pub incidents: Vec<Incident>,
    pub statistics: PeriodStats<NormalizedStat>,
}

/// Which statistics periods to collect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatsPeriod {
    #[default]
    FullTime,
    AllPeriods,
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fulltime" | "full-time" => Ok(Self::FullTime),
            "all-periods" | "all" => Ok(Self::AllPeriods),
            other => Err(format!(
                "unknown stats period '{other}' (expected 'fulltime' or 'all-periods')"
            )),
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullTime => write!(f, "fulltime"),
            Self::AllPeriods => write!(f, "all-periods"),
        }
    }
}

/// Output file layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One JSON object keyed by match id.
    #[default]
    Json,
    /// A JSON array of records.
    JsonArray,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonArray => "array.json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-array" => Ok(Self::JsonArray),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "unknown output format '{other}' (expected 'json', 'json-array' or 'csv')"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::JsonArray => write!(f, "json-array"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Coarse error classes that drive retry and restart decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Presumed recoverable by retrying and/or restarting the session.
    Transient,
    /// Data missing after a successful load; retried but never restarts.
    Permanent,
    /// Aborts the run; never retried.
    Fatal,
    /// Checkpoint/output write failures.
    Io,
}

/// Errors that can occur anywhere in the scrape pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Timed out after {after_ms}ms: {what}")]
    Timeout { what: String, after_ms: u64 },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Browser session disconnected")]
    Disconnected,

    #[error("Missing required field '{field}' for {id}")]
    MissingField { id: String, field: &'static str },

    #[error("No work items found: {0}")]
    NoItemsFound(String),

    #[error("Task for {0} ended without a result")]
    TaskAborted(String),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ScrapeError>,
    },
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Timeout { .. }
            | ScrapeError::Navigation(_)
            | ScrapeError::Protocol(_)
            | ScrapeError::Disconnected => ErrorKind::Transient,
            ScrapeError::MissingField { .. }
            | ScrapeError::NoItemsFound(_)
            | ScrapeError::TaskAborted(_) => ErrorKind::Permanent,
            ScrapeError::Launch(_) | ScrapeError::Config(_) => ErrorKind::Fatal,
            ScrapeError::Io(_) | ScrapeError::Json(_) | ScrapeError::Csv(_) => ErrorKind::Io,
            ScrapeError::Exhausted { source, .. } => source.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Convenience result type.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RawRecord {
        RawRecord {
            match_id: "abc".into(),
            source_url: "https://example.test/match/abc".into(),
            stage: None,
            date: None,
            status: Some("Finished".into()),
            home: TeamInfo {
                name: Some("Arsenal".into()),
                image: None,
            },
            away: TeamInfo {
                name: Some("Chelsea".into()),
                image: None,
            },
            score: RawScore {
                home: Some("2".into()),
                away: Some("1".into()),
                ..Default::default()
            },
            information: vec![],
            incidents: vec![],
            statistics: PeriodStats::FullTime { stats: vec![] },
        }
    }

    #[test]
    fn test_ensure_required_accepts_complete_record() {
        assert!(record().ensure_required().is_ok());
    }

    #[test]
    fn test_ensure_required_flags_blank_team() {
        let mut r = record();
        r.away.name = Some("  ".into());
        match r.ensure_required() {
            Err(ScrapeError::MissingField { id, field }) => {
                assert_eq!(id, "abc");
                assert_eq!(field, "away.name");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_required_flags_missing_score() {
        let mut r = record();
        r.score.home = None;
        let err = r.ensure_required().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_error_kinds() {
        assert!(ScrapeError::Disconnected.is_transient());
        assert!(ScrapeError::Launch("no chrome".into()).is_fatal());
        assert_eq!(ScrapeError::TaskAborted("m1".into()).kind(), ErrorKind::Permanent);
        let exhausted = ScrapeError::Exhausted {
            attempts: 3,
            source: Box::new(ScrapeError::Timeout {
                what: "goto".into(),
                after_ms: 10,
            }),
        };
        assert_eq!(exhausted.kind(), ErrorKind::Transient);
        assert!(exhausted.to_string().contains("3 attempt"));
    }

    #[test]
    fn test_format_and_period_parsing() {
        assert_eq!("json-array".parse::<OutputFormat>(), Ok(OutputFormat::JsonArray));
        assert_eq!(OutputFormat::JsonArray.extension(), "array.json");
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!("all-periods".parse::<StatsPeriod>(), Ok(StatsPeriod::AllPeriods));
        assert_eq!(StatsPeriod::FullTime.to_string(), "fulltime");
    }

    #[test]
    fn test_period_stats_map_keeps_shape() {
        let stats = PeriodStats::AllPeriods {
            full_time: vec![1, 2],
            first_half: vec![3],
            second_half: vec![],
        };
        let mapped = stats.map(|v| v.into_iter().map(|x| x * 10).collect::<Vec<_>>());
        assert_eq!(mapped.full_time(), &[10, 20]);
        match mapped {
            PeriodStats::AllPeriods { first_half, .. } => assert_eq!(first_half, vec![30]),
            _ => panic!("shape changed"),
        }
    }
}
