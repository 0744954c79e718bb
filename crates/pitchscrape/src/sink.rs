//! Output sinks for finished records.
//!
//! Sinks are called repeatedly with a growing map during a run; every call
//! overwrites the previous output for the job.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::format::file_stem;
use crate::stats::{catalog, group_by_section};
use crate::types::{MatchRecord, OutputFormat, ScrapeResult};

/// Something that can persist the accumulated results of a job.
pub trait OutputSink: Send + Sync {
    /// Write `records` for `job_name`, replacing any earlier output.
    fn persist(
        &self,
        records: &BTreeMap<String, MatchRecord>,
        job_name: &str,
        format: OutputFormat,
    ) -> ScrapeResult<PathBuf>;
}

/// Writes `<dir>/<job>.<ext>`, with the job name made file-safe.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, job_name: &str, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem(job_name), format.extension()))
    }
}

impl OutputSink for FileSink {
    fn persist(
        &self,
        records: &BTreeMap<String, MatchRecord>,
        job_name: &str,
        format: OutputFormat,
    ) -> ScrapeResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(job_name, format);
        let bytes = match format {
            OutputFormat::Json => serde_json::to_vec_pretty(records)?,
            OutputFormat::JsonArray => {
                let list: Vec<&MatchRecord> = records.values().collect();
                serde_json::to_vec_pretty(&list)?
            }
            OutputFormat::Csv => to_csv(records)?,
        };
        write_atomic(&path, &bytes)?;
        tracing::debug!(path = %path.display(), records = records.len(), "results written");
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> ScrapeResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

const BASE_COLUMNS: &[&str] = &[
    "match_id",
    "source_url",
    "stage",
    "date",
    "status",
    "home_id",
    "home_name",
    "away_id",
    "away_name",
    "score_home",
    "score_away",
    "regulation_time",
    "penalties",
];

fn column_key(text: &str) -> String {
    crate::format::slug(text)
}

/// One row per match: base columns, then information categories in
/// first-seen order, then full-time statistics in catalog order.
fn to_csv(records: &BTreeMap<String, MatchRecord>) -> ScrapeResult<Vec<u8>> {
    let mut info_columns: Vec<String> = Vec::new();
    for record in records.values() {
        for entry in &record.information {
            let key = column_key(&entry.category);
            if !info_columns.contains(&key) {
                info_columns.push(key);
            }
        }
    }

    let stat_columns: Vec<(String, &'static str)> = catalog()
        .flat_map(|entry| {
            let base = format!("{}_{}", column_key(entry.section), column_key(entry.category));
            [
                (format!("{base}_home"), entry.category),
                (format!("{base}_away"), entry.category),
            ]
        })
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let header: Vec<String> = BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(info_columns.iter().map(|c| format!("info_{c}")))
        .chain(stat_columns.iter().map(|(name, _)| name.clone()))
        .collect();
    writer.write_record(&header)?;

    for record in records.values() {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let num = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
        let mut row = vec![
            record.match_id.clone(),
            record.source_url.clone(),
            opt(&record.stage),
            opt(&record.date),
            opt(&record.status),
            record.home.id.clone(),
            record.home.name.clone(),
            record.away.id.clone(),
            record.away.name.clone(),
            num(record.score.home),
            num(record.score.away),
            opt(&record.score.regulation_time),
            opt(&record.score.penalties),
        ];

        for column in &info_columns {
            let value = record
                .information
                .iter()
                .find(|e| &column_key(&e.category) == column)
                .map(|e| e.value.clone())
                .unwrap_or_default();
            row.push(value);
        }

        let full_time = record.statistics.full_time();
        let by_category: BTreeMap<&str, _> = group_by_section(full_time)
            .into_iter()
            .flat_map(|(_, stats)| stats)
            .map(|s| (s.category.as_str(), s))
            .collect();
        for (name, category) in &stat_columns {
            let value = by_category
                .get(category)
                .map(|s| {
                    if name.ends_with("_home") {
                        s.home.raw.clone()
                    } else {
                        s.away.raw.clone()
                    }
                })
                .unwrap_or_default();
            row.push(value);
        }

        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InfoEntry, PeriodStats, RawRecord, RawScore, RawStat, TeamInfo};

    fn record(id: &str, home: &str, away: &str) -> MatchRecord {
        RawRecord {
            match_id: id.into(),
            source_url: format!("https://example.test/match/{id}/"),
            stage: Some("Round 1".into()),
            date: Some("10.08.2024 16:00".into()),
            status: Some("Finished".into()),
            home: TeamInfo {
                name: Some(home.into()),
                image: None,
            },
            away: TeamInfo {
                name: Some(away.into()),
                image: None,
            },
            score: RawScore {
                home: Some("2".into()),
                away: Some("0".into()),
                ..Default::default()
            },
            information: vec![InfoEntry {
                category: "Referee".into(),
                value: "Taylor A. (Eng)".into(),
            }],
            incidents: vec![],
            statistics: PeriodStats::FullTime {
                stats: vec![RawStat::new("Ball Possession", "60%", "40%")],
            },
        }
        .into_record()
    }

    fn records() -> BTreeMap<String, MatchRecord> {
        let mut map = BTreeMap::new();
        map.insert("m1".to_string(), record("m1", "Arsenal", "Wolves"));
        map.insert("m2".to_string(), record("m2", "Everton", "Fulham"));
        map
    }

    #[test]
    fn test_json_object_keyed_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let path = sink.persist(&records(), "job", OutputFormat::Json).unwrap();
        assert!(path.ends_with("job.json"));

        let parsed: BTreeMap<String, MatchRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["m2"].home.name, "Everton");
    }

    #[test]
    fn test_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let path = sink.persist(&records(), "job", OutputFormat::JsonArray).unwrap();
        assert!(path.ends_with("job.array.json"));

        let parsed: Vec<MatchRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].match_id, "m1");
    }

    #[test]
    fn test_job_name_with_separators_stays_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let path = sink.persist(&records(), "spain/laliga", OutputFormat::Json).unwrap();
        assert_eq!(path, dir.path().join("spain_laliga.json"));
        assert!(path.exists());

        let path = sink.persist(&records(), "../escape", OutputFormat::Csv).unwrap();
        assert_eq!(path, dir.path().join("___escape.csv"));
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let mut map = records();
        sink.persist(&map, "job", OutputFormat::Json).unwrap();
        map.remove("m2");
        let path = sink.persist(&map, "job", OutputFormat::Json).unwrap();

        let parsed: BTreeMap<String, MatchRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!dir.path().join("job.json.tmp").exists());
    }

    #[test]
    fn test_csv_columns_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let path = sink.persist(&records(), "job", OutputFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "match_id");
        assert!(headers.iter().any(|h| h == "info_referee"));
        let possession = headers
            .iter()
            .position(|h| h == "passes_ball_possession_home")
            .unwrap();
        assert_eq!(
            headers.len(),
            BASE_COLUMNS.len() + 1 + 2 * crate::stats::CATALOG_SIZE
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][possession], "60%");
        assert_eq!(&rows[0][possession + 1], "40%");
        assert_eq!(&rows[1][6], "Everton");
    }
}
