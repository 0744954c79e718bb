//! Conversion from scraped [`RawRecord`]s into finished [`MatchRecord`]s.

use crate::format::{
    card_colour, clean_text, incident_kind, parse_minute, parse_score, parse_u32, slug,
    to_iso8601,
};
use crate::stats::normalize;
use crate::types::{
    Half, Incident, MatchRecord, RawIncident, RawRecord, Score, Team, TeamInfo,
};

impl RawRecord {
    /// Build the finished record.
    ///
    /// Statistics are normalized per scraped period, so every period list
    /// carries the full catalog. A date that does not parse is kept as the
    /// scraped text.
    pub fn into_record(self) -> MatchRecord {
        let date = self
            .date
            .as_deref()
            .map(|d| to_iso8601(d).unwrap_or_else(|| d.trim().to_string()));

        let score = Score {
            home: self.score.home.as_deref().and_then(parse_u32),
            away: self.score.away.as_deref().and_then(parse_u32),
            regulation_time: clean_text(self.score.regulation_time.as_deref()),
            penalties: clean_text(self.score.penalties.as_deref()),
        };

        let incidents = self
            .incidents
            .iter()
            .enumerate()
            .map(|(i, raw)| structure_incident(i as u32 + 1, raw))
            .collect();

        MatchRecord {
            match_id: self.match_id,
            source_url: self.source_url,
            stage: clean_text(self.stage.as_deref()),
            date,
            status: clean_text(self.status.as_deref()),
            home: team(self.home),
            away: team(self.away),
            score,
            information: self.information,
            incidents,
            statistics: self.statistics.map(|stats| normalize(&stats)),
        }
    }
}

fn team(info: TeamInfo) -> Team {
    let name = info.name.unwrap_or_default().trim().to_string();
    Team {
        id: slug(&name),
        name,
        image: info.image,
    }
}

fn structure_incident(sequence: u32, raw: &RawIncident) -> Incident {
    let minute = parse_minute(&raw.minute);
    let goals = raw.score.as_deref().and_then(parse_score);
    Incident {
        sequence,
        half: Half::from_minute(minute.minute),
        minute,
        side: raw.side,
        kind: incident_kind(raw.kind.as_deref()),
        card: card_colour(raw.card.as_deref()),
        player: clean_text(raw.player.as_deref()),
        assist: clean_text(raw.assist.as_deref()),
        out_player: clean_text(raw.out_player.as_deref()),
        home_goals_after: goals.map(|(h, _)| h),
        away_goals_after: goals.map(|(_, a)| a),
        detail: clean_text(raw.detail.as_deref()),
    }
}
