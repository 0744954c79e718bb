//! Flashscore link discovery and match extraction.
//!
//! Browser work (navigation, clicks, waits) goes through a live
//! [`RenderContext`]; once a page is in the state we want, its HTML is
//! pulled out and parsed with `scraper`. The parsing functions are pure and
//! take HTML text, so they can be tested against fixtures.

use crate::config::{ScrapeConfig, CONSENT_SELECTORS};
use crate::live::{act, SessionHandle};
use crate::orchestrator::{Extractor, LinkDiscovery};
use crate::renderer::{into_scrape_error, RenderContext};
use async_trait::async_trait;
use pitchscrape::{
    InfoEntry, PeriodStats, RawIncident, RawRecord, RawScore, RawStat, ScrapeError, ScrapeResult,
    Side, StatsPeriod, TeamInfo, WorkItem,
};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;

const MATCH_ROW: &str = ".event__match.event__match--static.event__match--twoLine";
const MATCH_LINK: &str = "a.eventRowLink";
const LOAD_MORE: &str = "[data-testid=\"wcl-buttonLink\"]";
/// Consecutive "show more" clicks that add no rows before giving up.
const MAX_EMPTY_CYCLES: usize = 4;

const START_TIME: &str = ".duelParticipant__startTime";
const STATUS: &str = ".fixedHeaderDuel__detailStatus";
const OVERLINE_STAGE: &str = "span[data-testid='wcl-scores-overline-03']";
const OVERLINE_LABEL: &str = "[data-testid='wcl-scores-overline-02']";
const HOME_NAME: &str = ".duelParticipant__home .participant__participantName.participant__overflow";
const AWAY_NAME: &str = ".duelParticipant__away .participant__participantName.participant__overflow";
const HOME_IMAGE: &str = ".duelParticipant__home .participant__image";
const AWAY_IMAGE: &str = ".duelParticipant__away .participant__image";
const SCORE_PART: &str = ".detailScore__wrapper span:not(.detailScore__divider)";
const REGULATION_TIME: &str = ".detailScore__fullTime";
const INFORMATION: &str = "div[data-testid='wcl-summaryMatchInformation'] > div";

const INCIDENT_ROW: &str = "div.smv__participantRow";

const STATS_TAB: &str = "a";
const PERIOD_TAB: &str = "button[data-testid='wcl-tab']";
const STATS_ROW: &str = "div[data-testid='wcl-statistics']";
const STATS_CATEGORY: &str = "[data-testid='wcl-statistics-category']";
const STATS_VALUE: &str = "[data-testid='wcl-statistics-value'] strong";

fn css(selector: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Config(format!("invalid selector {selector}: {e:?}")))
}

/// Visible text with whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Match rows on a results page, in page order, without duplicates.
///
/// Row ids look like `g_1_KQwf2DOa`; the prefix is dropped. Relative links
/// are resolved against `page_url`.
pub fn parse_match_links(html: &str, page_url: &str) -> ScrapeResult<Vec<WorkItem>> {
    let row_sel = css(MATCH_ROW)?;
    let link_sel = css(MATCH_LINK)?;
    let base = url::Url::parse(page_url).ok();
    let doc = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for row in doc.select(&row_sel) {
        let Some(id) = row
            .value()
            .id()
            .map(|id| id.trim_start_matches("g_1_").to_string())
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        let Some(href) = row
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            tracing::debug!(id = %id, "match row without link");
            continue;
        };
        let url = match base.as_ref().and_then(|b| b.join(href).ok()) {
            Some(url) => url.to_string(),
            None => href.to_string(),
        };
        if seen.insert(id.clone()) {
            items.push(WorkItem::new(id, url));
        }
    }
    Ok(items)
}

/// Header, score, information, and incidents of a match summary page.
///
/// Statistics are left empty; they live on a separate tab.
pub fn parse_match_page(html: &str, item: &WorkItem) -> ScrapeResult<RawRecord> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let stage = root
        .select(&css(OVERLINE_STAGE)?)
        .nth(2)
        .map(text_of)
        .and_then(|t| t.rsplit(" - ").next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty());

    let score_sel = css(SCORE_PART)?;
    let mut score_parts = root.select(&score_sel).map(text_of);
    let score = RawScore {
        home: score_parts.next().filter(|s| !s.is_empty()),
        away: score_parts.next().filter(|s| !s.is_empty()),
        regulation_time: first_text(root, &css(REGULATION_TIME)?)
            .map(|t| t.replace(['(', ')'], "").trim().to_string())
            .filter(|s| !s.is_empty()),
        penalties: penalties(root)?,
    };

    Ok(RawRecord {
        match_id: item.id.clone(),
        source_url: item.source_url.clone(),
        stage,
        date: first_text(root, &css(START_TIME)?),
        status: first_text(root, &css(STATUS)?),
        home: team(root, HOME_NAME, HOME_IMAGE)?,
        away: team(root, AWAY_NAME, AWAY_IMAGE)?,
        score,
        information: information(root)?,
        incidents: incidents(root)?,
        statistics: PeriodStats::FullTime { stats: Vec::new() },
    })
}

fn team(root: ElementRef<'_>, name: &str, image: &str) -> ScrapeResult<TeamInfo> {
    Ok(TeamInfo {
        name: first_text(root, &css(name)?),
        image: root
            .select(&css(image)?)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string),
    })
}

/// The shoot-out score follows a "Penalties" overline label.
fn penalties(root: ElementRef<'_>) -> ScrapeResult<Option<String>> {
    let label = root
        .select(&css(OVERLINE_LABEL)?)
        .find(|el| text_of(*el).eq_ignore_ascii_case("penalties"));
    Ok(label
        .and_then(|el| el.next_siblings().find_map(ElementRef::wrap))
        .map(|el| text_of(el).split_whitespace().collect::<String>())
        .filter(|s| !s.is_empty()))
}

/// Information cells alternate label, value.
fn information(root: ElementRef<'_>) -> ScrapeResult<Vec<InfoEntry>> {
    let cells: Vec<String> = root
        .select(&css(INFORMATION)?)
        .map(|el| strip_colons(&text_of(el)))
        .collect();
    Ok(cells
        .chunks(2)
        .filter(|pair| !pair[0].is_empty())
        .map(|pair| InfoEntry {
            category: pair[0].clone(),
            value: pair.get(1).cloned().unwrap_or_default(),
        })
        .collect())
}

fn strip_colons(text: &str) -> String {
    text.replace(':', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

struct IncidentSelectors {
    minute: Selector,
    player: Selector,
    assist: Selector,
    sub_down: Selector,
    score: Selector,
    detail: Selector,
    svg: Selector,
    svg_use: Selector,
    card_icon: Selector,
    any_icon: Selector,
    title: Selector,
}

impl IncidentSelectors {
    fn new() -> ScrapeResult<Self> {
        Ok(Self {
            minute: css(".smv__timeBox")?,
            player: css(".smv__playerName")?,
            assist: css(".smv__assist")?,
            sub_down: css(".smv__subDown")?,
            score: css(".smv__incidentHomeScore, .smv__incidentAwayScore")?,
            detail: css(".smv__subIncident")?,
            svg: css("svg")?,
            svg_use: css(".smv__incidentIcon svg use")?,
            card_icon: css("svg.card-ico, svg[class*='Card']")?,
            any_icon: css(".smv__incidentIcon svg")?,
            title: css("title")?,
        })
    }
}

fn incidents(root: ElementRef<'_>) -> ScrapeResult<Vec<RawIncident>> {
    let sel = IncidentSelectors::new()?;
    let row_sel = css(INCIDENT_ROW)?;
    Ok(root
        .select(&row_sel)
        .map(|row| incident(row, &sel))
        .collect())
}

fn incident(row: ElementRef<'_>, sel: &IncidentSelectors) -> RawIncident {
    let side = if row.value().classes().any(|c| c == "smv__homeParticipant") {
        Side::Home
    } else {
        Side::Away
    };

    let mut kind = incident_label(row, sel);
    let card = card_label(row, sel);
    if card.is_some() {
        kind = Some("Card");
    }

    let mut player = first_text(row, &sel.player);
    let mut assist = first_text(row, &sel.assist);
    let mut detail = first_text(row, &sel.detail);

    // Disallowed goals list the scorer in the assist slot.
    if kind == Some("VAR - Disallowed") && player.is_none() && assist.is_some() {
        player = assist.take();
    }
    if assist
        .as_deref()
        .is_some_and(|a| a.to_lowercase().contains("not on pitch"))
    {
        detail = assist.take();
    }

    RawIncident {
        minute: first_text(row, &sel.minute).unwrap_or_default(),
        side,
        kind: kind.map(str::to_string),
        card: card.map(str::to_string),
        player,
        assist,
        out_player: first_text(row, &sel.sub_down),
        score: first_text(row, &sel.score),
        detail,
    }
}

/// Kind label from the row's icons and text.
///
/// Priority: disallowed goal, missed penalty, own goal, goal, substitution,
/// card.
fn incident_label(row: ElementRef<'_>, sel: &IncidentSelectors) -> Option<&'static str> {
    let classes = row
        .select(&sel.svg)
        .filter_map(|svg| svg.value().attr("class"))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let hrefs = row
        .select(&sel.svg_use)
        .flat_map(|u| u.value().attrs())
        .filter(|(name, _)| name.ends_with("href"))
        .map(|(_, value)| value.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let penalty_icon = row.select(&sel.svg).any(|svg| {
        svg.value().attr("data-testid") == Some("wcl-icon-incidents-penalty-missed")
    });
    let text = text_of(row).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let own_goal = classes.contains("owngoal") || text.contains("own goal");
    let var = classes.split_whitespace().any(|c| c == "var")
        || hrefs.contains("var")
        || text.contains("disallowed")
        || words.contains(&"var");

    if var {
        Some("VAR - Disallowed")
    } else if penalty_icon || text.contains("penalty missed") {
        Some("Penalty Missed")
    } else if own_goal {
        Some("Own Goal")
    } else if classes.contains("goal") || hrefs.contains("goal") {
        Some("Goal")
    } else if classes.contains("substitution") || hrefs.contains("substitution") {
        Some("Substitution")
    } else if classes.contains("card") || hrefs.contains("card") {
        Some("Card")
    } else if row.select(&sel.score).next().is_some() {
        Some("Goal")
    } else if row.select(&sel.sub_down).next().is_some() {
        Some("Substitution")
    } else {
        None
    }
}

/// Card colour from the card icon's title, link, or class.
fn card_label(row: ElementRef<'_>, sel: &IncidentSelectors) -> Option<&'static str> {
    let icon = row
        .select(&sel.card_icon)
        .next()
        .or_else(|| row.select(&sel.any_icon).next())?;

    let class = icon.value().attr("class").unwrap_or_default();
    let title = icon.select(&sel.title).next().map(text_of).unwrap_or_default();
    let href = icon
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "use")
        .flat_map(|u| u.value().attrs())
        .find(|(name, _)| name.ends_with("href"))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default();

    let yellow_title = title.contains("Yellow card");
    let red_title = title.contains("Red card");

    if title.contains("Yellow card / Red card")
        || href.contains("red-yellow-card")
        || class.contains("redYellowCard")
    {
        Some("Yellow/Red")
    } else if yellow_title && !red_title {
        Some("Yellow")
    } else if href.contains("yellow-card") || class.contains("yellowCard") || class.contains("yellow") {
        Some("Yellow")
    } else if red_title && !yellow_title {
        Some("Red")
    } else if href.contains("red-card") || class.contains("redCard") || class.contains("red") {
        Some("Red")
    } else {
        None
    }
}

/// Statistic rows on the statistics tab. Rows with fewer than two values
/// are skipped.
pub fn parse_statistics(html: &str) -> ScrapeResult<Vec<RawStat>> {
    let row_sel = css(STATS_ROW)?;
    let category_sel = css(STATS_CATEGORY)?;
    let value_sel = css(STATS_VALUE)?;
    let doc = Html::parse_document(html);

    Ok(doc
        .select(&row_sel)
        .filter_map(|row| {
            let category = first_text(row, &category_sel)?;
            let mut values = row.select(&value_sel).map(text_of);
            let home = values.next()?;
            let away = values.next()?;
            Some(RawStat::new(category, home, away))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Live collaborators
// ---------------------------------------------------------------------------

/// Collects match links from a league results page.
#[derive(Debug, Clone)]
pub struct FlashscoreDiscovery {
    navigation_timeout: Duration,
    selector_timeout: Duration,
    /// Pause after each "show more" click.
    load_pause: (Duration, Duration),
}

impl FlashscoreDiscovery {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout,
            selector_timeout: config.selector_timeout,
            load_pause: (Duration::from_millis(800), Duration::from_millis(1500)),
        }
    }

    pub fn with_load_pause(mut self, min: Duration, max: Duration) -> Self {
        self.load_pause = (min, max);
        self
    }

    async fn collect(&self, page: &mut dyn RenderContext, job_url: &str) -> ScrapeResult<Vec<WorkItem>> {
        page.navigate(job_url, self.navigation_timeout.as_millis() as u64)
            .await
            .map_err(into_scrape_error)?;
        act::dismiss_overlays(&*page, CONSENT_SELECTORS).await;

        let mut empty_cycles = 0;
        let mut clicks = 0usize;
        loop {
            let before = act::count(&*page, MATCH_ROW).await?;
            if !act::click(&*page, LOAD_MORE).await? {
                break;
            }
            clicks += 1;
            act::settle(self.load_pause.0, self.load_pause.1).await;

            let after = act::count(&*page, MATCH_ROW).await?;
            if after == before {
                empty_cycles += 1;
                if empty_cycles >= MAX_EMPTY_CYCLES {
                    tracing::debug!(clicks, "show-more stopped adding rows");
                    break;
                }
            } else {
                empty_cycles = 0;
            }
        }

        act::wait_for_optional(&*page, MATCH_ROW, self.selector_timeout).await?;
        let html = page.get_html().await.map_err(into_scrape_error)?;
        let items = parse_match_links(&html, job_url)?;
        if items.is_empty() {
            return Err(ScrapeError::NoItemsFound(job_url.to_string()));
        }
        tracing::debug!(count = items.len(), clicks, "match links collected");
        Ok(items)
    }
}

#[async_trait]
impl LinkDiscovery for FlashscoreDiscovery {
    async fn discover(&self, session: &SessionHandle, job_url: &str) -> ScrapeResult<Vec<WorkItem>> {
        let mut page = session
            .renderer
            .new_context()
            .await
            .map_err(into_scrape_error)?;
        let result = self.collect(page.as_mut(), job_url).await;
        if let Err(e) = page.close().await {
            tracing::debug!("closing results page failed: {e:#}");
        }
        result
    }
}

/// Reads one match page and its statistics tab.
#[derive(Debug, Clone)]
pub struct FlashscoreExtractor {
    period: StatsPeriod,
    navigation_timeout: Duration,
    selector_timeout: Duration,
}

impl FlashscoreExtractor {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            period: config.stats_period,
            navigation_timeout: config.navigation_timeout,
            selector_timeout: config.selector_timeout,
        }
    }

    async fn extract_on(&self, page: &mut dyn RenderContext, item: &WorkItem) -> ScrapeResult<RawRecord> {
        page.navigate(&item.source_url, self.navigation_timeout.as_millis() as u64)
            .await
            .map_err(into_scrape_error)?;
        act::wait_for_selector(&*page, START_TIME, self.selector_timeout).await?;
        act::wait_for_optional(&*page, INCIDENT_ROW, self.selector_timeout).await?;

        let html = page.get_html().await.map_err(into_scrape_error)?;
        let mut record = parse_match_page(&html, item)?;
        record.statistics = self.statistics(&*page).await?;
        record.ensure_required()?;
        Ok(record)
    }

    async fn statistics(&self, page: &dyn RenderContext) -> ScrapeResult<PeriodStats<RawStat>> {
        if !act::click_containing(page, STATS_TAB, &["STATS", "STATISTICS"]).await? {
            tracing::debug!("no statistics tab");
            return Ok(match self.period {
                StatsPeriod::FullTime => PeriodStats::FullTime { stats: Vec::new() },
                StatsPeriod::AllPeriods => PeriodStats::AllPeriods {
                    full_time: Vec::new(),
                    first_half: Vec::new(),
                    second_half: Vec::new(),
                },
            });
        }

        let full_time = self.read_stats(page).await?;
        Ok(match self.period {
            StatsPeriod::FullTime => PeriodStats::FullTime { stats: full_time },
            StatsPeriod::AllPeriods => {
                let first_half = self.read_period(page, "1ST HALF").await?;
                let second_half = self.read_period(page, "2ND HALF").await?;
                PeriodStats::AllPeriods {
                    full_time,
                    first_half,
                    second_half,
                }
            }
        })
    }

    async fn read_period(&self, page: &dyn RenderContext, tab: &str) -> ScrapeResult<Vec<RawStat>> {
        if !act::click_by_text(page, PERIOD_TAB, tab).await? {
            tracing::debug!(tab, "period tab missing");
            return Ok(Vec::new());
        }
        act::settle(Duration::from_millis(400), Duration::from_millis(700)).await;
        self.read_stats(page).await
    }

    async fn read_stats(&self, page: &dyn RenderContext) -> ScrapeResult<Vec<RawStat>> {
        if !act::wait_for_optional(page, STATS_ROW, self.selector_timeout).await? {
            return Ok(Vec::new());
        }
        let html = page.get_html().await.map_err(into_scrape_error)?;
        parse_statistics(&html)
    }
}

#[async_trait]
impl Extractor for FlashscoreExtractor {
    async fn extract(&self, session: &SessionHandle, item: &WorkItem) -> ScrapeResult<RawRecord> {
        let mut page = session
            .renderer
            .new_context()
            .await
            .map_err(into_scrape_error)?;
        let result = self.extract_on(page.as_mut(), item).await;
        if let Err(e) = page.close().await {
            tracing::debug!(item = %item.id, "closing match page failed: {e:#}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{NavigationResult, Renderer};
    use anyhow::Result;
    use std::sync::Arc;

    const RESULTS_PAGE: &str = r#"
        <div class="sportName soccer">
          <div id="g_1_KQwf2DOa" class="event__match event__match--static event__match--twoLine">
            <a class="eventRowLink" href="/match/football/arsenal/KQwf2DOa/#/match-summary"></a>
          </div>
          <div id="g_1_tCFGMxJj" class="event__match event__match--static event__match--twoLine">
            <a class="eventRowLink" href="https://www.flashscore.com/match/tCFGMxJj/"></a>
          </div>
          <div id="g_1_KQwf2DOa" class="event__match event__match--static event__match--twoLine">
            <a class="eventRowLink" href="/match/football/arsenal/KQwf2DOa/#/match-summary"></a>
          </div>
          <div id="g_1_noLink" class="event__match event__match--static event__match--twoLine"></div>
          <div id="g_1_live" class="event__match event__match--live event__match--twoLine">
            <a class="eventRowLink" href="/match/live/"></a>
          </div>
        </div>
    "#;

    const MATCH_PAGE: &str = r#"
        <div class="tournamentHeader">
          <span data-testid="wcl-scores-overline-03">Football</span>
          <span data-testid="wcl-scores-overline-03">England</span>
          <span data-testid="wcl-scores-overline-03">Premier League - Round 9</span>
        </div>
        <div class="duelParticipant">
          <div class="duelParticipant__startTime"><div>25.10.2025 15:00</div></div>
          <div class="duelParticipant__home">
            <img class="participant__image" src="https://static.example/arsenal.png">
            <div class="participant__participantName participant__overflow"><a>Arsenal</a></div>
          </div>
          <div class="duelParticipant__away">
            <img class="participant__image" src="https://static.example/palace.png">
            <div class="participant__participantName participant__overflow"><a>Crystal Palace</a></div>
          </div>
          <div class="detailScore__wrapper">
            <span>1</span><span class="detailScore__divider">-</span><span>0</span>
          </div>
          <div class="detailScore__fullTime">(1 - 0)</div>
          <div class="fixedHeaderDuel__detailStatus">Finished</div>
        </div>
        <div class="smv">
          <div class="smv__participantRow smv__homeParticipant">
            <div class="smv__timeBox">39'</div>
            <div class="smv__incidentIcon"><svg class="footballGoal-ico"><use href="/res/_fs/image/13_symbols/incident.svg#goal"></use></svg></div>
            <div class="smv__incidentHomeScore">1 - 0</div>
            <a class="smv__playerName">Eze E.</a>
            <div class="smv__assist">(Saka B.)</div>
          </div>
          <div class="smv__participantRow smv__awayParticipant">
            <div class="smv__timeBox">45+2'</div>
            <div class="smv__incidentIcon"><svg class="card-ico yellowCard-ico"><title>Yellow card</title></svg></div>
            <a class="smv__playerName">Wharton A.</a>
            <div class="smv__subIncident">(Foul)</div>
          </div>
          <div class="smv__participantRow smv__awayParticipant">
            <div class="smv__timeBox">63'</div>
            <div class="smv__incidentIcon"><svg class="substitution"></svg></div>
            <a class="smv__playerName">Sarr I.</a>
            <div class="smv__subDown">Nketiah E.</div>
          </div>
          <div class="smv__participantRow smv__homeParticipant">
            <div class="smv__timeBox">78'</div>
            <div class="smv__incidentIcon"><svg class="var"></svg></div>
            <div class="smv__assist">Gyokeres V.</div>
            <div class="smv__subIncident">Goal Disallowed - Offside</div>
          </div>
          <div class="smv__participantRow smv__homeParticipant">
            <div class="smv__timeBox">88'</div>
            <div class="smv__incidentIcon"><svg class="card-ico"><use href="/res/incident.svg#red-yellow-card"></use></svg></div>
            <a class="smv__playerName">Rice D.</a>
            <div class="smv__assist">(Not on pitch)</div>
          </div>
        </div>
        <div data-testid="wcl-summaryMatchInformation">
          <div>Referee:</div><div>Taylor A. (Eng)</div>
          <div>Venue:</div><div>Emirates Stadium (London)</div>
          <div>Attendance:</div><div>60 260</div>
        </div>
    "#;

    const STATS_PAGE: &str = r#"
        <div data-testid="wcl-statistics">
          <div data-testid="wcl-statistics-value"><strong>58%</strong></div>
          <div data-testid="wcl-statistics-category">Ball possession</div>
          <div data-testid="wcl-statistics-value"><strong>42%</strong></div>
        </div>
        <div data-testid="wcl-statistics">
          <div data-testid="wcl-statistics-value"><strong>81% (325/400)</strong></div>
          <div data-testid="wcl-statistics-category">Passes</div>
          <div data-testid="wcl-statistics-value"><strong>74% (250/338)</strong></div>
        </div>
        <div data-testid="wcl-statistics">
          <div data-testid="wcl-statistics-category">Broken row</div>
          <div data-testid="wcl-statistics-value"><strong>3</strong></div>
        </div>
    "#;

    fn item() -> WorkItem {
        WorkItem::new("KQwf2DOa", "https://www.flashscore.com/match/KQwf2DOa/")
    }

    #[test]
    fn test_parse_match_links() {
        let items = parse_match_links(RESULTS_PAGE, "https://www.flashscore.com/football/england/premier-league/results/").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "KQwf2DOa");
        assert_eq!(
            items[0].source_url,
            "https://www.flashscore.com/match/football/arsenal/KQwf2DOa/#/match-summary"
        );
        assert_eq!(items[1].id, "tCFGMxJj");
    }

    #[test]
    fn test_parse_match_links_empty_page() {
        assert!(parse_match_links("<html></html>", "https://x.test/").unwrap().is_empty());
    }

    #[test]
    fn test_parse_header() {
        let raw = parse_match_page(MATCH_PAGE, &item()).unwrap();
        assert_eq!(raw.match_id, "KQwf2DOa");
        assert_eq!(raw.stage.as_deref(), Some("Round 9"));
        assert_eq!(raw.date.as_deref(), Some("25.10.2025 15:00"));
        assert_eq!(raw.status.as_deref(), Some("Finished"));
        assert_eq!(raw.home.name.as_deref(), Some("Arsenal"));
        assert_eq!(raw.away.name.as_deref(), Some("Crystal Palace"));
        assert_eq!(raw.home.image.as_deref(), Some("https://static.example/arsenal.png"));
        assert_eq!(raw.score.home.as_deref(), Some("1"));
        assert_eq!(raw.score.away.as_deref(), Some("0"));
        assert_eq!(raw.score.regulation_time.as_deref(), Some("1 - 0"));
        assert_eq!(raw.score.penalties, None);
        assert!(raw.ensure_required().is_ok());
    }

    #[test]
    fn test_parse_information() {
        let raw = parse_match_page(MATCH_PAGE, &item()).unwrap();
        let info: Vec<_> = raw
            .information
            .iter()
            .map(|e| (e.category.as_str(), e.value.as_str()))
            .collect();
        assert_eq!(
            info,
            vec![
                ("Referee", "Taylor A. (Eng)"),
                ("Venue", "Emirates Stadium (London)"),
                ("Attendance", "60 260"),
            ]
        );
    }

    #[test]
    fn test_parse_penalties() {
        let html = r#"
            <div class="detailScore__wrapper"><span>1</span><span class="detailScore__divider">-</span><span>1</span></div>
            <div><span data-testid="wcl-scores-overline-02">Penalties</span><span>4 - 3</span></div>
        "#;
        let raw = parse_match_page(html, &item()).unwrap();
        assert_eq!(raw.score.penalties.as_deref(), Some("4-3"));
    }

    #[test]
    fn test_parse_incidents() {
        let raw = parse_match_page(MATCH_PAGE, &item()).unwrap();
        let incidents = &raw.incidents;
        assert_eq!(incidents.len(), 5);

        let goal = &incidents[0];
        assert_eq!(goal.side, Side::Home);
        assert_eq!(goal.kind.as_deref(), Some("Goal"));
        assert_eq!(goal.minute, "39'");
        assert_eq!(goal.score.as_deref(), Some("1 - 0"));
        assert_eq!(goal.assist.as_deref(), Some("(Saka B.)"));

        let booking = &incidents[1];
        assert_eq!(booking.side, Side::Away);
        assert_eq!(booking.kind.as_deref(), Some("Card"));
        assert_eq!(booking.card.as_deref(), Some("Yellow"));

        let sub = &incidents[2];
        assert_eq!(sub.kind.as_deref(), Some("Substitution"));
        assert_eq!(sub.out_player.as_deref(), Some("Nketiah E."));

        let var = &incidents[3];
        assert_eq!(var.kind.as_deref(), Some("VAR - Disallowed"));
        assert_eq!(var.player.as_deref(), Some("Gyokeres V."));
        assert_eq!(var.assist, None);

        let second_yellow = &incidents[4];
        assert_eq!(second_yellow.card.as_deref(), Some("Yellow/Red"));
        assert_eq!(second_yellow.assist, None);
        assert_eq!(second_yellow.detail.as_deref(), Some("(Not on pitch)"));
    }

    #[test]
    fn test_var_is_matched_as_a_word() {
        let html = r#"
            <div class="smv__participantRow smv__homeParticipant">
              <div class="smv__timeBox">12'</div>
              <div class="smv__incidentHomeScore">1 - 0</div>
              <a class="smv__playerName">Alvarez J.</a>
            </div>
        "#;
        let raw = parse_match_page(html, &item()).unwrap();
        assert_eq!(raw.incidents[0].kind.as_deref(), Some("Goal"));
    }

    #[test]
    fn test_incidents_convert_to_record() {
        let raw = parse_match_page(MATCH_PAGE, &item()).unwrap();
        let record = raw.into_record();
        assert_eq!(record.incidents.len(), 5);
        assert_eq!(record.incidents[1].minute.stoppage, Some(2));
        assert_eq!(record.incidents[0].assist.as_deref(), Some("Saka B."));
    }

    #[test]
    fn test_parse_statistics() {
        let stats = parse_statistics(STATS_PAGE).unwrap();
        assert_eq!(
            stats,
            vec![
                RawStat::new("Ball possession", "58%", "42%"),
                RawStat::new("Passes", "81% (325/400)", "74% (250/338)"),
            ]
        );
    }

    /// Serves fixed HTML; every selector "matches" once, clicks find nothing.
    struct FixturePage {
        html: &'static str,
        rows: u64,
    }

    #[async_trait]
    impl RenderContext for FixturePage {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 1,
            })
        }
        async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
            if script.contains(".length") {
                return Ok(serde_json::json!(self.rows));
            }
            Ok(serde_json::json!(false))
        }
        async fn get_html(&self) -> Result<String> {
            Ok(self.html.to_string())
        }
        async fn get_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    struct FixtureRenderer {
        html: &'static str,
        rows: u64,
    }

    #[async_trait]
    impl Renderer for FixtureRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            Ok(Box::new(FixturePage {
                html: self.html,
                rows: self.rows,
            }))
        }
        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
        fn active_contexts(&self) -> usize {
            0
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn open_pages(&self) -> Result<usize> {
            Ok(0)
        }
        async fn memory_usage(&self) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    fn session(html: &'static str, rows: u64) -> SessionHandle {
        SessionHandle {
            renderer: Arc::new(FixtureRenderer { html, rows }),
            generation: 1,
        }
    }

    fn quick_config() -> ScrapeConfig {
        ScrapeConfig {
            selector_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_discovery_reads_rows() {
        let discovery = FlashscoreDiscovery::new(&quick_config())
            .with_load_pause(Duration::ZERO, Duration::ZERO);
        let items = discovery
            .discover(&session(RESULTS_PAGE, 3), "https://www.flashscore.com/football/england/premier-league/results/")
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_empty_page_is_no_items_found() {
        let discovery = FlashscoreDiscovery::new(&quick_config());
        let err = discovery
            .discover(&session("<html></html>", 0), "https://x.test/results/")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NoItemsFound(_)));
    }

    #[tokio::test]
    async fn test_extractor_without_stats_tab() {
        let extractor = FlashscoreExtractor::new(&quick_config());
        let raw = extractor
            .extract(&session(MATCH_PAGE, 1), &item())
            .await
            .unwrap();
        assert_eq!(raw.home.name.as_deref(), Some("Arsenal"));
        assert_eq!(raw.statistics, PeriodStats::FullTime { stats: Vec::new() });
        assert_eq!(raw.into_record().statistics.full_time().len(), pitchscrape::CATALOG_SIZE);
    }

    #[tokio::test]
    async fn test_extractor_missing_header_is_transient() {
        let extractor = FlashscoreExtractor::new(&quick_config());
        let err = extractor
            .extract(&session(MATCH_PAGE, 0), &item())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_extractor_missing_score_is_permanent() {
        let html = r#"
            <div class="duelParticipant__startTime">01.01.2025 12:00</div>
            <div class="duelParticipant__home"><div class="participant__participantName participant__overflow">A</div></div>
            <div class="duelParticipant__away"><div class="participant__participantName participant__overflow">B</div></div>
        "#;
        let extractor = FlashscoreExtractor::new(&quick_config());
        let err = extractor
            .extract(&session(html, 1), &item())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingField { field: "score.home", .. }));
    }
}
