//! Ingestion of league game-finder rows
//!
//! The provider returns one row per team per game. Rows are filtered to
//! regular-season league teams, grouped by game id and resolved into a
//! [`GameRecord`] with an explicit home and away side.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::{
    BoxScore, GameId, GameRecord, IngestConfig, Rejection, Result, Side, SkipCounters, TeamId,
};

/// One team's row from the game-finder endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueGameRow {
    #[serde(rename = "SEASON_ID", deserialize_with = "string_or_number")]
    pub season_id: String,
    #[serde(rename = "TEAM_ID")]
    pub team_id: i64,
    #[serde(rename = "TEAM_ABBREVIATION", default)]
    pub team_abbreviation: String,
    #[serde(rename = "GAME_ID", deserialize_with = "string_or_number")]
    pub game_id: String,
    #[serde(rename = "GAME_DATE")]
    pub game_date: String,
    #[serde(rename = "MATCHUP")]
    pub matchup: Option<String>,
    #[serde(rename = "MIN")]
    pub min: Option<f64>,
    #[serde(rename = "PTS")]
    pub pts: Option<f64>,
    #[serde(rename = "FGM")]
    pub fgm: Option<f64>,
    #[serde(rename = "FGA")]
    pub fga: Option<f64>,
    #[serde(rename = "FG3M")]
    pub fg3m: Option<f64>,
    #[serde(rename = "FG3A")]
    pub fg3a: Option<f64>,
    #[serde(rename = "FTM")]
    pub ftm: Option<f64>,
    #[serde(rename = "FTA")]
    pub fta: Option<f64>,
    #[serde(rename = "OREB")]
    pub oreb: Option<f64>,
    #[serde(rename = "DREB")]
    pub dreb: Option<f64>,
    #[serde(rename = "REB")]
    pub reb: Option<f64>,
    #[serde(rename = "AST")]
    pub ast: Option<f64>,
    #[serde(rename = "STL")]
    pub stl: Option<f64>,
    #[serde(rename = "BLK")]
    pub blk: Option<f64>,
    #[serde(rename = "TOV")]
    pub tov: Option<f64>,
    #[serde(rename = "PF")]
    pub pf: Option<f64>,
    #[serde(rename = "PLUS_MINUS")]
    pub plus_minus: Option<f64>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Games built from a batch of rows, plus everything left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Games in (date, game id) order
    pub games: Vec<GameRecord>,
    pub skips: SkipCounters,
}

/// A row that passed filtering, with its side already read from the matchup
#[derive(Debug, Clone)]
struct ParsedRow {
    season: String,
    date: NaiveDate,
    box_score: BoxScore,
}

/// Read a JSON array of rows from disk
pub fn load_rows<P: AsRef<Path>>(path: P) -> Result<Vec<LeagueGameRow>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Filter, group and resolve rows into games
pub fn ingest_rows(rows: &[LeagueGameRow], config: &IngestConfig) -> IngestReport {
    let mut skips = SkipCounters::new();
    let mut grouped: BTreeMap<&str, Vec<ParsedRow>> = BTreeMap::new();

    for row in rows {
        match parse_row(row, config) {
            Ok(parsed) => grouped.entry(row.game_id.as_str()).or_default().push(parsed),
            Err(rejection) => {
                log::debug!("{}", rejection);
                skips.record(&rejection);
            }
        }
    }

    let mut games = Vec::with_capacity(grouped.len());
    for (game_id, entries) in grouped {
        match pair_rows(game_id, entries) {
            Ok(game) => games.push(game),
            Err(rejection) => {
                log::warn!("Skipping {}", rejection);
                skips.record(&rejection);
            }
        }
    }

    games.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    log::info!(
        "Ingested {} games from {} rows (skipped: {})",
        games.len(),
        rows.len(),
        skips
    );

    IngestReport { games, skips }
}

fn parse_row(row: &LeagueGameRow, config: &IngestConfig) -> std::result::Result<ParsedRow, Rejection> {
    let filtered = |reason| Rejection::FilteredRow {
        game_id: row.game_id.clone(),
        reason,
    };

    if !row.season_id.starts_with(config.season_prefix.as_str()) {
        return Err(filtered("not a regular-season game"));
    }
    let matchup = row.matchup.as_deref().ok_or_else(|| filtered("no matchup"))?;
    if !(config.min_team_id..=config.max_team_id).contains(&row.team_id) {
        return Err(filtered("not a league team"));
    }

    let malformed = |message: String| Rejection::MalformedRow {
        game_id: row.game_id.clone(),
        message,
    };
    let stat = |name: &str, value: Option<f64>| {
        value.ok_or_else(|| malformed(format!("missing {}", name)))
    };

    let date = row
        .game_date
        .get(..10)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| malformed(format!("unparsable date {:?}", row.game_date)))?;

    let pts = stat("PTS", row.pts)?;
    if !pts.is_finite() || pts < 0.0 || pts > u16::MAX as f64 {
        return Err(malformed(format!("invalid points {}", pts)));
    }

    let side = if matchup.contains('@') {
        Side::Away
    } else {
        Side::Home
    };

    let box_score = BoxScore {
        team_id: TeamId(row.team_id),
        team_abbreviation: row.team_abbreviation.clone(),
        side,
        pts,
        fgm: stat("FGM", row.fgm)?,
        fga: stat("FGA", row.fga)?,
        fg3m: stat("FG3M", row.fg3m)?,
        fg3a: stat("FG3A", row.fg3a)?,
        ftm: stat("FTM", row.ftm)?,
        fta: stat("FTA", row.fta)?,
        oreb: stat("OREB", row.oreb)?,
        dreb: stat("DREB", row.dreb)?,
        reb: stat("REB", row.reb)?,
        ast: stat("AST", row.ast)?,
        stl: stat("STL", row.stl)?,
        blk: stat("BLK", row.blk)?,
        tov: stat("TOV", row.tov)?,
        pf: stat("PF", row.pf)?,
        plus_minus: stat("PLUS_MINUS", row.plus_minus)?,
        // Unknown minutes are read as a full game downstream
        minutes: row.min.unwrap_or(0.0),
    };

    Ok(ParsedRow {
        season: row.season_id.clone(),
        date,
        box_score,
    })
}

fn pair_rows(game_id: &str, entries: Vec<ParsedRow>) -> std::result::Result<GameRecord, Rejection> {
    if entries.len() != 2 {
        return Err(Rejection::RowCountMismatch {
            game_id: game_id.to_string(),
            found: entries.len(),
        });
    }

    let (home, away): (Vec<ParsedRow>, Vec<ParsedRow>) = entries
        .into_iter()
        .partition(|r| r.box_score.side == Side::Home);

    let (home, away) = match (home.as_slice(), away.as_slice()) {
        ([home], [away]) if home.box_score.team_id != away.box_score.team_id => (home, away),
        _ => {
            return Err(Rejection::AmbiguousVenue {
                game_id: game_id.to_string(),
            })
        }
    };

    Ok(GameRecord {
        game_id: GameId::new(game_id),
        date: home.date,
        season: home.season.clone(),
        home_team: home.box_score.team_id,
        away_team: away.box_score.team_id,
        home_abbreviation: home.box_score.team_abbreviation.clone(),
        away_abbreviation: away.box_score.team_abbreviation.clone(),
        home_score: home.box_score.pts.round() as u16,
        away_score: away.box_score.pts.round() as u16,
        box_scores: vec![home.box_score.clone(), away.box_score.clone()],
    })
}
