//! NBA matchup sample preparation
//!
//! Turns per-team box scores into rolling game-history sequences and pairs two
//! teams' sequences into labelled training samples for win prediction.

pub mod data;
pub mod features;
pub mod pipeline;
pub mod skips;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use skips::{Rejection, SkipCounters, SkipReason};

/// Unique identifier for a team (league franchise id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

/// Unique identifier for a game, as issued by the stats provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two participants in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "home"),
            Side::Away => write!(f, "away"),
        }
    }
}

/// Raw box score for one team in one game.
///
/// The side tag is resolved once at ingestion and is authoritative from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxScore {
    pub team_id: TeamId,
    pub team_abbreviation: String,
    pub side: Side,
    pub pts: f64,
    pub fgm: f64,
    pub fga: f64,
    pub fg3m: f64,
    pub fg3a: f64,
    pub ftm: f64,
    pub fta: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub reb: f64,
    pub ast: f64,
    pub stl: f64,
    pub blk: f64,
    pub tov: f64,
    pub pf: f64,
    pub plus_minus: f64,
    /// Minutes played; zero or NaN means "unknown" and is read as a full game
    pub minutes: f64,
}

/// A completed game with both teams' box scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub season: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_abbreviation: String,
    pub away_abbreviation: String,
    pub home_score: u16,
    pub away_score: u16,
    pub box_scores: Vec<BoxScore>,
}

impl GameRecord {
    /// Ordering key used everywhere games are walked chronologically
    pub fn sort_key(&self) -> (NaiveDate, &GameId) {
        (self.date, &self.game_id)
    }

    /// True only for a strict home win; equal scores count as a non-home win
    pub fn home_won(&self) -> bool {
        self.home_score > self.away_score
    }

    /// Returns the score margin (positive = home win)
    pub fn margin(&self) -> i32 {
        self.home_score as i32 - self.away_score as i32
    }

    /// Which side the given team played on
    pub fn side_of(&self, team: TeamId) -> Option<Side> {
        if team == self.home_team {
            Some(Side::Home)
        } else if team == self.away_team {
            Some(Side::Away)
        } else {
            None
        }
    }

    /// Team that played on the given side
    pub fn team_on(&self, side: Side) -> TeamId {
        match side {
            Side::Home => self.home_team,
            Side::Away => self.away_team,
        }
    }

    /// Final score for the given side
    pub fn score_on(&self, side: Side) -> u16 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }

    /// Box score belonging to a team, if present
    pub fn box_score(&self, team: TeamId) -> Option<&BoxScore> {
        self.box_scores.iter().find(|b| b.team_id == team)
    }
}

/// Application-wide errors.
///
/// Per-item problems are [`Rejection`]s and never surface here; these abort a run.
#[derive(Debug, Error)]
pub enum HoopsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Samples disagree on shape: expected {expected:?}, game {game_id} has {found:?}")]
    InconsistentShape {
        game_id: GameId,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("No matchup samples produced ({skipped} games skipped)")]
    EmptyBatch { skipped: usize },
}

pub type Result<T> = std::result::Result<T, HoopsError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of consecutive games per sequence
    pub window_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Season id prefix marking regular-season games ("2" on the provider)
    pub season_prefix: String,
    /// Inclusive franchise id range; anything outside is not a league team
    pub min_team_id: i64,
    pub max_team_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub output_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pipeline: PipelineConfig { window_size: 10 },
            ingest: IngestConfig {
                season_prefix: "2".to_string(),
                min_team_id: 1610612737,
                max_team_id: 1610612766,
            },
            data: DataConfig {
                database_path: "data/database/nba.db".to_string(),
                output_path: "data/processed/training_data.json".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HoopsError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| HoopsError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HoopsError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.window_size == 0 {
            return Err(HoopsError::Config(
                "pipeline.window_size must be at least 1".to_string(),
            ));
        }
        if self.ingest.min_team_id > self.ingest.max_team_id {
            return Err(HoopsError::Config(format!(
                "ingest team id range is empty: {}..={}",
                self.ingest.min_team_id, self.ingest.max_team_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_won_treats_tie_as_loss() {
        let mut game = GameRecord {
            game_id: GameId::new("0022300001"),
            date: NaiveDate::from_ymd_opt(2023, 10, 24).unwrap(),
            season: "22023".to_string(),
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_abbreviation: "DEN".to_string(),
            away_abbreviation: "LAL".to_string(),
            home_score: 110,
            away_score: 108,
            box_scores: vec![],
        };
        assert!(game.home_won());
        assert_eq!(game.margin(), 2);

        game.away_score = 110;
        assert!(!game.home_won());
        assert_eq!(game.side_of(TeamId(2)), Some(Side::Away));
        assert_eq!(game.side_of(TeamId(3)), None);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.pipeline.window_size = 5;
        config.save(path).unwrap();

        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_rejects_zero_window() {
        let mut config = Config::default();
        config.pipeline.window_size = 0;
        assert!(matches!(config.validate(), Err(HoopsError::Config(_))));
    }
}
