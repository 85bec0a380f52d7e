//! SQLite storage for games, per-team features and sequences

use crate::features::{FeatureRow, FeatureVector, TeamSequence};
use crate::{BoxScore, GameId, GameRecord, Result, TeamId};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Selects which games to read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameFilter {
    /// Exact season label
    pub season: Option<String>,
    /// Games on or after this date
    pub from: Option<NaiveDate>,
    /// Games strictly before this date
    pub before: Option<NaiveDate>,
}

impl GameFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    pub fn from(mut self, date: NaiveDate) -> Self {
        self.from = Some(date);
        self
    }

    pub fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(season) = &self.season {
            values.push(season.clone());
            clauses.push(format!("season = ?{}", values.len()));
        }
        if let Some(from) = self.from {
            values.push(from.format(DATE_FORMAT).to_string());
            clauses.push(format!("game_date >= ?{}", values.len()));
        }
        if let Some(before) = self.before {
            values.push(before.format(DATE_FORMAT).to_string());
            clauses.push(format!("game_date < ?{}", values.len()));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                game_id TEXT PRIMARY KEY,
                game_date TEXT NOT NULL,
                season TEXT NOT NULL,
                home_team_id INTEGER NOT NULL,
                away_team_id INTEGER NOT NULL,
                home_team_abbr TEXT NOT NULL,
                away_team_abbr TEXT NOT NULL,
                home_score INTEGER NOT NULL,
                away_score INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS team_features (
                team_id INTEGER NOT NULL,
                game_id TEXT NOT NULL,
                game_date TEXT NOT NULL,
                feature_vector_json TEXT NOT NULL,
                PRIMARY KEY (team_id, game_id)
            );

            CREATE TABLE IF NOT EXISTS team_sequences (
                team_id INTEGER NOT NULL,
                game_id TEXT NOT NULL,
                game_date TEXT NOT NULL,
                game_ids_json TEXT NOT NULL,
                sequence_json TEXT NOT NULL,
                PRIMARY KEY (team_id, game_id)
            );

            CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date, game_id);
            CREATE INDEX IF NOT EXISTS idx_features_team_date
                ON team_features(team_id, game_date, game_id);
            "#,
        )?;
        Ok(())
    }

    /// Drop every table and recreate the empty schema
    pub fn reset(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS team_sequences;
            DROP TABLE IF EXISTS team_features;
            DROP TABLE IF EXISTS games;
            "#,
        )?;
        self.init_schema()?;
        log::info!("Cleared games, features and sequences");
        Ok(())
    }

    // ==================== Games ====================

    /// Insert a game, replacing any previous row with the same id wholesale
    pub fn upsert_game(&self, game: &GameRecord) -> Result<()> {
        Self::upsert_game_on(&self.conn, game)
    }

    /// Insert multiple games in one transaction
    pub fn upsert_games(&self, games: &[GameRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for game in games {
            Self::upsert_game_on(&tx, game)?;
        }
        tx.commit()?;
        Ok(games.len())
    }

    fn upsert_game_on(conn: &Connection, game: &GameRecord) -> Result<()> {
        let raw_json = serde_json::to_string(&game.box_scores)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO games (
                game_id, game_date, season,
                home_team_id, away_team_id,
                home_team_abbr, away_team_abbr,
                home_score, away_score, raw_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                game.game_id.as_str(),
                game.date.format(DATE_FORMAT).to_string(),
                game.season,
                game.home_team.0,
                game.away_team.0,
                game.home_abbreviation,
                game.away_abbreviation,
                game.home_score,
                game.away_score,
                raw_json,
            ],
        )?;
        Ok(())
    }

    /// Games matching `filter`, ordered by (date, game id)
    pub fn get_game_records(&self, filter: &GameFilter) -> Result<Vec<GameRecord>> {
        let (where_clause, values) = filter.where_clause();
        let sql = format!(
            "SELECT game_id, game_date, season, home_team_id, away_team_id,
                    home_team_abbr, away_team_abbr, home_score, away_score, raw_json
             FROM games {}
             ORDER BY game_date, game_id",
            where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let games = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    /// Look up a single game
    pub fn get_game(&self, game_id: &GameId) -> Result<Option<GameRecord>> {
        let game = self
            .conn
            .query_row(
                "SELECT game_id, game_date, season, home_team_id, away_team_id,
                        home_team_abbr, away_team_abbr, home_score, away_score, raw_json
                 FROM games WHERE game_id = ?1",
                params![game_id.as_str()],
                Self::row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
        let date_str: String = row.get(1)?;
        let raw_json: String = row.get(9)?;
        let box_scores: Vec<BoxScore> = parse_json(9, &raw_json)?;

        Ok(GameRecord {
            game_id: GameId(row.get(0)?),
            date: parse_date(1, &date_str)?,
            season: row.get(2)?,
            home_team: TeamId(row.get(3)?),
            away_team: TeamId(row.get(4)?),
            home_abbreviation: row.get(5)?,
            away_abbreviation: row.get(6)?,
            home_score: row.get(7)?,
            away_score: row.get(8)?,
            box_scores,
        })
    }

    // ==================== Feature vectors ====================

    /// Upsert one feature vector keyed by (team, game)
    pub fn put_feature_row(&self, row: &FeatureRow) -> Result<()> {
        Self::put_feature_row_on(&self.conn, row)
    }

    /// Upsert many feature vectors in one transaction
    pub fn put_feature_rows(&self, rows: &[FeatureRow]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for row in rows {
            Self::put_feature_row_on(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn put_feature_row_on(conn: &Connection, row: &FeatureRow) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO team_features
                (team_id, game_id, game_date, feature_vector_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                row.team_id.0,
                row.game_id.as_str(),
                row.game_date.format(DATE_FORMAT).to_string(),
                serde_json::to_string(&row.vector)?,
            ],
        )?;
        Ok(())
    }

    /// A team's feature vectors ordered by (date, game id)
    pub fn get_feature_rows(&self, team_id: TeamId) -> Result<Vec<FeatureRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, game_id, game_date, feature_vector_json
             FROM team_features
             WHERE team_id = ?1
             ORDER BY game_date, game_id",
        )?;
        let rows = stmt
            .query_map(params![team_id.0], |row| {
                let date_str: String = row.get(2)?;
                let json: String = row.get(3)?;
                let vector: FeatureVector = parse_json(3, &json)?;
                Ok(FeatureRow {
                    team_id: TeamId(row.get(0)?),
                    game_id: GameId(row.get(1)?),
                    game_date: parse_date(2, &date_str)?,
                    vector,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Teams that have at least one stored feature vector
    pub fn feature_team_ids(&self) -> Result<Vec<TeamId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT team_id FROM team_features ORDER BY team_id")?;
        let ids = stmt
            .query_map([], |row| Ok(TeamId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ==================== Sequences ====================

    /// Upsert one sequence keyed by (team, terminal game)
    pub fn put_sequence(&self, sequence: &TeamSequence) -> Result<()> {
        Self::put_sequence_on(&self.conn, sequence)
    }

    /// Replace every stored sequence for `team_id` with `sequences`
    pub fn replace_team_sequences(
        &self,
        team_id: TeamId,
        sequences: &[TeamSequence],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM team_sequences WHERE team_id = ?1",
            params![team_id.0],
        )?;
        for sequence in sequences {
            Self::put_sequence_on(&tx, sequence)?;
        }
        tx.commit()?;
        Ok(sequences.len())
    }

    fn put_sequence_on(conn: &Connection, sequence: &TeamSequence) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO team_sequences
                (team_id, game_id, game_date, game_ids_json, sequence_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                sequence.team_id.0,
                sequence.game_id.as_str(),
                sequence.game_date.format(DATE_FORMAT).to_string(),
                serde_json::to_string(&sequence.game_ids)?,
                serde_json::to_string(&sequence.steps)?,
            ],
        )?;
        Ok(())
    }

    /// Sequence for a team ending at a game
    pub fn get_sequence(&self, team_id: TeamId, game_id: &GameId) -> Result<Option<TeamSequence>> {
        let sequence = self
            .conn
            .query_row(
                "SELECT team_id, game_id, game_date, game_ids_json, sequence_json
                 FROM team_sequences WHERE team_id = ?1 AND game_id = ?2",
                params![team_id.0, game_id.as_str()],
                Self::row_to_sequence,
            )
            .optional()?;
        Ok(sequence)
    }

    /// All sequences ordered by (team, date, game id)
    pub fn get_all_sequences(&self) -> Result<Vec<TeamSequence>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, game_id, game_date, game_ids_json, sequence_json
             FROM team_sequences
             ORDER BY team_id, game_date, game_id",
        )?;
        let sequences = stmt
            .query_map([], Self::row_to_sequence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sequences)
    }

    fn row_to_sequence(row: &rusqlite::Row) -> rusqlite::Result<TeamSequence> {
        let date_str: String = row.get(2)?;
        let game_ids_json: String = row.get(3)?;
        let steps_json: String = row.get(4)?;
        Ok(TeamSequence {
            team_id: TeamId(row.get(0)?),
            game_id: GameId(row.get(1)?),
            game_date: parse_date(2, &date_str)?,
            game_ids: parse_json(3, &game_ids_json)?,
            steps: parse_json(4, &steps_json)?,
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let game_count = count("SELECT COUNT(*) FROM games")?;
        let feature_count = count("SELECT COUNT(*) FROM team_features")?;
        let sequence_count = count("SELECT COUNT(*) FROM team_sequences")?;
        let team_count = count(
            "SELECT COUNT(*) FROM (
                SELECT home_team_id FROM games UNION SELECT away_team_id FROM games
             )",
        )?;

        let (min_date, max_date): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(game_date), MAX(game_date) FROM games",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatabaseStats {
            game_count,
            team_count,
            feature_count,
            sequence_count,
            earliest_game: min_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            latest_game: max_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub game_count: usize,
    pub team_count: usize,
    pub feature_count: usize,
    pub sequence_count: usize,
    pub earliest_game: Option<NaiveDate>,
    pub latest_game: Option<NaiveDate>,
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
