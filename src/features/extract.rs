//! Per-team, per-game feature extraction from box scores
//!
//! Each game yields one feature vector per side: twenty box-score derived
//! statistics followed by the home and win indicators.

use serde::{Deserialize, Serialize};

use crate::{BoxScore, GameRecord, Rejection, Side, TeamId};

/// Regulation game length in minutes
pub const GAME_MINUTES: f64 = 48.0;

/// Divide, returning 0.0 when the denominator is zero or either operand is NaN
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || denominator.is_nan() || numerator.is_nan() {
        return 0.0;
    }
    numerator / denominator
}

/// Possession estimate for one team: FGA + 0.4*FTA - OREB + TOV
pub fn possessions(box_score: &BoxScore) -> f64 {
    box_score.fga + 0.4 * box_score.fta - box_score.oreb + box_score.tov
}

/// Ordered numeric features for one team in one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    /// Arity of the reference schema (20 statistics + home + win)
    pub const ARITY: usize = GameFeatures::DIM + 2;

    /// Build a vector, replacing NaN and infinities with 0.0
    pub fn sanitized(values: Vec<f64>) -> Self {
        FeatureVector(
            values
                .into_iter()
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect(),
        )
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Box-score statistics for one team, from its own perspective
#[derive(Debug, Clone, PartialEq)]
pub struct GameFeatures {
    // Shooting / scoring
    pub pts: f64,
    pub fg_pct: f64,
    pub fg3_pct: f64,
    pub ft_pct: f64,
    /// (FGM + 0.5 * 3PM) / FGA
    pub efg_pct: f64,
    /// PTS / (2 * (FGA + 0.44 * FTA))
    pub ts_pct: f64,

    // Volume
    pub fga: f64,
    pub fg3a: f64,
    pub fta: f64,
    pub ast: f64,
    pub tov: f64,

    // Rebounding
    pub oreb: f64,
    pub dreb: f64,
    pub reb: f64,

    // Defense
    pub stl: f64,
    pub blk: f64,
    pub pf: f64,

    // Pace
    /// Average of both teams' possession estimates
    pub poss: f64,
    /// Possessions scaled to a 48 minute game
    pub pace: f64,

    pub plus_minus: f64,
}

impl GameFeatures {
    /// Number of statistical fields (before the home/win indicators)
    pub const DIM: usize = 20;

    /// Derive features for `team` against `opponent`
    pub fn from_box_scores(team: &BoxScore, opponent: &BoxScore) -> Self {
        let minutes = if team.minutes == 0.0 || team.minutes.is_nan() {
            GAME_MINUTES
        } else {
            team.minutes
        };

        let efg_pct = if team.fga > 0.0 {
            safe_divide(team.fgm + 0.5 * team.fg3m, team.fga)
        } else {
            0.0
        };

        let ts_denominator = team.fga + 0.44 * team.fta;
        let ts_pct = if ts_denominator > 0.0 {
            safe_divide(team.pts, 2.0 * ts_denominator)
        } else {
            0.0
        };

        let poss = 0.5 * (possessions(team) + possessions(opponent));
        let pace = if minutes > 0.0 {
            poss * (GAME_MINUTES / minutes)
        } else {
            0.0
        };

        GameFeatures {
            pts: team.pts,
            fg_pct: safe_divide(team.fgm, team.fga),
            fg3_pct: safe_divide(team.fg3m, team.fg3a),
            ft_pct: safe_divide(team.ftm, team.fta),
            efg_pct,
            ts_pct,
            fga: team.fga,
            fg3a: team.fg3a,
            fta: team.fta,
            ast: team.ast,
            tov: team.tov,
            oreb: team.oreb,
            dreb: team.dreb,
            reb: team.reb,
            stl: team.stl,
            blk: team.blk,
            pf: team.pf,
            poss,
            pace,
            plus_minus: team.plus_minus,
        }
    }

    /// Statistical fields in schema order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.pts,
            self.fg_pct,
            self.fg3_pct,
            self.ft_pct,
            self.efg_pct,
            self.ts_pct,
            self.fga,
            self.fg3a,
            self.fta,
            self.ast,
            self.tov,
            self.oreb,
            self.dreb,
            self.reb,
            self.stl,
            self.blk,
            self.pf,
            self.poss,
            self.pace,
            self.plus_minus,
        ]
    }

    /// Full feature vector with the caller-supplied context flags appended
    pub fn to_vector(&self, is_home: bool, won: bool) -> FeatureVector {
        let mut values = self.to_vec();
        values.push(if is_home { 1.0 } else { 0.0 });
        values.push(if won { 1.0 } else { 0.0 });
        FeatureVector::sanitized(values)
    }
}

/// Extract statistics for `side_team` against `opponent_team` in `game`.
///
/// The game must carry exactly two box scores, one tagged for each side, and the
/// two teams must be distinct owners of them.
pub fn extract(
    game: &GameRecord,
    side_team: TeamId,
    opponent_team: TeamId,
) -> Result<GameFeatures, Rejection> {
    match game.box_scores.as_slice() {
        [a, b] if a.side != b.side => {}
        _ => {
            return Err(Rejection::RecordCountMismatch {
                game_id: game.game_id.clone(),
                found: game.box_scores.len(),
            })
        }
    }

    let missing = |team| Rejection::MissingSide {
        game_id: game.game_id.clone(),
        team,
    };
    if side_team == opponent_team {
        return Err(missing(opponent_team));
    }
    let team_idx = game
        .box_scores
        .iter()
        .position(|b| b.team_id == side_team)
        .ok_or_else(|| missing(side_team))?;
    let opponent_idx = game
        .box_scores
        .iter()
        .enumerate()
        .find(|(i, b)| *i != team_idx && b.team_id == opponent_team)
        .map(|(i, _)| i)
        .ok_or_else(|| missing(opponent_team))?;
    let team = &game.box_scores[team_idx];
    let opponent = &game.box_scores[opponent_idx];

    Ok(GameFeatures::from_box_scores(team, opponent).sanitized())
}

/// Extract the full feature vector for the team playing on `side`.
///
/// The home flag comes from the box score's side tag, the win flag from the final
/// scores.
pub fn extract_side(game: &GameRecord, side: Side) -> Result<FeatureVector, Rejection> {
    let team = game.team_on(side);
    let opponent = game.team_on(side.opposite());
    let features = extract(game, team, opponent)?;

    let is_home = game
        .box_score(team)
        .map(|b| b.side == Side::Home)
        .unwrap_or(side == Side::Home);
    let won = game.score_on(side) > game.score_on(side.opposite());

    Ok(features.to_vector(is_home, won))
}

impl GameFeatures {
    /// Same features with every non-finite field replaced by 0.0
    pub fn sanitized(self) -> Self {
        let clean = FeatureVector::sanitized(self.to_vec());
        Self::from_slice(clean.values()).unwrap_or(self)
    }

    /// Rebuild from the first [`GameFeatures::DIM`] values of a slice
    pub fn from_slice(v: &[f64]) -> Option<Self> {
        if v.len() < Self::DIM {
            return None;
        }
        Some(GameFeatures {
            pts: v[0],
            fg_pct: v[1],
            fg3_pct: v[2],
            ft_pct: v[3],
            efg_pct: v[4],
            ts_pct: v[5],
            fga: v[6],
            fg3a: v[7],
            fta: v[8],
            ast: v[9],
            tov: v[10],
            oreb: v[11],
            dreb: v[12],
            reb: v[13],
            stl: v[14],
            blk: v[15],
            pf: v[16],
            poss: v[17],
            pace: v[18],
            plus_minus: v[19],
        })
    }
}
