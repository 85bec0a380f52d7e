//! Rolling game-history windows per team
//!
//! A team's feature rows, already in (date, game id) order, are cut into
//! overlapping windows of `window_size` games. Each window is keyed by its last
//! game and includes that game's own stats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::FeatureVector;
use crate::{GameId, HoopsError, Rejection, Result, SkipCounters, TeamId};

/// A stored feature vector for one team in one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub team_id: TeamId,
    pub game_id: GameId,
    pub game_date: NaiveDate,
    pub vector: FeatureVector,
}

/// Fixed-length window of consecutive games for one team, ending at `game_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSequence {
    pub team_id: TeamId,
    /// Terminal game of the window
    pub game_id: GameId,
    pub game_date: NaiveDate,
    /// Games in the window, oldest first
    pub game_ids: Vec<GameId>,
    pub steps: Vec<FeatureVector>,
}

impl TeamSequence {
    /// Number of games in the window
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Per-step arity (0 for an empty sequence)
    pub fn arity(&self) -> usize {
        self.steps.first().map(|s| s.arity()).unwrap_or(0)
    }

    /// (window length, per-step arity)
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.arity())
    }
}

/// Result of windowing one team's history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceBuild {
    /// Sequences in ascending terminal-game order
    pub sequences: Vec<TeamSequence>,
    pub skips: SkipCounters,
}

/// Builds rolling windows over a team's ordered feature rows
#[derive(Debug, Clone, Copy)]
pub struct SequenceBuilder {
    window_size: usize,
}

impl SequenceBuilder {
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(HoopsError::Config(
                "window size must be at least 1".to_string(),
            ));
        }
        Ok(SequenceBuilder { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Build every full window for `team_id`.
    ///
    /// `rows` must already be ordered by (date, game id); they are not re-sorted.
    /// Fewer rows than the window size yields an empty build.
    pub fn build(&self, team_id: TeamId, rows: &[FeatureRow]) -> SequenceBuild {
        let mut build = SequenceBuild::default();

        for window in rows.windows(self.window_size) {
            match self.build_window(team_id, window) {
                Ok(sequence) => build.sequences.push(sequence),
                Err(rejection) => {
                    log::warn!("Skipping window: {}", rejection);
                    build.skips.record(&rejection);
                }
            }
        }

        build
    }

    fn build_window(
        &self,
        team_id: TeamId,
        window: &[FeatureRow],
    ) -> std::result::Result<TeamSequence, Rejection> {
        // windows() never yields an empty slice
        let last = &window[window.len() - 1];
        let expected = window[0].vector.arity();

        if let Some(odd) = window.iter().find(|r| r.vector.arity() != expected) {
            return Err(Rejection::ArityMismatch {
                team: team_id,
                game_id: last.game_id.clone(),
                expected,
                found: odd.vector.arity(),
            });
        }

        Ok(TeamSequence {
            team_id,
            game_id: last.game_id.clone(),
            game_date: last.game_date,
            game_ids: window.iter().map(|r| r.game_id.clone()).collect(),
            steps: window.iter().map(|r| r.vector.clone()).collect(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::SkipReason;

    pub(crate) fn make_rows(team: i64, count: usize, arity: usize) -> Vec<FeatureRow> {
        let start = NaiveDate::from_ymd_opt(2023, 10, 24).unwrap();
        (0..count)
            .map(|i| FeatureRow {
                team_id: TeamId(team),
                game_id: GameId::new(format!("00223{:05}", i)),
                game_date: start + chrono::Duration::days(2 * i as i64),
                vector: FeatureVector(vec![i as f64; arity]),
            })
            .collect()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(SequenceBuilder::new(0).is_err());
    }

    #[test]
    fn test_short_history_yields_nothing() {
        let builder = SequenceBuilder::new(10).unwrap();
        let build = builder.build(TeamId(1), &make_rows(1, 9, 22));
        assert!(build.sequences.is_empty());
        assert!(build.skips.is_empty());

        let empty = builder.build(TeamId(1), &[]);
        assert!(empty.sequences.is_empty());
    }

    #[test]
    fn test_exact_window_is_whole_history() {
        let builder = SequenceBuilder::new(10).unwrap();
        let rows = make_rows(1, 10, 22);
        let build = builder.build(TeamId(1), &rows);

        assert_eq!(build.sequences.len(), 1);
        let seq = &build.sequences[0];
        assert_eq!(seq.game_id, rows[9].game_id);
        assert_eq!(seq.game_date, rows[9].game_date);
        assert_eq!(
            seq.steps,
            rows.iter().map(|r| r.vector.clone()).collect::<Vec<_>>()
        );
        assert_eq!(seq.shape(), (10, 22));
    }

    #[test]
    fn test_rolling_windows_include_terminal_game() {
        let builder = SequenceBuilder::new(10).unwrap();
        let rows = make_rows(1, 12, 22);
        let build = builder.build(TeamId(1), &rows);

        assert_eq!(build.sequences.len(), 12 - 10 + 1);
        for (k, seq) in build.sequences.iter().enumerate() {
            let terminal = k + 9;
            assert_eq!(seq.len(), 10);
            assert_eq!(seq.game_id, rows[terminal].game_id);
            assert_eq!(seq.game_ids.first(), Some(&rows[k].game_id));
            assert_eq!(seq.steps.last(), Some(&rows[terminal].vector));
        }
        assert!(build
            .sequences
            .windows(2)
            .all(|w| w[0].game_date < w[1].game_date));
    }

    #[test]
    fn test_arity_mismatch_skips_only_affected_windows() {
        let builder = SequenceBuilder::new(10).unwrap();
        let mut rows = make_rows(1, 12, 22);
        rows[11].vector = FeatureVector(vec![0.0; 21]);

        let build = builder.build(TeamId(1), &rows);
        assert_eq!(build.sequences.len(), 2);
        assert_eq!(build.skips.get(SkipReason::ArityMismatch), 1);
        assert_eq!(build.sequences[1].game_id, rows[10].game_id);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = SequenceBuilder::new(3).unwrap();
        let rows = make_rows(7, 8, 22);
        let first = builder.build(TeamId(7), &rows);
        let second = builder.build(TeamId(7), &rows);
        assert_eq!(first, second);
        assert_eq!(first.sequences.len(), 6);
    }
}
