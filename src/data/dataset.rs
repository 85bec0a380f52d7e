//! Matchup samples and the burn dataset over them
//!
//! Pairs the home and away teams' sequences ending at a game into one labelled
//! sample. Batch assembly walks games in (date, game id) order and returns the
//! samples together with a per-reason skip tally.

use burn::data::dataset::Dataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::TeamSequence;
use crate::{GameId, GameRecord, Rejection, Side, SkipCounters, TeamId};

/// One training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupSample {
    pub game_id: GameId,
    pub game_date: NaiveDate,
    pub season: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_sequence: TeamSequence,
    pub away_sequence: TeamSequence,
    pub home_score: u16,
    pub away_score: u16,
    /// 1 iff the home side scored strictly more
    pub home_win: u8,
}

impl MatchupSample {
    /// (window length, per-step arity), shared by both sequences
    pub fn shape(&self) -> (usize, usize) {
        self.home_sequence.shape()
    }
}

/// Builds matchup samples from games and team sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchupAssembler;

impl MatchupAssembler {
    pub fn new() -> Self {
        MatchupAssembler
    }

    /// Assemble one sample for `game`.
    ///
    /// Both sequences must be present and share window length and arity.
    pub fn assemble(
        &self,
        game: &GameRecord,
        home_sequence: Option<&TeamSequence>,
        away_sequence: Option<&TeamSequence>,
    ) -> Result<MatchupSample, Rejection> {
        let home = home_sequence.ok_or_else(|| Rejection::MissingSequence {
            game_id: game.game_id.clone(),
            team: game.home_team,
            side: Side::Home,
        })?;
        let away = away_sequence.ok_or_else(|| Rejection::MissingSequence {
            game_id: game.game_id.clone(),
            team: game.away_team,
            side: Side::Away,
        })?;

        if home.shape() != away.shape() {
            return Err(Rejection::ShapeMismatch {
                game_id: game.game_id.clone(),
                home: home.shape(),
                away: away.shape(),
            });
        }

        Ok(MatchupSample {
            game_id: game.game_id.clone(),
            game_date: game.date,
            season: game.season.clone(),
            home_team: game.home_team,
            away_team: game.away_team,
            home_sequence: home.clone(),
            away_sequence: away.clone(),
            home_score: game.home_score,
            away_score: game.away_score,
            home_win: if game.home_won() { 1 } else { 0 },
        })
    }

    /// Assemble every game, skipping and counting the ones that cannot be paired.
    ///
    /// `lookup` returns the sequence a team has for a game, keyed by the terminal
    /// game. Games are visited in (date, game id) order whatever the input order.
    pub fn assemble_all<'a, F>(
        &self,
        games: &[GameRecord],
        mut lookup: F,
    ) -> (Vec<MatchupSample>, SkipCounters)
    where
        F: FnMut(TeamId, &GameId) -> Option<&'a TeamSequence>,
    {
        let mut ordered: Vec<&GameRecord> = games.iter().collect();
        ordered.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        ordered.into_iter().fold(
            (Vec::new(), SkipCounters::new()),
            |(mut samples, mut skips), game| {
                let home = lookup(game.home_team, &game.game_id);
                let away = lookup(game.away_team, &game.game_id);
                match self.assemble(game, home, away) {
                    Ok(sample) => samples.push(sample),
                    Err(rejection) => {
                        log::debug!("Skipping game: {}", rejection);
                        skips.record(&rejection);
                    }
                }
                (samples, skips)
            },
        )
    }
}

/// Summary statistics over a set of samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetSummary {
    pub num_samples: usize,
    pub home_wins: usize,
    pub min_score: u16,
    pub max_score: u16,
}

impl DatasetSummary {
    /// Fraction of samples labelled as a home win
    pub fn home_win_rate(&self) -> f32 {
        if self.num_samples == 0 {
            0.0
        } else {
            self.home_wins as f32 / self.num_samples as f32
        }
    }
}

/// Assembled matchup samples for training
#[derive(Debug, Clone, Default)]
pub struct MatchupDataset {
    samples: Vec<MatchupSample>,
}

impl MatchupDataset {
    pub fn new(samples: Vec<MatchupSample>) -> Self {
        MatchupDataset { samples }
    }

    pub fn samples(&self) -> &[MatchupSample] {
        &self.samples
    }

    /// Window length and arity of the first sample
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.samples.first().map(|s| s.shape())
    }

    pub fn summary(&self) -> DatasetSummary {
        let scores = self
            .samples
            .iter()
            .flat_map(|s| [s.home_score, s.away_score]);
        DatasetSummary {
            num_samples: self.samples.len(),
            home_wins: self.samples.iter().filter(|s| s.home_win == 1).count(),
            min_score: scores.clone().min().unwrap_or(0),
            max_score: scores.max().unwrap_or(0),
        }
    }
}

impl Dataset<MatchupSample> for MatchupDataset {
    fn get(&self, index: usize) -> Option<MatchupSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::sequence::tests::make_rows;
    use crate::features::SequenceBuilder;
    use crate::SkipReason;
    use std::collections::HashMap;

    pub(crate) fn make_sequence(team: i64, game: &str, len: usize, arity: usize) -> TeamSequence {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        TeamSequence {
            team_id: TeamId(team),
            game_id: GameId::new(game),
            game_date: date,
            game_ids: (0..len).map(|i| GameId::new(format!("h{}", i))).collect(),
            steps: vec![crate::features::FeatureVector(vec![1.0; arity]); len],
        }
    }

    pub(crate) fn make_game(id: &str, date: NaiveDate, home: i64, away: i64, hs: u16, aws: u16) -> GameRecord {
        GameRecord {
            game_id: GameId::new(id),
            date,
            season: "22023".to_string(),
            home_team: TeamId(home),
            away_team: TeamId(away),
            home_abbreviation: format!("T{}", home),
            away_abbreviation: format!("T{}", away),
            home_score: hs,
            away_score: aws,
            box_scores: vec![],
        }
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_home_win_label() {
        let game = make_game("g1", jan(15), 1, 2, 110, 108);
        let home = make_sequence(1, "g1", 10, 22);
        let away = make_sequence(2, "g1", 10, 22);

        let sample = MatchupAssembler::new()
            .assemble(&game, Some(&home), Some(&away))
            .unwrap();
        assert_eq!(sample.home_win, 1);
        assert_eq!(sample.home_score, 110);
        assert_eq!(sample.away_score, 108);
        assert_eq!(sample.shape(), (10, 22));
    }

    #[test]
    fn test_tie_is_not_home_win() {
        let game = make_game("g1", jan(15), 1, 2, 100, 100);
        let home = make_sequence(1, "g1", 10, 22);
        let away = make_sequence(2, "g1", 10, 22);

        let sample = MatchupAssembler::new()
            .assemble(&game, Some(&home), Some(&away))
            .unwrap();
        assert_eq!(sample.home_win, 0);

        let loss = make_game("g2", jan(16), 1, 2, 99, 100);
        let sample = MatchupAssembler::new()
            .assemble(&loss, Some(&home), Some(&away))
            .unwrap();
        assert_eq!(sample.home_win, 0);
    }

    #[test]
    fn test_missing_sequences() {
        let game = make_game("g1", jan(15), 1, 2, 110, 108);
        let seq = make_sequence(1, "g1", 10, 22);
        let assembler = MatchupAssembler::new();

        let err = assembler.assemble(&game, None, None).unwrap_err();
        assert_eq!(err.reason(), SkipReason::MissingHomeSequence);

        let err = assembler.assemble(&game, Some(&seq), None).unwrap_err();
        assert_eq!(err.reason(), SkipReason::MissingAwaySequence);
    }

    #[test]
    fn test_shape_mismatch() {
        let game = make_game("g1", jan(15), 1, 2, 110, 108);
        let assembler = MatchupAssembler::new();

        let home = make_sequence(1, "g1", 10, 22);
        let short = make_sequence(2, "g1", 9, 22);
        let err = assembler.assemble(&game, Some(&home), Some(&short)).unwrap_err();
        assert_eq!(
            err,
            Rejection::ShapeMismatch {
                game_id: GameId::new("g1"),
                home: (10, 22),
                away: (9, 22),
            }
        );

        let narrow = make_sequence(2, "g1", 10, 20);
        let err = assembler.assemble(&game, Some(&home), Some(&narrow)).unwrap_err();
        assert_eq!(err.reason(), SkipReason::ShapeMismatch);
    }

    #[test]
    fn test_assemble_all_orders_and_counts() {
        let games = vec![
            make_game("g3", jan(17), 1, 2, 90, 95),
            make_game("g2", jan(16), 1, 3, 101, 99),
            make_game("g1", jan(16), 2, 1, 100, 100),
            make_game("g0", jan(14), 3, 2, 88, 80),
        ];
        let mut index: HashMap<(TeamId, GameId), TeamSequence> = HashMap::new();
        for (team, game) in [(1, "g3"), (2, "g3"), (1, "g2"), (3, "g2"), (2, "g1"), (1, "g1")] {
            index.insert((TeamId(team), GameId::new(game)), make_sequence(team, game, 4, 22));
        }
        // g0 has no away sequence
        index.insert((TeamId(3), GameId::new("g0")), make_sequence(3, "g0", 4, 22));

        let assembler = MatchupAssembler::new();
        let lookup = |team: TeamId, game: &GameId| index.get(&(team, game.clone()));
        let (samples, skips) = assembler.assemble_all(&games, lookup);

        let ids: Vec<&str> = samples.iter().map(|s| s.game_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);
        assert_eq!(
            samples.iter().map(|s| s.home_win).collect::<Vec<_>>(),
            vec![0, 1, 0]
        );
        assert_eq!(skips.get(SkipReason::MissingAwaySequence), 1);
        assert_eq!(skips.total(), 1);

        let lookup = |team: TeamId, game: &GameId| index.get(&(team, game.clone()));
        let (again, again_skips) = assembler.assemble_all(&games, lookup);
        assert_eq!(again, samples);
        assert_eq!(again_skips, skips);
    }

    #[test]
    fn test_short_history_team_blocks_matchup() {
        let builder = SequenceBuilder::new(10).unwrap();
        let team_a = builder.build(TeamId(1), &make_rows(1, 9, 22));
        let team_b = builder.build(TeamId(2), &make_rows(2, 12, 22));
        assert_eq!(team_a.sequences.len(), 0);
        assert_eq!(team_b.sequences.len(), 3);

        let b_last = team_b.sequences.last().unwrap();
        let game = make_game(b_last.game_id.as_str(), b_last.game_date, 1, 2, 105, 99);
        let err = MatchupAssembler::new()
            .assemble(&game, None, Some(b_last))
            .unwrap_err();
        assert_eq!(
            err,
            Rejection::MissingSequence {
                game_id: b_last.game_id.clone(),
                team: TeamId(1),
                side: Side::Home,
            }
        );
    }

    #[test]
    fn test_dataset_summary() {
        let home = make_sequence(1, "g", 3, 22);
        let away = make_sequence(2, "g", 3, 22);
        let assembler = MatchupAssembler::new();
        let samples: Vec<MatchupSample> = [(110, 100), (95, 101), (120, 87), (100, 100)]
            .iter()
            .enumerate()
            .map(|(i, (hs, aws))| {
                let game = make_game(&format!("g{}", i), jan(10 + i as u32), 1, 2, *hs, *aws);
                assembler.assemble(&game, Some(&home), Some(&away)).unwrap()
            })
            .collect();

        let dataset = MatchupDataset::new(samples);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.shape(), Some((3, 22)));

        let summary = dataset.summary();
        assert_eq!(summary.home_wins, 2);
        assert_eq!(summary.min_score, 87);
        assert_eq!(summary.max_score, 120);
        assert!((summary.home_win_rate() - 0.5).abs() < 1e-6);
        assert_eq!(dataset.get(3).unwrap().game_id, GameId::new("g3"));
    }
}
