//! Per-item rejections and skip accounting
//!
//! Every stage reports items it had to leave out as a [`Rejection`] value. Callers
//! fold those into [`SkipCounters`], which are plain values that add together.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use thiserror::Error;

use crate::{GameId, Side, TeamId};

/// Why a single game, team-game or window was left out
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("game {game_id}: expected one box score per side, found {found} box scores")]
    RecordCountMismatch { game_id: GameId, found: usize },

    #[error("game {game_id}: no box score for {team}")]
    MissingSide { game_id: GameId, team: TeamId },

    #[error("{team} window ending at {game_id}: expected arity {expected}, found {found}")]
    ArityMismatch {
        team: TeamId,
        game_id: GameId,
        expected: usize,
        found: usize,
    },

    #[error("game {game_id}: no {side} sequence for {team}")]
    MissingSequence {
        game_id: GameId,
        team: TeamId,
        side: Side,
    },

    #[error(
        "game {game_id}: home sequence is {}x{}, away sequence is {}x{}",
        home.0, home.1, away.0, away.1
    )]
    ShapeMismatch {
        game_id: GameId,
        home: (usize, usize),
        away: (usize, usize),
    },

    #[error("row for game {game_id} filtered: {reason}")]
    FilteredRow { game_id: String, reason: &'static str },

    #[error("row for game {game_id} is malformed: {message}")]
    MalformedRow { game_id: String, message: String },

    #[error("game {game_id}: expected 2 team rows, found {found}")]
    RowCountMismatch { game_id: String, found: usize },

    #[error("game {game_id}: cannot tell home from away")]
    AmbiguousVenue { game_id: String },
}

impl Rejection {
    pub fn reason(&self) -> SkipReason {
        match self {
            Rejection::RecordCountMismatch { .. } => SkipReason::RecordCountMismatch,
            Rejection::MissingSide { .. } => SkipReason::MissingSide,
            Rejection::ArityMismatch { .. } => SkipReason::ArityMismatch,
            Rejection::MissingSequence {
                side: Side::Home, ..
            } => SkipReason::MissingHomeSequence,
            Rejection::MissingSequence {
                side: Side::Away, ..
            } => SkipReason::MissingAwaySequence,
            Rejection::ShapeMismatch { .. } => SkipReason::ShapeMismatch,
            Rejection::FilteredRow { .. } => SkipReason::FilteredRow,
            Rejection::MalformedRow { .. } => SkipReason::MalformedRow,
            Rejection::RowCountMismatch { .. } => SkipReason::RowCountMismatch,
            Rejection::AmbiguousVenue { .. } => SkipReason::AmbiguousVenue,
        }
    }
}

/// Counter key for a [`Rejection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    // Ingestion
    FilteredRow,
    MalformedRow,
    RowCountMismatch,
    AmbiguousVenue,
    // Extraction
    RecordCountMismatch,
    MissingSide,
    // Windowing
    ArityMismatch,
    // Assembly
    MissingHomeSequence,
    MissingAwaySequence,
    ShapeMismatch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::FilteredRow => "filtered_row",
            SkipReason::MalformedRow => "malformed_row",
            SkipReason::RowCountMismatch => "row_count_mismatch",
            SkipReason::AmbiguousVenue => "ambiguous_venue",
            SkipReason::RecordCountMismatch => "record_count_mismatch",
            SkipReason::MissingSide => "missing_side",
            SkipReason::ArityMismatch => "arity_mismatch",
            SkipReason::MissingHomeSequence => "missing_home_sequence",
            SkipReason::MissingAwaySequence => "missing_away_sequence",
            SkipReason::ShapeMismatch => "shape_mismatch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of skipped items by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipCounters {
    counts: BTreeMap<SkipReason, usize>,
}

impl SkipCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a rejection under its reason
    pub fn record(&mut self, rejection: &Rejection) {
        self.increment(rejection.reason());
    }

    pub fn increment(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: SkipReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-zero counts in reason order
    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, usize)> + '_ {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(reason, count)| (*reason, *count))
    }
}

impl AddAssign for SkipCounters {
    fn add_assign(&mut self, other: Self) {
        for (reason, count) in other.counts {
            *self.counts.entry(reason).or_insert(0) += count;
        }
    }
}

impl Add for SkipCounters {
    type Output = SkipCounters;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}

impl fmt::Display for SkipCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sequence_reason_depends_on_side() {
        let home = Rejection::MissingSequence {
            game_id: GameId::new("g1"),
            team: TeamId(1),
            side: Side::Home,
        };
        let away = Rejection::MissingSequence {
            game_id: GameId::new("g1"),
            team: TeamId(2),
            side: Side::Away,
        };
        assert_eq!(home.reason(), SkipReason::MissingHomeSequence);
        assert_eq!(away.reason(), SkipReason::MissingAwaySequence);
    }

    #[test]
    fn test_counters_add() {
        let mut a = SkipCounters::new();
        a.increment(SkipReason::MissingSide);
        a.increment(SkipReason::MissingSide);

        let mut b = SkipCounters::new();
        b.increment(SkipReason::MissingSide);
        b.increment(SkipReason::ShapeMismatch);

        let merged = a.clone() + b;
        assert_eq!(merged.get(SkipReason::MissingSide), 3);
        assert_eq!(merged.get(SkipReason::ShapeMismatch), 1);
        assert_eq!(merged.get(SkipReason::ArityMismatch), 0);
        assert_eq!(merged.total(), 4);
        assert_eq!(a.total(), 2);
    }

    #[test]
    fn test_counters_display_and_json() {
        let mut counters = SkipCounters::new();
        assert_eq!(counters.to_string(), "none");

        counters.increment(SkipReason::MissingAwaySequence);
        counters.increment(SkipReason::MissingHomeSequence);
        assert_eq!(
            counters.to_string(),
            "missing_home_sequence=1, missing_away_sequence=1"
        );

        let json = serde_json::to_string(&counters).unwrap();
        assert_eq!(
            json,
            r#"{"missing_home_sequence":1,"missing_away_sequence":1}"#
        );
    }
}
