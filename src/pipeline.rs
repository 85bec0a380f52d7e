//! End-to-end sample preparation
//!
//! Each stage reads its input from the store, writes its output back and returns a
//! report with its own skip counters. `run` chains them and exports the result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::data::database::{Database, GameFilter};
use crate::data::dataset::{DatasetSummary, MatchupAssembler, MatchupDataset};
use crate::data::export::{ExportSink, JsonFileSink, TrainingArrays};
use crate::data::ingest::{ingest_rows, load_rows, IngestReport};
use crate::features::{extract_side, FeatureRow, SequenceBuilder, TeamSequence};
use crate::{Config, GameId, HoopsError, IngestConfig, Result, Side, SkipCounters, TeamId};

/// Outcome of feature extraction over stored games
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    /// (team, game) feature vectors written
    pub inserted: usize,
    pub skips: SkipCounters,
}

/// Outcome of windowing every team's feature history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub teams_with_sequences: usize,
    /// Teams with too few games for a single window
    pub teams_skipped: usize,
    pub sequences: usize,
    pub skips: SkipCounters,
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Games stored by the ingest stage, if an input file was given
    pub games_ingested: Option<usize>,
    pub extraction: ExtractionReport,
    pub sequences: SequenceReport,
    pub summary: DatasetSummary,
    /// Skips from every stage added together
    pub skips: SkipCounters,
}

/// Load provider rows from `path`, resolve them into games and store them
pub fn ingest_file<P: AsRef<Path>>(
    db: &Database,
    path: P,
    config: &IngestConfig,
) -> Result<IngestReport> {
    let path = path.as_ref();
    log::info!("Loading game rows from {}", path.display());
    let rows = load_rows(path)?;
    let report = ingest_rows(&rows, config);
    db.upsert_games(&report.games)?;
    Ok(report)
}

/// Extract a feature vector for both sides of every selected game
pub fn extract_all(db: &Database, filter: &GameFilter) -> Result<ExtractionReport> {
    let games = db.get_game_records(filter)?;
    let mut rows = Vec::with_capacity(games.len() * 2);
    let mut skips = SkipCounters::new();

    for game in &games {
        for side in [Side::Home, Side::Away] {
            match extract_side(game, side) {
                Ok(vector) => rows.push(FeatureRow {
                    team_id: game.team_on(side),
                    game_id: game.game_id.clone(),
                    game_date: game.date,
                    vector,
                }),
                Err(rejection) => {
                    log::debug!("Skipping {} side: {}", side, rejection);
                    skips.record(&rejection);
                }
            }
        }
    }

    let inserted = db.put_feature_rows(&rows)?;
    log::info!(
        "Extracted {} feature vectors from {} games (skipped: {})",
        inserted,
        games.len(),
        skips
    );

    Ok(ExtractionReport { inserted, skips })
}

/// Rebuild every team's sequences from its stored feature vectors
pub fn build_all_sequences(db: &Database, window_size: usize) -> Result<SequenceReport> {
    let builder = SequenceBuilder::new(window_size)?;
    let mut report = SequenceReport::default();

    for team in db.feature_team_ids()? {
        let rows = db.get_feature_rows(team)?;
        let build = builder.build(team, &rows);

        if build.sequences.is_empty() {
            log::debug!(
                "{} has {} games, fewer than a full window of {}",
                team,
                rows.len(),
                window_size
            );
            report.teams_skipped += 1;
        } else {
            report.teams_with_sequences += 1;
        }

        report.sequences += db.replace_team_sequences(team, &build.sequences)?;
        report.skips += build.skips;
    }

    log::info!(
        "Built {} sequences of {} games for {} teams ({} teams without enough games, skipped: {})",
        report.sequences,
        builder.window_size(),
        report.teams_with_sequences,
        report.teams_skipped,
        report.skips
    );
    Ok(report)
}

/// Pair stored sequences into labelled samples for every selected game.
///
/// Fails with [`HoopsError::EmptyBatch`] when no game produces a sample.
pub fn build_dataset(db: &Database, filter: &GameFilter) -> Result<(MatchupDataset, SkipCounters)> {
    let games = db.get_game_records(filter)?;
    let by_key: HashMap<(TeamId, GameId), TeamSequence> = db
        .get_all_sequences()?
        .into_iter()
        .map(|s| ((s.team_id, s.game_id.clone()), s))
        .collect();

    let (samples, skips) = MatchupAssembler::new()
        .assemble_all(&games, |team, game_id| by_key.get(&(team, game_id.clone())));

    if samples.is_empty() {
        return Err(HoopsError::EmptyBatch {
            skipped: skips.total(),
        });
    }

    log::info!(
        "Assembled {} samples from {} games (skipped: {})",
        samples.len(),
        games.len(),
        skips
    );
    Ok((MatchupDataset::new(samples), skips))
}

/// Run every stage and write the training arrays to `config.data.output_path`
pub fn run(db: &Database, config: &Config, input: Option<&Path>) -> Result<PipelineReport> {
    let mut sink = JsonFileSink::new(PathBuf::from(&config.data.output_path));
    run_with_sink(db, config, input, &mut sink)
}

/// Run every stage and hand the training arrays to `sink`
pub fn run_with_sink<S: ExportSink>(
    db: &Database,
    config: &Config,
    input: Option<&Path>,
    sink: &mut S,
) -> Result<PipelineReport> {
    config.validate()?;
    let mut skips = SkipCounters::new();

    let games_ingested = match input {
        Some(path) => {
            let report = ingest_file(db, path, &config.ingest)?;
            skips += report.skips;
            Some(report.games.len())
        }
        None => None,
    };

    let filter = GameFilter::all();
    let extraction = extract_all(db, &filter)?;
    skips += extraction.skips.clone();

    let sequences = build_all_sequences(db, config.pipeline.window_size)?;
    skips += sequences.skips.clone();

    let (dataset, dataset_skips) = build_dataset(db, &filter)?;
    skips += dataset_skips;

    let arrays = TrainingArrays::from_samples(dataset.samples())?;
    sink.export(&arrays)?;

    let summary = dataset.summary();
    log::info!(
        "Pipeline produced {} samples, home win rate {:.3} (skipped {}: {})",
        summary.num_samples,
        summary.home_win_rate(),
        skips.total(),
        skips
    );

    Ok(PipelineReport {
        games_ingested,
        extraction,
        sequences,
        summary,
        skips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ingest::tests::make_row;
    use crate::data::ingest::LeagueGameRow;
    use crate::SkipReason;

    const TEAMS: [(i64, &str); 3] = [(1610612737, "ATL"), (1610612738, "BOS"), (1610612739, "CLE")];

    /// Nine games rotating A-B, B-C, C-A; each team plays six
    fn season_rows() -> Vec<LeagueGameRow> {
        let mut rows = Vec::new();
        for i in 0..9usize {
            let (home, home_abbr) = TEAMS[i % 3];
            let (away, away_abbr) = TEAMS[(i + 1) % 3];
            let game = format!("00223{:05}", i);
            let date = format!("2023-11-{:02}", i + 1);
            rows.push(make_row(
                &game,
                &date,
                home,
                home_abbr,
                &format!("{} vs. {}", home_abbr, away_abbr),
                100.0 + i as f64,
            ));
            rows.push(make_row(
                &game,
                &date,
                away,
                away_abbr,
                &format!("{} @ {}", away_abbr, home_abbr),
                105.0 - i as f64,
            ));
        }
        rows
    }

    fn seeded_db(config: &Config) -> Database {
        let db = Database::in_memory().unwrap();
        let report = ingest_rows(&season_rows(), &config.ingest);
        db.upsert_games(&report.games).unwrap();
        db
    }

    fn test_config(window_size: usize) -> Config {
        let mut config = Config::default();
        config.pipeline.window_size = window_size;
        config
    }

    #[test]
    fn test_stages() {
        let config = test_config(3);
        let db = seeded_db(&config);

        let extraction = extract_all(&db, &GameFilter::all()).unwrap();
        assert_eq!(extraction.inserted, 18);
        assert!(extraction.skips.is_empty());

        let sequences = build_all_sequences(&db, 3).unwrap();
        assert_eq!(sequences.teams_with_sequences, 3);
        assert_eq!(sequences.teams_skipped, 0);
        assert_eq!(sequences.sequences, 12);

        let (dataset, skips) = build_dataset(&db, &GameFilter::all()).unwrap();
        // Games 0-2 come before the home team's third game
        assert_eq!(dataset.samples().len(), 6);
        assert_eq!(skips.get(SkipReason::MissingHomeSequence), 3);
        assert_eq!(skips.total(), 3);
        assert_eq!(dataset.shape(), Some((3, 22)));
        assert_eq!(dataset.samples()[0].game_id.as_str(), "0022300003");
    }

    #[test]
    fn test_extraction_skips_broken_games() {
        let config = test_config(3);
        let db = seeded_db(&config);
        let mut game = db.get_game(&GameId::new("0022300000")).unwrap().unwrap();
        game.box_scores.truncate(1);
        db.upsert_game(&game).unwrap();

        let extraction = extract_all(&db, &GameFilter::all()).unwrap();
        assert_eq!(extraction.inserted, 16);
        assert_eq!(extraction.skips.get(SkipReason::RecordCountMismatch), 2);
    }

    #[test]
    fn test_short_history_is_empty_batch() {
        let config = test_config(10);
        let db = seeded_db(&config);
        extract_all(&db, &GameFilter::all()).unwrap();

        let sequences = build_all_sequences(&db, 10).unwrap();
        assert_eq!(sequences.sequences, 0);
        assert_eq!(sequences.teams_skipped, 3);

        let err = build_dataset(&db, &GameFilter::all()).unwrap_err();
        assert!(matches!(err, HoopsError::EmptyBatch { skipped: 9 }));
    }

    #[test]
    fn test_rebuild_clears_stale_sequences() {
        let config = test_config(3);
        let db = seeded_db(&config);
        extract_all(&db, &GameFilter::all()).unwrap();
        build_all_sequences(&db, 3).unwrap();

        let report = build_all_sequences(&db, 5).unwrap();
        assert_eq!(report.sequences, 6);
        assert_eq!(db.get_stats().unwrap().sequence_count, 6);
    }

    #[test]
    fn test_reset_drops_earlier_ingest() {
        let config = test_config(3);
        let db = seeded_db(&config);
        extract_all(&db, &GameFilter::all()).unwrap();
        build_all_sequences(&db, 3).unwrap();
        let (before, _) = build_dataset(&db, &GameFilter::all()).unwrap();
        assert_eq!(before.samples().len(), 6);

        // A later batch holding only the first six games
        db.reset().unwrap();
        let rows: Vec<LeagueGameRow> = season_rows().into_iter().take(12).collect();
        db.upsert_games(&ingest_rows(&rows, &config.ingest).games).unwrap();
        extract_all(&db, &GameFilter::all()).unwrap();
        build_all_sequences(&db, 3).unwrap();

        let (after, _) = build_dataset(&db, &GameFilter::all()).unwrap();
        assert_eq!(after.samples().len(), 3);
        assert!(after
            .samples()
            .iter()
            .all(|s| s.game_id.as_str() < "0022300006"));
    }

    #[test]
    fn test_run_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("games.json");
        std::fs::write(&input, serde_json::to_string(&season_rows()).unwrap()).unwrap();

        let mut config = test_config(3);
        config.data.output_path = dir
            .path()
            .join("out")
            .join("training_data.json")
            .to_string_lossy()
            .into_owned();
        let db = Database::in_memory().unwrap();

        let first = run(&db, &config, Some(input.as_path())).unwrap();
        let exported = JsonFileSink::load(&config.data.output_path).unwrap();
        let second = run(&db, &config, Some(input.as_path())).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.games_ingested, Some(9));
        assert_eq!(first.summary.num_samples, 6);
        assert_eq!(first.skips.get(SkipReason::MissingHomeSequence), 3);
        assert_eq!(exported.metadata.num_samples, 6);
        assert_eq!(exported.metadata.window_size, 3);
        assert_eq!(exported.metadata.num_features, 22);
        assert_eq!(JsonFileSink::load(&config.data.output_path).unwrap(), exported);
    }
}
