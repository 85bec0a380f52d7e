//! Data ingestion, storage and export
//!
//! Game-finder rows in, SQLite in the middle, matchup samples out.

pub mod database;
pub mod dataset;
pub mod export;
pub mod ingest;

pub use database::{Database, DatabaseStats, GameFilter};
pub use dataset::{DatasetSummary, MatchupAssembler, MatchupDataset, MatchupSample};
pub use export::{ExportSink, JsonFileSink, MatchupBatch, MatchupBatcher, TrainingArrays};
pub use ingest::{ingest_rows, load_rows, IngestReport, LeagueGameRow};
