//! Feature extraction and sequence windowing
//!
//! Converts box scores into per-game feature vectors and per-team history windows.

pub mod extract;
pub mod sequence;

pub use extract::{extract, extract_side, FeatureVector, GameFeatures};
pub use sequence::{FeatureRow, SequenceBuild, SequenceBuilder, TeamSequence};
