//! Export of assembled samples for model training
//!
//! Samples leave the pipeline as parallel arrays, one per field, or as burn
//! tensor batches. Non-finite sequence values are forced to 0.0 on the way out
//! regardless of earlier sanitization.

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::data::dataset::MatchupSample;
use crate::features::TeamSequence;
use crate::{HoopsError, Result};

/// Shape information written alongside the arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub num_samples: usize,
    pub window_size: usize,
    pub num_features: usize,
}

/// Samples as parallel per-field arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArrays {
    /// Home sequences: [N][W][F]
    pub sequence_a: Vec<Vec<Vec<f32>>>,
    /// Away sequences: [N][W][F]
    pub sequence_b: Vec<Vec<Vec<f32>>>,
    /// Home scores: [N][1]
    pub score_a: Vec<[f32; 1]>,
    /// Away scores: [N][1]
    pub score_b: Vec<[f32; 1]>,
    /// Home win label: [N][1]
    pub win_a: Vec<[f32; 1]>,
    pub metadata: ExportMetadata,
}

impl TrainingArrays {
    /// Convert samples to arrays. Every sample must share one shape.
    pub fn from_samples(samples: &[MatchupSample]) -> Result<Self> {
        let (window_size, num_features) = samples.first().map(|s| s.shape()).unwrap_or((0, 0));

        let mut arrays = TrainingArrays {
            sequence_a: Vec::with_capacity(samples.len()),
            sequence_b: Vec::with_capacity(samples.len()),
            score_a: Vec::with_capacity(samples.len()),
            score_b: Vec::with_capacity(samples.len()),
            win_a: Vec::with_capacity(samples.len()),
            metadata: ExportMetadata {
                num_samples: samples.len(),
                window_size,
                num_features,
            },
        };

        for sample in samples {
            for sequence in [&sample.home_sequence, &sample.away_sequence] {
                if sequence.shape() != (window_size, num_features) {
                    return Err(HoopsError::InconsistentShape {
                        game_id: sample.game_id.clone(),
                        expected: (window_size, num_features),
                        found: sequence.shape(),
                    });
                }
            }

            arrays.sequence_a.push(sequence_to_rows(&sample.home_sequence));
            arrays.sequence_b.push(sequence_to_rows(&sample.away_sequence));
            arrays.score_a.push([sample.home_score as f32]);
            arrays.score_b.push([sample.away_score as f32]);
            arrays.win_a.push([sample.home_win as f32]);
        }

        Ok(arrays)
    }

    /// Check that every array agrees with the metadata: N samples of W x F steps
    pub fn validate(&self) -> Result<()> {
        let ExportMetadata {
            num_samples,
            window_size,
            num_features,
        } = self.metadata;
        let invalid = |message: String| Err(HoopsError::Parse(message));

        let lengths = [
            ("sequence_a", self.sequence_a.len()),
            ("sequence_b", self.sequence_b.len()),
            ("score_a", self.score_a.len()),
            ("score_b", self.score_b.len()),
            ("win_a", self.win_a.len()),
        ];
        for (name, len) in lengths {
            if len != num_samples {
                return invalid(format!("{} has {} rows, metadata says {}", name, len, num_samples));
            }
        }

        for (name, sequences) in [("sequence_a", &self.sequence_a), ("sequence_b", &self.sequence_b)] {
            for (i, sequence) in sequences.iter().enumerate() {
                if sequence.len() != window_size {
                    return invalid(format!(
                        "{}[{}] has {} steps, expected {}",
                        name,
                        i,
                        sequence.len(),
                        window_size
                    ));
                }
                if let Some(step) = sequence.iter().find(|step| step.len() != num_features) {
                    return invalid(format!(
                        "{}[{}] has a step of {} features, expected {}",
                        name,
                        i,
                        step.len(),
                        num_features
                    ));
                }
            }
        }

        if let Some(label) = self.win_a.iter().find(|w| w[0] != 0.0 && w[0] != 1.0) {
            return invalid(format!("win_a holds non-binary label {}", label[0]));
        }
        Ok(())
    }
}

fn finite_or_zero(value: f64) -> f32 {
    let v = value as f32;
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn sequence_to_rows(sequence: &TeamSequence) -> Vec<Vec<f32>> {
    sequence
        .steps
        .iter()
        .map(|step| step.values().iter().map(|v| finite_or_zero(*v)).collect())
        .collect()
}

/// Append exactly `window * features` values, zero-filling anything missing
fn flatten_into(sequence: &TeamSequence, window: usize, features: usize, out: &mut Vec<f32>) {
    for t in 0..window {
        let step = sequence.steps.get(t).map(|s| s.values()).unwrap_or(&[]);
        for f in 0..features {
            out.push(step.get(f).copied().map(finite_or_zero).unwrap_or(0.0));
        }
    }
}

/// Destination for exported training arrays
pub trait ExportSink {
    fn export(&mut self, arrays: &TrainingArrays) -> Result<()>;
}

/// Writes training arrays as a single JSON document
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a previously exported file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainingArrays> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl ExportSink for JsonFileSink {
    fn export(&mut self, arrays: &TrainingArrays) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        serde_json::to_writer(BufWriter::new(file), arrays)?;
        log::info!(
            "Exported {} samples ({}x{}) to {}",
            arrays.metadata.num_samples,
            arrays.metadata.window_size,
            arrays.metadata.num_features,
            self.path.display()
        );
        Ok(())
    }
}

/// Batch of matchup samples as tensors
#[derive(Debug, Clone)]
pub struct MatchupBatch<B: Backend> {
    /// Home team sequences: [batch, window, features]
    pub home_sequences: Tensor<B, 3>,
    /// Away team sequences: [batch, window, features]
    pub away_sequences: Tensor<B, 3>,
    /// Home scores: [batch, 1]
    pub home_scores: Tensor<B, 2>,
    /// Away scores: [batch, 1]
    pub away_scores: Tensor<B, 2>,
    /// Home win labels: [batch, 1]
    pub home_win: Tensor<B, 2>,
}

/// Batcher turning samples into [`MatchupBatch`] tensors.
///
/// The window and feature sizes come from the first sample in the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchupBatcher;

impl<B: Backend> Batcher<B, MatchupSample, MatchupBatch<B>> for MatchupBatcher {
    fn batch(&self, items: Vec<MatchupSample>, device: &B::Device) -> MatchupBatch<B> {
        let batch_size = items.len();
        let (window, features) = items.first().map(|s| s.shape()).unwrap_or((0, 0));

        let mut home_data = Vec::with_capacity(batch_size * window * features);
        let mut away_data = Vec::with_capacity(batch_size * window * features);
        let mut home_scores = Vec::with_capacity(batch_size);
        let mut away_scores = Vec::with_capacity(batch_size);
        let mut home_win = Vec::with_capacity(batch_size);

        for sample in &items {
            flatten_into(&sample.home_sequence, window, features, &mut home_data);
            flatten_into(&sample.away_sequence, window, features, &mut away_data);
            home_scores.push(sample.home_score as f32);
            away_scores.push(sample.away_score as f32);
            home_win.push(sample.home_win as f32);
        }

        MatchupBatch {
            home_sequences: Tensor::from_data(
                TensorData::new(home_data, [batch_size, window, features]),
                device,
            ),
            away_sequences: Tensor::from_data(
                TensorData::new(away_data, [batch_size, window, features]),
                device,
            ),
            home_scores: Tensor::from_data(TensorData::new(home_scores, [batch_size, 1]), device),
            away_scores: Tensor::from_data(TensorData::new(away_scores, [batch_size, 1]), device),
            home_win: Tensor::from_data(TensorData::new(home_win, [batch_size, 1]), device),
        }
    }
}
