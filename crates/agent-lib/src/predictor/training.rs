//! Full training pipeline
//!
//! load dataset → fit scaler on every row → shuffle and split fit/holdout
//! → grow forest on the fit split → score holdout → persist both artifacts.
//!
//! The holdout score is reported but never gates persistence: a completed
//! run always overwrites the artifacts.

use super::artifacts::{ArtifactPair, ArtifactStore};
use super::forest::{ForestConfig, RandomForestRegressor};
use super::scaler::ScalerState;
use super::Regressor;
use crate::dataset::TrainingDataset;
use crate::error::{HvacError, Result};
use crate::models::{FeatureVector, TrainingReport};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::info;

/// Default share of rows held out for scoring
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub forest: ForestConfig,
    /// Share of rows held out, in [0, 1)
    pub holdout_fraction: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
        }
    }
}

/// Result of a successful training run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pair: ArtifactPair,
    pub report: TrainingReport,
}

/// Trains the forest from the dataset and writes the artifacts
#[derive(Debug, Clone)]
pub struct Trainer {
    dataset: TrainingDataset,
    store: ArtifactStore,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(dataset: TrainingDataset, store: ArtifactStore, config: TrainingConfig) -> Self {
        Self {
            dataset,
            store,
            config,
        }
    }

    pub fn dataset(&self) -> &TrainingDataset {
        &self.dataset
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run the whole pipeline. Blocking; call from a blocking context.
    pub fn train(&self) -> Result<TrainedModel> {
        let start = Instant::now();

        let rows = self.dataset.load()?;
        if rows.is_empty() {
            return Err(HvacError::InvalidDataset(format!(
                "no usable rows in {} ({} dropped)",
                self.dataset.path().display(),
                rows.dropped
            )));
        }

        let scaler = ScalerState::fit(&rows.features)?;
        let scaled = scaler.transform_all(&rows.features);

        let (fit_idx, holdout_idx) =
            split_indices(scaled.len(), self.config.holdout_fraction, self.config.forest.seed);

        let fit_x: Vec<FeatureVector> = fit_idx.iter().map(|&i| scaled[i]).collect();
        let fit_y: Vec<f64> = fit_idx.iter().map(|&i| rows.labels[i]).collect();
        let model = RandomForestRegressor::fit(&fit_x, &fit_y, self.config.forest)?;

        let holdout: Vec<(f64, f64)> = holdout_idx
            .iter()
            .map(|&i| (model.predict(&scaled[i]), rows.labels[i]))
            .collect();
        let holdout_mae = mean_absolute_error(&holdout);
        let holdout_r2 = r_squared(&holdout);

        let (model_fingerprint, scaler_fingerprint) = self.store.save(&model, &scaler)?;

        let report = TrainingReport {
            rows: rows.len(),
            fit_rows: fit_idx.len(),
            holdout_rows: holdout_idx.len(),
            holdout_mae,
            holdout_r2,
            duration_ms: start.elapsed().as_millis() as u64,
            model_fingerprint: model_fingerprint.clone(),
            scaler_fingerprint: scaler_fingerprint.clone(),
            trained_at: chrono::Utc::now().timestamp(),
        };

        info!(
            rows = report.rows,
            fit_rows = report.fit_rows,
            holdout_rows = report.holdout_rows,
            holdout_mae = ?report.holdout_mae,
            holdout_r2 = ?report.holdout_r2,
            duration_ms = report.duration_ms,
            "HVAC model trained and saved"
        );

        Ok(TrainedModel {
            pair: ArtifactPair {
                model,
                scaler,
                model_fingerprint,
                scaler_fingerprint,
            },
            report,
        })
    }
}

/// Shuffle `0..n` with `seed` and cut off the holdout share
///
/// The holdout gets `ceil(fraction * n)` rows but never the last fit row.
pub fn split_indices(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let n_holdout = ((fraction * n as f64).ceil() as usize).min(n.saturating_sub(1));

    let holdout = order.split_off(n - n_holdout);
    (order, holdout)
}

/// Mean absolute error over (predicted, actual) pairs
pub fn mean_absolute_error(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    Some(pairs.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / pairs.len() as f64)
}

/// Coefficient of determination, None when the actuals have no variance
pub fn r_squared(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let mean = pairs.iter().map(|(_, a)| a).sum::<f64>() / pairs.len() as f64;
    let ss_tot: f64 = pairs.iter().map(|(_, a)| (a - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return None;
    }
    let ss_res: f64 = pairs.iter().map(|(p, a)| (a - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}
