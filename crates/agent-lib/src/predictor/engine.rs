//! In-memory serving of the model/scaler pair
//!
//! The pair is loaded lazily on the first prediction. When no artifacts
//! exist yet the engine trains once from the dataset before answering.
//! Retraining builds a complete new pair and swaps it in under the write
//! lock only after it has been persisted, so predictions keep using the
//! last good pair while a training run is in progress.

use super::artifacts::ArtifactPair;
use super::training::Trainer;
use super::Regressor;
use crate::error::{HvacError, Result};
use crate::models::{LabeledSample, SensorSnapshot, TrainingReport};
use crate::observability::HvacMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Serves temperature predictions from the current model/scaler pair
pub struct PredictionEngine {
    trainer: Trainer,
    current: RwLock<Option<Arc<ArtifactPair>>>,
    last_report: RwLock<Option<TrainingReport>>,
    /// Held for the whole of any training run, lazy or explicit
    training: Mutex<()>,
    inference_count: AtomicU64,
    training_count: AtomicU64,
    metrics: HvacMetrics,
}

/// Engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub total_inferences: u64,
    pub total_trainings: u64,
    pub model_loaded: bool,
}

impl PredictionEngine {
    pub fn new(trainer: Trainer) -> Self {
        Self {
            trainer,
            current: RwLock::new(None),
            last_report: RwLock::new(None),
            training: Mutex::new(()),
            inference_count: AtomicU64::new(0),
            training_count: AtomicU64::new(0),
            metrics: HvacMetrics::new(),
        }
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    /// Predict the desired temperature for a snapshot, rounded to 2 decimals
    ///
    /// Blocking: the first call may train a model from scratch.
    pub fn predict(&self, snapshot: &SensorSnapshot) -> Result<f64> {
        let start = Instant::now();
        let pair = self.ensure_loaded()?;

        let normalized = pair.scaler.transform(&snapshot.features());
        let predicted = round_prediction(pair.model.predict(&normalized));

        self.inference_count.fetch_add(1, Ordering::Relaxed);
        let elapsed = start.elapsed();
        self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
        debug!(
            elapsed_us = elapsed.as_micros() as u64,
            predicted_temperature = predicted,
            "Inference completed"
        );

        Ok(predicted)
    }

    /// Train from the current dataset and swap the result in
    pub fn retrain(&self) -> Result<TrainingReport> {
        let guard = self.lock_training()?;
        self.train_locked(&guard)
    }

    /// Append one labeled row and retrain, as one step
    ///
    /// The append happens under the training lock so a concurrent training
    /// never reads a half-written row.
    pub fn learn(&self, sample: &LabeledSample) -> Result<TrainingReport> {
        let guard = self.lock_training()?;
        self.trainer.dataset().append(sample)?;
        self.train_locked(&guard)
    }

    /// Load the pair if it is not in memory yet, training when absent
    pub fn warm_up(&self) -> Result<()> {
        self.ensure_loaded().map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Report of the most recent training run in this process
    pub fn last_report(&self) -> Option<TrainingReport> {
        self.last_report.read().ok().and_then(|r| r.clone())
    }

    /// (model, scaler) fingerprints of the pair in memory
    pub fn fingerprints(&self) -> Option<(String, String)> {
        let current = self.current.read().ok()?;
        current
            .as_ref()
            .map(|p| (p.model_fingerprint.clone(), p.scaler_fingerprint.clone()))
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            total_trainings: self.training_count.load(Ordering::Relaxed),
            model_loaded: self.is_loaded(),
        }
    }

    fn current_pair(&self) -> Result<Option<Arc<ArtifactPair>>> {
        let current = self
            .current
            .read()
            .map_err(|e| HvacError::ModelUnavailable(format!("lock poisoned: {}", e)))?;
        Ok(current.clone())
    }

    fn ensure_loaded(&self) -> Result<Arc<ArtifactPair>> {
        if let Some(pair) = self.current_pair()? {
            return Ok(pair);
        }

        let guard = self.lock_training()?;
        // Another caller may have finished loading while we waited
        if let Some(pair) = self.current_pair()? {
            return Ok(pair);
        }

        match self.trainer.store().load() {
            Ok(Some(pair)) => {
                let pair = Arc::new(pair);
                self.install(pair.clone())?;
                return Ok(pair);
            }
            Ok(None) => {
                info!(
                    dataset = %self.trainer.dataset().path().display(),
                    "No model artifacts found, training before first prediction"
                );
            }
            Err(e) => {
                warn!(error = %e, "Model artifacts unreadable, retraining from dataset");
            }
        }

        self.train_locked(&guard)?;
        self.current_pair()?.ok_or_else(|| {
            HvacError::ModelUnavailable("training finished without installing a model".to_string())
        })
    }

    fn train_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<TrainingReport> {
        let start = Instant::now();
        let trained = match self.trainer.train() {
            Ok(trained) => trained,
            Err(e) => {
                self.metrics.inc_training_errors();
                return Err(e);
            }
        };

        self.install(Arc::new(trained.pair))?;
        self.training_count.fetch_add(1, Ordering::Relaxed);

        let report = trained.report;
        self.metrics.record_training(
            start.elapsed().as_secs_f64(),
            report.rows,
            report.holdout_mae,
        );
        if let Ok(mut last) = self.last_report.write() {
            *last = Some(report.clone());
        }
        Ok(report)
    }

    fn install(&self, pair: Arc<ArtifactPair>) -> Result<()> {
        let mut current = self
            .current
            .write()
            .map_err(|e| HvacError::ModelUnavailable(format!("lock poisoned: {}", e)))?;
        *current = Some(pair);
        Ok(())
    }

    fn lock_training(&self) -> Result<MutexGuard<'_, ()>> {
        self.training
            .lock()
            .map_err(|e| HvacError::ModelUnavailable(format!("training lock poisoned: {}", e)))
    }
}

/// Round to two decimals, the precision predictions are reported with
pub fn round_prediction(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TrainingDataset;
    use crate::predictor::artifacts::ArtifactStore;
    use crate::predictor::forest::ForestConfig;
    use crate::predictor::training::TrainingConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_dataset(path: &Path, rows: usize) {
        let mut csv = String::from("temperature,humidity,co2_level,occupancy,desired_temperature\n");
        for i in 0..rows {
            let temp = 16.0 + (i % 15) as f64;
            let occupancy = i % 2;
            let desired = 20.0 + (temp - 16.0) * 0.2 + occupancy as f64 * 0.5;
            csv.push_str(&format!(
                "{},{},{},{},{:.2}\n",
                temp,
                40 + i % 20,
                450 + i * 11 % 500,
                occupancy,
                desired
            ));
        }
        fs::write(path, csv).unwrap();
    }

    fn engine(dir: &TempDir) -> PredictionEngine {
        let config = TrainingConfig {
            forest: ForestConfig {
                n_estimators: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        PredictionEngine::new(Trainer::new(
            TrainingDataset::new(dir.path().join("hvac_data.csv")),
            ArtifactStore::new(dir.path().join("models")),
            config,
        ))
    }

    fn snapshot() -> SensorSnapshot {
        SensorSnapshot {
            temperature: 24.5,
            humidity: 55.0,
            co2_level: 400,
            occupancy: 1,
        }
    }

    #[test]
    fn test_round_prediction() {
        assert_eq!(round_prediction(22.456), 22.46);
        assert_eq!(round_prediction(22.0), 22.0);
        assert_eq!(round_prediction(-1.234), -1.23);
    }

    #[test]
    fn test_missing_model_trains_exactly_once() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("hvac_data.csv"), 40);
        let engine = engine(&dir);
        assert!(!engine.is_loaded());

        let first = engine.predict(&snapshot()).unwrap();
        assert_eq!(engine.stats().total_trainings, 1);
        assert!(engine.trainer().store().exists());

        for _ in 0..5 {
            assert_eq!(engine.predict(&snapshot()).unwrap(), first);
        }
        let stats = engine.stats();
        assert_eq!(stats.total_trainings, 1);
        assert_eq!(stats.total_inferences, 6);
        assert!(stats.model_loaded);
    }

    #[test]
    fn test_existing_artifacts_are_loaded_not_trained() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("hvac_data.csv"), 30);
        let warm = engine(&dir);
        let expected = warm.predict(&snapshot()).unwrap();

        let cold = engine(&dir);
        assert_eq!(cold.predict(&snapshot()).unwrap(), expected);
        assert_eq!(cold.stats().total_trainings, 0);
        assert_eq!(cold.fingerprints(), warm.fingerprints());
    }

    #[test]
    fn test_predictions_have_two_decimals() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("hvac_data.csv"), 30);
        let engine = engine(&dir);
        let p = engine.predict(&snapshot()).unwrap();
        assert_eq!(p, round_prediction(p));
    }

    #[test]
    fn test_no_dataset_no_artifacts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert!(matches!(
            engine.predict(&snapshot()),
            Err(HvacError::DatasetMissing(_))
        ));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_learn_appends_and_swaps_pair() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("hvac_data.csv"), 30);
        let engine = engine(&dir);
        engine.warm_up().unwrap();
        let before = engine.fingerprints().unwrap();
        let rows_before = engine.trainer().dataset().row_count().unwrap();

        let report = engine
            .learn(&LabeledSample {
                snapshot: snapshot(),
                desired_temperature: 19.0,
            })
            .unwrap();

        assert_eq!(engine.trainer().dataset().row_count().unwrap(), rows_before + 1);
        assert_eq!(report.rows, rows_before + 1);
        let after = engine.fingerprints().unwrap();
        assert_ne!(before.0, after.0);
        assert_ne!(before.1, after.1);
        assert_eq!(engine.last_report().unwrap().model_fingerprint, after.0);
    }

    #[test]
    fn test_failed_retrain_keeps_last_good_pair() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("hvac_data.csv");
        write_dataset(&dataset, 30);
        let engine = engine(&dir);
        let before = engine.predict(&snapshot()).unwrap();

        fs::remove_file(&dataset).unwrap();
        assert!(engine.retrain().is_err());
        assert_eq!(engine.predict(&snapshot()).unwrap(), before);
    }

    #[test]
    fn test_corrupt_model_artifact_triggers_retrain() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("hvac_data.csv"), 30);
        let warm = engine(&dir);
        warm.predict(&snapshot()).unwrap();

        // Parses as a forest but has a tree with no nodes
        let model_path = warm.trainer().store().model_path().to_path_buf();
        let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&model_path).unwrap()).unwrap();
        json["trees"] = serde_json::json!([{ "nodes": [] }]);
        fs::write(&model_path, serde_json::to_vec(&json).unwrap()).unwrap();

        let cold = engine(&dir);
        let predicted = cold.predict(&snapshot()).unwrap();
        assert!(predicted.is_finite());
        assert_eq!(cold.stats().total_trainings, 1);
        assert!(cold.trainer().store().load().unwrap().is_some());
    }
}
