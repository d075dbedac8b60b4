//! Offline model commands working on local artifacts

use anyhow::{Context, Result};
use colored::Colorize;
use hvac_agent_lib::{
    dataset::TrainingDataset,
    policy::ActuationPolicy,
    predictor::{ArtifactStore, ContinuousLearner, PredictionEngine, Trainer, TrainingConfig},
    HvacMode, LabeledSample, SensorSnapshot, TrainingReport,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::output::{
    color_mode, command_rows, format_celsius, format_optional, format_timestamp, print_info,
    print_record, print_success, short_fingerprint, FieldRow, OutputFormat,
};

/// Local dataset, artifact locations and training settings
pub struct LocalModel<'a> {
    pub dataset: &'a Path,
    pub model_dir: &'a Path,
    pub training: TrainingConfig,
}

impl LocalModel<'_> {
    fn engine(&self) -> PredictionEngine {
        PredictionEngine::new(Trainer::new(
            TrainingDataset::new(self.dataset),
            ArtifactStore::new(self.model_dir),
            self.training,
        ))
    }
}

#[derive(Serialize)]
struct PredictionOutput {
    snapshot: SensorSnapshot,
    predicted_temperature: f64,
    setpoint: f64,
    deadband: f64,
    mode: HvacMode,
    fan: String,
    heater: String,
    cooler: String,
}

/// Train from the local dataset and overwrite the local artifacts
pub async fn train(paths: LocalModel<'_>, format: OutputFormat) -> Result<()> {
    let engine = Arc::new(paths.engine());
    if format == OutputFormat::Table {
        print_info(&format!("Training from {}", paths.dataset.display()));
    }

    let report = tokio::task::spawn_blocking(move || engine.retrain())
        .await?
        .context("Training failed")?;

    if format == OutputFormat::Table {
        print_success(&format!(
            "Model written to {}",
            paths.model_dir.display().to_string().cyan()
        ));
    }
    print_training_report(&report, format)
}

/// Predict the desired temperature for one snapshot and show the decided mode
pub async fn predict(
    paths: LocalModel<'_>,
    snapshot: SensorSnapshot,
    setpoint: f64,
    deadband: f64,
    format: OutputFormat,
) -> Result<()> {
    let engine = Arc::new(paths.engine());
    let predicted = tokio::task::spawn_blocking(move || engine.predict(&snapshot))
        .await?
        .context("Prediction failed")?;

    let command = ActuationPolicy::with_deadband(deadband).decide(predicted, setpoint);
    let output = PredictionOutput {
        snapshot,
        predicted_temperature: predicted,
        setpoint,
        deadband,
        mode: command.mode(),
        fan: command.fan().payload().to_string(),
        heater: command.heater().payload().to_string(),
        cooler: command.cooler().payload().to_string(),
    };

    let mut rows = vec![
        FieldRow::new("predicted", format_celsius(predicted)),
        FieldRow::new("setpoint", format_celsius(setpoint)),
        FieldRow::new("mode", color_mode(command.mode())),
    ];
    rows.extend(command_rows(&command));
    print_record(&output, rows, format)
}

/// Append one labeled sample locally and retrain before returning
pub async fn learn_local(
    paths: LocalModel<'_>,
    sample: LabeledSample,
    format: OutputFormat,
) -> Result<()> {
    let learner = ContinuousLearner::new(Arc::new(paths.engine()));
    let report = tokio::task::spawn_blocking(move || learner.update(&sample))
        .await?
        .context("Continuous learning update failed")?;

    if format == OutputFormat::Table {
        print_success(&format!(
            "Sample appended to {}, model retrained",
            paths.dataset.display()
        ));
    }
    print_training_report(&report, format)
}

fn print_training_report(report: &TrainingReport, format: OutputFormat) -> Result<()> {
    let rows = vec![
        FieldRow::new("rows", report.rows.to_string()),
        FieldRow::new("fit / holdout", format!("{} / {}", report.fit_rows, report.holdout_rows)),
        FieldRow::new("holdout MAE", format_optional(report.holdout_mae, 3)),
        FieldRow::new("holdout R²", format_optional(report.holdout_r2, 3)),
        FieldRow::new("duration", format!("{} ms", report.duration_ms)),
        FieldRow::new("model", short_fingerprint(&report.model_fingerprint)),
        FieldRow::new("scaler", short_fingerprint(&report.scaler_fingerprint)),
        FieldRow::new("trained at", format_timestamp(report.trained_at)),
    ];
    print_record(report, rows, format)
}
