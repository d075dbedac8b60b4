//! Agent configuration
//!
//! Layered: an optional config file (path from `HVAC_CONFIG`, default
//! `config/hvac-agent` with any supported extension) under environment
//! variables prefixed `HVAC_`. Nested keys use `__`, e.g.
//! `HVAC_MQTT__BROKER_HOST=broker.lan`.

use anyhow::{Context, Result};
use hvac_agent_lib::{
    actuator::{BackendKind, GpioSettings, MqttSettings},
    control::{DEFAULT_CYCLE_INTERVAL, DEFAULT_SETPOINT},
    predictor::{
        ForestConfig, TrainingConfig, TreeConfig, DEFAULT_HOLDOUT_FRACTION, DEFAULT_N_ESTIMATORS,
        DEFAULT_SEED,
    },
    sensors::SensorSourceKind,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default config file location, extension resolved by the config crate
pub const DEFAULT_CONFIG_PATH: &str = "config/hvac-agent";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HvacConfig {
    /// Desired indoor temperature in °C
    #[serde(default = "default_setpoint")]
    pub setpoint: f64,

    /// Idle band around the setpoint in °C; 0 is pure bang-bang
    #[serde(default)]
    pub deadband: f64,

    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Port for the dashboard, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub sensor_source: SensorSourceKind,

    /// JSON reading written by the acquisition daemon, for `sensor_source = file`
    #[serde(default)]
    pub sensor_file: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Label attached to structured log events
    #[serde(default = "default_zone_name")]
    pub zone_name: String,

    #[serde(default)]
    pub gpio: GpioSettings,

    #[serde(default)]
    pub mqtt: MqttSettings,

    #[serde(default)]
    pub training: TrainingSettings,
}

/// Forest hyperparameters and holdout share
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub n_estimators: usize,
    pub seed: u64,
    pub holdout_fraction: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            seed: DEFAULT_SEED,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            max_depth: None,
            min_samples_split: TreeConfig::default().min_samples_split,
        }
    }
}

impl TrainingSettings {
    pub fn to_training_config(&self) -> TrainingConfig {
        TrainingConfig {
            forest: ForestConfig {
                n_estimators: self.n_estimators,
                seed: self.seed,
                tree: TreeConfig {
                    max_depth: self.max_depth,
                    min_samples_split: self.min_samples_split,
                },
            },
            holdout_fraction: self.holdout_fraction,
        }
    }
}

fn default_setpoint() -> f64 {
    DEFAULT_SETPOINT
}

fn default_cycle_interval() -> u64 {
    DEFAULT_CYCLE_INTERVAL.as_secs()
}

fn default_api_port() -> u16 {
    5000
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/hvac_data.csv")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_zone_name() -> String {
    "default".to_string()
}

impl HvacConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("HVAC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load with an explicit config file path (file is optional)
    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("HVAC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.setpoint.is_finite() {
            anyhow::bail!("setpoint must be a finite temperature");
        }
        if !self.deadband.is_finite() || self.deadband < 0.0 {
            anyhow::bail!("deadband must be a non-negative temperature difference");
        }
        if self.cycle_interval_secs == 0 {
            anyhow::bail!("cycle_interval_secs must be at least 1");
        }
        if self.training.n_estimators == 0 {
            anyhow::bail!("training.n_estimators must be at least 1");
        }
        if !(0.0..1.0).contains(&self.training.holdout_fraction) {
            anyhow::bail!("training.holdout_fraction must be in [0, 1)");
        }
        if self.sensor_source == SensorSourceKind::File && self.sensor_file.is_none() {
            anyhow::bail!("sensor_source = \"file\" requires sensor_file");
        }
        Ok(())
    }
}
