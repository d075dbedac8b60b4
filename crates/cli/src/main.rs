//! Predictive HVAC CLI
//!
//! Trains and queries the desired-temperature model locally, and inspects
//! or feeds a running hvac-agent over HTTP.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::builder::TypedValueParser;
use clap::{Args, Parser, Subcommand};
use commands::{agent, model};
use hvac_agent_lib::{
    predictor::{
        ForestConfig, TrainingConfig, TreeConfig, DEFAULT_HOLDOUT_FRACTION, DEFAULT_N_ESTIMATORS,
        DEFAULT_SEED,
    },
    LabeledSample, SensorSnapshot,
};
use std::path::PathBuf;

/// Predictive HVAC CLI
#[derive(Parser)]
#[command(name = "hvacctl")]
#[command(author, version, about = "CLI for the Predictive HVAC agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via HVACCTL_API_URL env var)
    #[arg(long, env = "HVACCTL_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Training dataset for local commands
    #[arg(long, env = "HVAC_DATASET_PATH", default_value = "data/hvac_data.csv")]
    pub dataset: PathBuf,

    /// Model and scaler directory for local commands
    #[arg(long, env = "HVAC_MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(flatten)]
    pub training: TrainingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the model from the local dataset
    Train,

    /// Predict the desired temperature locally and show the resulting mode
    Predict {
        #[command(flatten)]
        readings: Readings,

        /// Setpoint to compare the prediction against
        #[arg(long, default_value_t = 22.0)]
        setpoint: f64,

        /// Idle band around the setpoint
        #[arg(long, default_value_t = 0.0)]
        deadband: f64,
    },

    /// Show the agent's status
    Status,

    /// Show the agent's current sensor readings
    Sensors,

    /// Record the temperature occupants actually wanted for some readings
    Learn {
        #[command(flatten)]
        readings: Readings,

        /// Desired temperature in °C
        #[arg(long)]
        desired: f64,

        /// Append and retrain locally instead of sending to the agent
        #[arg(long)]
        local: bool,
    },
}

/// Forest settings for local training, read from the same `HVAC_TRAINING__*`
/// variables as the agent's `[training]` table
#[derive(Args)]
pub struct TrainingArgs {
    /// Trees in the forest
    #[arg(long, global = true, env = "HVAC_TRAINING__N_ESTIMATORS", default_value_t = DEFAULT_N_ESTIMATORS,
          value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    pub n_estimators: usize,

    /// Bootstrap seed
    #[arg(long, global = true, env = "HVAC_TRAINING__SEED", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Share of rows held out for scoring, in [0, 1)
    #[arg(long, global = true, env = "HVAC_TRAINING__HOLDOUT_FRACTION",
          default_value_t = DEFAULT_HOLDOUT_FRACTION, value_parser = parse_fraction)]
    pub holdout_fraction: f64,

    /// Maximum tree depth, unlimited when unset
    #[arg(long, global = true, env = "HVAC_TRAINING__MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Minimum rows a node needs before it may split
    #[arg(long, global = true, env = "HVAC_TRAINING__MIN_SAMPLES_SPLIT",
          default_value_t = TreeConfig::default().min_samples_split)]
    pub min_samples_split: usize,
}

impl TrainingArgs {
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

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err("must be in [0, 1)".to_string())
    }
}

/// One set of sensor readings
#[derive(Args)]
pub struct Readings {
    /// Temperature in °C
    #[arg(long)]
    pub temperature: f64,

    /// Relative humidity in %
    #[arg(long)]
    pub humidity: f64,

    /// CO2 concentration in ppm
    #[arg(long)]
    pub co2: u32,

    /// Occupancy flag
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub occupancy: u8,
}

impl Readings {
    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            temperature: self.temperature,
            humidity: self.humidity,
            co2_level: self.co2,
            occupancy: self.occupancy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = model::LocalModel {
        dataset: &cli.dataset,
        model_dir: &cli.model_dir,
        training: cli.training.to_training_config(),
    };

    match &cli.command {
        Commands::Train => {
            model::train(paths, cli.format).await?;
        }
        Commands::Predict {
            readings,
            setpoint,
            deadband,
        } => {
            model::predict(paths, readings.snapshot(), *setpoint, *deadband, cli.format).await?;
        }
        Commands::Status => {
            let client = client::ApiClient::new(&cli.api_url)?;
            agent::show_status(&client, cli.format).await?;
        }
        Commands::Sensors => {
            let client = client::ApiClient::new(&cli.api_url)?;
            agent::show_sensors(&client, cli.format).await?;
        }
        Commands::Learn {
            readings,
            desired,
            local,
        } => {
            let sample = LabeledSample {
                snapshot: readings.snapshot(),
                desired_temperature: *desired,
            };
            if *local {
                model::learn_local(paths, sample, cli.format).await?;
            } else {
                let client = client::ApiClient::new(&cli.api_url)?;
                agent::submit_sample(&client, &sample, cli.format).await?;
            }
        }
    }

    Ok(())
}
