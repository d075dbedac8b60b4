//! HVAC Agent - predictive climate control
//!
//! Reads the room sensors every cycle, predicts the occupants' desired
//! temperature and drives the fan, heater and cooler towards it.

use anyhow::{Context, Result};
use hvac_agent::{api, config::HvacConfig, signals::ShutdownSignals};
use hvac_agent_lib::{
    actuator::build_backend,
    control::{ControlLoopBuilder, ControlState},
    dataset::TrainingDataset,
    health::{Component, HealthRegistry},
    observability::{HvacMetrics, StructuredLogger},
    policy::ActuationPolicy,
    predictor::{
        ArtifactStore, ContinuousLearner, PredictionEngine, RetrainWorker, Trainer,
        DEFAULT_QUEUE_CAPACITY,
    },
    sensors::build_source,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hvac-agent");

    let config = HvacConfig::load().context("Failed to load agent configuration")?;
    info!(
        zone = %config.zone_name,
        backend = %config.backend,
        sensor_source = %config.sensor_source,
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_hvac_components().await;
    let metrics = HvacMetrics::new();
    metrics.set_setpoint(config.setpoint);

    let logger = StructuredLogger::new(&config.zone_name);
    logger.log_startup(
        AGENT_VERSION,
        &config.backend.to_string(),
        &config.sensor_source.to_string(),
        config.setpoint,
    );

    let trainer = Trainer::new(
        TrainingDataset::new(&config.dataset_path),
        ArtifactStore::new(&config.model_dir),
        config.training.to_training_config(),
    );
    let engine = Arc::new(PredictionEngine::new(trainer));

    // Load or train before the first cycle; a failure here is retried per cycle
    let warm = engine.clone();
    match tokio::task::spawn_blocking(move || warm.warm_up()).await? {
        Ok(()) => match engine.last_report() {
            Some(report) => logger.log_training(&report),
            None => info!("Model loaded from artifacts"),
        },
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "Model not available yet");
            health_registry
                .set_degraded(Component::Predictor, e.to_string())
                .await;
        }
    }

    let sensors = build_source(config.sensor_source, config.sensor_file.as_deref())
        .context("Failed to build sensor source")?;
    let backend = build_backend(config.backend, &config.gpio, &config.mqtt)
        .await
        .context("Failed to acquire actuator backend")?;

    let (worker, learning) =
        RetrainWorker::new(ContinuousLearner::new(engine.clone()), DEFAULT_QUEUE_CAPACITY);
    let worker = worker
        .with_health(health_registry.clone())
        .with_logger(logger.clone())
        .spawn();

    let control_state = ControlState::new();
    let control_loop = ControlLoopBuilder::new()
        .sensors(sensors.clone())
        .engine(engine.clone())
        .backend(backend.clone())
        .policy(ActuationPolicy::with_deadband(config.deadband))
        .interval(config.cycle_interval())
        .setpoint(config.setpoint)
        .state(control_state.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        metrics,
        sensors,
        control: control_state,
        engine,
        learning,
        zone: config.zone_name.clone(),
        setpoint: config.setpoint,
        deadband: config.deadband,
        backend: backend.name().to_string(),
    });

    let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control_loop.run(shutdown_rx));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = signals.recv() => {
            logger.log_shutdown(&format!("{} received", signal));
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    logger.log_shutdown("API server failed");
                    warn!(error = %e, "API server exited with error");
                }
                Err(e) => warn!(error = %e, "API server task panicked"),
            }
        }
    }

    // Let the loop switch everything off before exiting
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Control loop task panicked");
    }
    worker.abort();
    info!("Shutting down");

    Ok(())
}
