//! Control loop
//!
//! Runs one cycle per tick for as long as the process lives. The shutdown
//! broadcast only exists so the loop can release its actuator backend
//! before the process exits.

use super::ControlState;
use crate::actuator::ActuatorBackend;
use crate::error::HvacError;
use crate::health::{Component, HealthRegistry};
use crate::models::{CycleReport, SensorSnapshot};
use crate::observability::{HvacMetrics, StructuredLogger};
use crate::policy::ActuationPolicy;
use crate::predictor::PredictionEngine;
use crate::sensors::SensorSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Pause between cycles
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(10);

/// Desired temperature in °C
pub const DEFAULT_SETPOINT: f64 = 22.0;

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub interval: Duration,
    pub setpoint: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CYCLE_INTERVAL,
            setpoint: DEFAULT_SETPOINT,
        }
    }
}

/// The single long-running worker driving the plant
pub struct ControlLoop {
    sensors: Arc<dyn SensorSource>,
    engine: Arc<PredictionEngine>,
    policy: ActuationPolicy,
    backend: Arc<dyn ActuatorBackend>,
    config: ControlConfig,
    state: ControlState,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: HvacMetrics,
    cycle: u64,
}

impl ControlLoop {
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Run cycles until shutdown, then release the backend
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            setpoint = self.config.setpoint,
            deadband = self.policy.deadband,
            sensors = self.sensors.name(),
            backend = self.backend.name(),
            "Starting control loop"
        );
        self.metrics.set_setpoint(self.config.setpoint);

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }

        if let Err(e) = self.backend.shutdown().await {
            warn!(error = %e, backend = self.backend.name(), "Failed to release actuator backend");
        }
    }

    /// One full cycle; never fails, the outcome is in the report
    pub async fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        self.cycle += 1;

        let (snapshot, sensor_fallback) = self.acquire().await;

        let mut report = CycleReport {
            cycle: self.cycle,
            snapshot,
            sensor_fallback,
            predicted_temperature: None,
            setpoint: self.config.setpoint,
            mode: None,
            dispatched: false,
            error: None,
            duration_ms: 0,
            completed_at: 0,
        };

        match self.predict(snapshot).await {
            Ok(predicted) => {
                self.health.set_healthy(Component::Predictor).await;
                self.metrics.set_predicted_temperature(predicted);
                report.predicted_temperature = Some(predicted);

                let command = self.policy.decide(predicted, self.config.setpoint);
                report.mode = Some(command.mode());

                match self.backend.apply(&command).await {
                    Ok(()) => {
                        report.dispatched = true;
                        self.metrics.set_actuator_states(command.mode());
                        self.health.set_healthy(Component::Actuators).await;
                    }
                    Err(e) => {
                        self.metrics.inc_actuation_errors(e.kind());
                        self.logger
                            .log_actuation_failure(self.backend.name(), e.kind(), &e.to_string());
                        self.health
                            .set_degraded(Component::Actuators, e.to_string())
                            .await;
                        report.error = Some(e.to_string());
                    }
                }
            }
            Err(e) => {
                self.metrics.inc_prediction_errors(e.kind());
                self.logger.log_prediction_failure(e.kind(), &e.to_string());
                self.health
                    .set_unhealthy(Component::Predictor, e.to_string())
                    .await;
                report.error = Some(e.to_string());
            }
        }

        let elapsed = start.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;
        report.completed_at = chrono::Utc::now().timestamp();

        self.metrics.observe_cycle(elapsed.as_secs_f64());
        self.logger.log_cycle(&report);
        self.state.record(report.clone()).await;
        self.health.set_ready(true).await;

        report
    }

    async fn acquire(&self) -> (SensorSnapshot, bool) {
        match self.sensors.read().await {
            Ok(snapshot) => {
                self.health.set_healthy(Component::Sensors).await;
                (snapshot, false)
            }
            Err(e) => {
                self.metrics.inc_sensor_fallbacks();
                self.logger.log_sensor_fallback(&e.to_string());
                self.health
                    .set_degraded(Component::Sensors, e.to_string())
                    .await;
                (SensorSnapshot::default(), true)
            }
        }
    }

    /// Inference runs on the blocking pool; the first call may train
    async fn predict(&self, snapshot: SensorSnapshot) -> crate::error::Result<f64> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.predict(&snapshot))
            .await
            .map_err(|e| HvacError::ModelUnavailable(format!("inference task failed: {}", e)))?
    }
}

/// Builder wiring the loop's collaborators
pub struct ControlLoopBuilder {
    sensors: Option<Arc<dyn SensorSource>>,
    engine: Option<Arc<PredictionEngine>>,
    backend: Option<Arc<dyn ActuatorBackend>>,
    policy: ActuationPolicy,
    config: ControlConfig,
    state: ControlState,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            sensors: None,
            engine: None,
            backend: None,
            policy: ActuationPolicy::default(),
            config: ControlConfig::default(),
            state: ControlState::default(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("default"),
        }
    }

    pub fn sensors(mut self, sensors: Arc<dyn SensorSource>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn engine(mut self, engine: Arc<PredictionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ActuatorBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn policy(mut self, policy: ActuationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn setpoint(mut self, setpoint: f64) -> Self {
        self.config.setpoint = setpoint;
        self
    }

    /// Share cycle reports with another owner, such as the HTTP API
    pub fn state(mut self, state: ControlState) -> Self {
        self.state = state;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let sensors = self
            .sensors
            .ok_or_else(|| anyhow::anyhow!("Sensor source is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Prediction engine is required"))?;
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Actuator backend is required"))?;
        if !self.config.setpoint.is_finite() {
            anyhow::bail!("Setpoint must be a finite temperature");
        }
        if self.config.interval.is_zero() {
            anyhow::bail!("Cycle interval must be greater than zero");
        }

        Ok(ControlLoop {
            sensors,
            engine,
            policy: self.policy,
            backend,
            config: self.config,
            state: self.state,
            health: self.health,
            logger: self.logger,
            metrics: HvacMetrics::new(),
            cycle: 0,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
