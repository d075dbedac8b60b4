//! Observability infrastructure for the HVAC agent
//!
//! Provides:
//! - Prometheus metrics (cycle and inference latency, actuator states, training outcomes)
//! - Structured JSON logging with tracing

use crate::models::{CycleReport, Device, HvacMode, TrainingReport};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Gauge, Histogram, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Buckets for whole cycles and training runs, which may include a fit
const SLOW_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HvacMetricsInner> = OnceLock::new();

struct HvacMetricsInner {
    cycle_duration_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    predicted_temperature_celsius: Gauge,
    setpoint_celsius: Gauge,
    actuator_state: IntGaugeVec,
    cycles_total: IntCounter,
    sensor_fallbacks_total: IntCounter,
    prediction_errors_total: IntCounterVec,
    actuation_errors_total: IntCounterVec,
    trainings_total: IntCounter,
    training_errors_total: IntCounter,
    training_duration_seconds: Histogram,
    holdout_mae_celsius: Gauge,
    dataset_rows: IntGauge,
}

impl HvacMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "hvac_agent_cycle_duration_seconds",
                "Wall time of one control cycle",
                SLOW_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "hvac_agent_prediction_latency_seconds",
                "Time spent scaling and running the forest for one snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predicted_temperature_celsius: register_gauge!(
                "hvac_agent_predicted_temperature_celsius",
                "Most recent predicted desired temperature"
            )
            .expect("Failed to register predicted_temperature_celsius"),

            setpoint_celsius: register_gauge!(
                "hvac_agent_setpoint_celsius",
                "Configured setpoint"
            )
            .expect("Failed to register setpoint_celsius"),

            actuator_state: register_int_gauge_vec!(
                "hvac_agent_actuator_state",
                "Last dispatched actuator state (1 = ON)",
                &["device"]
            )
            .expect("Failed to register actuator_state"),

            cycles_total: register_int_counter!(
                "hvac_agent_cycles_total",
                "Control cycles run"
            )
            .expect("Failed to register cycles_total"),

            sensor_fallbacks_total: register_int_counter!(
                "hvac_agent_sensor_fallbacks_total",
                "Cycles that used the default snapshot"
            )
            .expect("Failed to register sensor_fallbacks_total"),

            prediction_errors_total: register_int_counter_vec!(
                "hvac_agent_prediction_errors_total",
                "Cycles whose prediction failed",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            actuation_errors_total: register_int_counter_vec!(
                "hvac_agent_actuation_errors_total",
                "Commands the backend failed to execute",
                &["kind"]
            )
            .expect("Failed to register actuation_errors_total"),

            trainings_total: register_int_counter!(
                "hvac_agent_trainings_total",
                "Completed training runs"
            )
            .expect("Failed to register trainings_total"),

            training_errors_total: register_int_counter!(
                "hvac_agent_training_errors_total",
                "Failed training runs"
            )
            .expect("Failed to register training_errors_total"),

            training_duration_seconds: register_histogram!(
                "hvac_agent_training_duration_seconds",
                "Wall time of one training run",
                SLOW_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            holdout_mae_celsius: register_gauge!(
                "hvac_agent_holdout_mae_celsius",
                "Holdout mean absolute error of the current model"
            )
            .expect("Failed to register holdout_mae_celsius"),

            dataset_rows: register_int_gauge!(
                "hvac_agent_dataset_rows",
                "Usable rows in the training dataset at last training"
            )
            .expect("Failed to register dataset_rows"),
        }
    }
}

/// Handle to the process-wide HVAC metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct HvacMetrics {
    _private: (),
}

impl Default for HvacMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HvacMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HvacMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HvacMetricsInner {
        GLOBAL_METRICS.get_or_init(HvacMetricsInner::new)
    }

    pub fn observe_cycle(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
        self.inner().cycles_total.inc();
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn set_predicted_temperature(&self, celsius: f64) {
        self.inner().predicted_temperature_celsius.set(celsius);
    }

    pub fn set_setpoint(&self, celsius: f64) {
        self.inner().setpoint_celsius.set(celsius);
    }

    /// Record the per-device states implied by `mode`
    pub fn set_actuator_states(&self, mode: HvacMode) {
        let command = crate::models::ActuatorCommand::new(mode);
        for device in Device::ALL {
            self.inner()
                .actuator_state
                .with_label_values(&[device.as_str()])
                .set(i64::from(command.state_of(device).is_on()));
        }
    }

    pub fn inc_sensor_fallbacks(&self) {
        self.inner().sensor_fallbacks_total.inc();
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_actuation_errors(&self, kind: &str) {
        self.inner()
            .actuation_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_training(&self, duration_secs: f64, rows: usize, holdout_mae: Option<f64>) {
        self.inner().trainings_total.inc();
        self.inner().training_duration_seconds.observe(duration_secs);
        self.inner().dataset_rows.set(rows as i64);
        if let Some(mae) = holdout_mae {
            self.inner().holdout_mae_celsius.set(mae);
        }
    }

    pub fn inc_training_errors(&self) {
        self.inner().training_errors_total.inc();
    }
}

/// Structured logger for agent events
///
/// Every record carries an `event` field so log pipelines can filter on
/// cycle, training and actuation events without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    zone: String,
}

impl StructuredLogger {
    pub fn new(zone: impl Into<String>) -> Self {
        Self { zone: zone.into() }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Log a completed control cycle
    pub fn log_cycle(&self, report: &CycleReport) {
        info!(
            event = "cycle_completed",
            zone = %self.zone,
            cycle = report.cycle,
            temperature = report.snapshot.temperature,
            humidity = report.snapshot.humidity,
            co2_level = report.snapshot.co2_level,
            occupancy = report.snapshot.occupancy,
            sensor_fallback = report.sensor_fallback,
            predicted_temperature = ?report.predicted_temperature,
            setpoint = report.setpoint,
            mode = ?report.mode,
            dispatched = report.dispatched,
            duration_ms = report.duration_ms,
            "Control cycle completed"
        );
    }

    pub fn log_sensor_fallback(&self, error: &str) {
        warn!(
            event = "sensor_fallback",
            zone = %self.zone,
            error = %error,
            "Sensor read failed, using default snapshot"
        );
    }

    pub fn log_prediction_failure(&self, kind: &str, error: &str) {
        warn!(
            event = "prediction_failed",
            zone = %self.zone,
            kind = %kind,
            error = %error,
            "Prediction failed, actuators left unchanged"
        );
    }

    pub fn log_actuation_failure(&self, backend: &str, kind: &str, error: &str) {
        warn!(
            event = "actuation_failed",
            zone = %self.zone,
            backend = %backend,
            kind = %kind,
            error = %error,
            "Actuator command failed"
        );
    }

    pub fn log_training(&self, report: &TrainingReport) {
        info!(
            event = "model_trained",
            zone = %self.zone,
            rows = report.rows,
            holdout_mae = ?report.holdout_mae,
            holdout_r2 = ?report.holdout_r2,
            duration_ms = report.duration_ms,
            model_fingerprint = %report.model_fingerprint,
            scaler_fingerprint = %report.scaler_fingerprint,
            "Model trained"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, backend: &str, sensor_source: &str, setpoint: f64) {
        info!(
            event = "agent_started",
            zone = %self.zone,
            agent_version = %version,
            backend = %backend,
            sensor_source = %sensor_source,
            setpoint = setpoint,
            "HVAC agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            zone = %self.zone,
            reason = %reason,
            "HVAC agent shutting down"
        );
    }
}
