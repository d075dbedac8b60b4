//! Continuous learning
//!
//! A labeled sample grows the dataset by one row and triggers a full
//! retrain. [`ContinuousLearner::update`] does this synchronously. The agent
//! uses [`RetrainWorker`] instead, which takes samples off a channel and
//! retrains on the blocking pool while the control loop keeps predicting
//! from the previous pair.

use super::engine::PredictionEngine;
use crate::error::Result;
use crate::health::{Component, HealthRegistry};
use crate::models::{LabeledSample, TrainingReport};
use crate::observability::StructuredLogger;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default number of samples that may wait for the worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Appends labeled samples and retrains
#[derive(Clone)]
pub struct ContinuousLearner {
    engine: Arc<PredictionEngine>,
}

impl ContinuousLearner {
    pub fn new(engine: Arc<PredictionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<PredictionEngine> {
        &self.engine
    }

    /// Append `sample` and retrain from the whole dataset. Blocking.
    pub fn update(&self, sample: &LabeledSample) -> Result<TrainingReport> {
        info!(
            temperature = sample.snapshot.temperature,
            humidity = sample.snapshot.humidity,
            co2_level = sample.snapshot.co2_level,
            occupancy = sample.snapshot.occupancy,
            desired_temperature = sample.desired_temperature,
            "Learning from labeled sample"
        );
        self.engine.learn(sample)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("retrain worker is no longer running")]
    Closed,

    #[error("retrain queue is full")]
    Full,
}

/// Sending side of the retrain queue
#[derive(Clone)]
pub struct LearningHandle {
    tx: mpsc::Sender<LabeledSample>,
}

impl LearningHandle {
    /// Queue a sample without waiting
    pub fn submit(&self, sample: LabeledSample) -> std::result::Result<(), SubmitError> {
        self.tx.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Background task applying queued samples one at a time
pub struct RetrainWorker {
    learner: ContinuousLearner,
    rx: mpsc::Receiver<LabeledSample>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl RetrainWorker {
    pub fn new(learner: ContinuousLearner, capacity: usize) -> (Self, LearningHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            learner,
            rx,
            health: None,
            logger: None,
        };
        (worker, LearningHandle { tx })
    }

    /// Report each retrain outcome on the trainer component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Spawn the worker onto the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process samples until every handle has been dropped
    pub async fn run(mut self) {
        info!("Starting retrain worker");

        while let Some(sample) = self.rx.recv().await {
            let learner = self.learner.clone();
            match tokio::task::spawn_blocking(move || learner.update(&sample)).await {
                Ok(Ok(report)) => {
                    match &self.logger {
                        Some(logger) => logger.log_training(&report),
                        None => info!(
                            rows = report.rows,
                            holdout_mae = ?report.holdout_mae,
                            duration_ms = report.duration_ms,
                            "Retrained after labeled sample"
                        ),
                    }
                    if let Some(health) = &self.health {
                        health.set_healthy(Component::Trainer).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, kind = e.kind(), "Retrain failed, keeping previous model");
                    if let Some(health) = &self.health {
                        health
                            .set_degraded(Component::Trainer, format!("last retrain failed: {}", e))
                            .await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Retrain task panicked");
                    if let Some(health) = &self.health {
                        health
                            .set_unhealthy(Component::Trainer, "retrain task panicked")
                            .await;
                    }
                }
            }
        }

        info!("Retrain worker stopped");
    }
}
