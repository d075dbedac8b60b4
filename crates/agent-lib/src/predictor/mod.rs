//! Temperature prediction
//!
//! Scaler and forest are trained together from the dataset, persisted as a
//! pair and served from memory by [`PredictionEngine`].

mod artifacts;
mod engine;
mod forest;
mod learning;
mod scaler;
mod training;
mod tree;

pub use artifacts::{
    compute_checksum, ArtifactPair, ArtifactStore, MODEL_FILE_NAME, SCALER_FILE_NAME,
};
pub use engine::{round_prediction, EngineStats, PredictionEngine};
pub use forest::{ForestConfig, RandomForestRegressor, DEFAULT_N_ESTIMATORS, DEFAULT_SEED};
pub use learning::{
    ContinuousLearner, LearningHandle, RetrainWorker, SubmitError, DEFAULT_QUEUE_CAPACITY,
};
pub use scaler::ScalerState;
pub use training::{
    mean_absolute_error, r_squared, split_indices, TrainedModel, Trainer, TrainingConfig,
    DEFAULT_HOLDOUT_FRACTION,
};
pub use tree::{RegressionTree, TreeConfig, TreeNode};

use crate::models::FeatureVector;

/// Anything that maps a normalized feature vector to a temperature
pub trait Regressor: Send + Sync {
    /// Predicted desired temperature in °C
    fn predict(&self, features: &FeatureVector) -> f64;
}
