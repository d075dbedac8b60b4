//! Error taxonomy for the HVAC agent library

use thiserror::Error;

/// Errors produced by the predictive control core
#[derive(Debug, Error)]
pub enum HvacError {
    /// No training data source exists
    #[error("training dataset not found at {0}")]
    DatasetMissing(String),

    /// A required column is absent after ingestion-time renaming
    #[error("dataset missing required column: {0}")]
    SchemaMismatch(String),

    /// Dataset present but unusable (empty after cleaning, malformed row, ...)
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// No model/scaler pair could be loaded or trained
    #[error("predictor unavailable: {0}")]
    ModelUnavailable(String),

    /// Backend could not drive an actuator
    #[error("actuation failed on {device}: {reason}")]
    Actuation { device: String, reason: String },

    /// Networked backend could not confirm a publish
    #[error("delivery to {topic} not confirmed: {reason}")]
    Delivery { topic: String, reason: String },

    /// Sensor collaborator returned no usable data
    #[error("sensor acquisition failed: {0}")]
    Sensor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl HvacError {
    /// Short, stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            HvacError::DatasetMissing(_) => "dataset_missing",
            HvacError::SchemaMismatch(_) => "schema_mismatch",
            HvacError::InvalidDataset(_) => "invalid_dataset",
            HvacError::ModelUnavailable(_) => "model_unavailable",
            HvacError::Actuation { .. } => "actuation",
            HvacError::Delivery { .. } => "delivery",
            HvacError::Sensor(_) => "sensor",
            HvacError::Io(_) => "io",
            HvacError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, HvacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = HvacError::SchemaMismatch("co2_level".to_string());
        assert_eq!(err.to_string(), "dataset missing required column: co2_level");

        let err = HvacError::Delivery {
            topic: "home/hvac/fan".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(err.to_string().contains("home/hvac/fan"));
        assert_eq!(err.kind(), "delivery");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HvacError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
