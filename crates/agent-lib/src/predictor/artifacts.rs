//! Persisted model and scaler artifacts
//!
//! Both artifacts are JSON blobs at fixed paths, overwritten wholesale by
//! each training run. Writes go to a temp file that is synced and then
//! renamed over the target, so a reader sees either the old or the new
//! artifact and never a torn one.
//!
//! No check ties a scaler to the model it was fitted with. Both SHA-256
//! fingerprints are reported so a mismatched pair can at least be spotted.

use super::forest::RandomForestRegressor;
use super::scaler::ScalerState;
use crate::error::{HvacError, Result};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODEL_FILE_NAME: &str = "hvac_model.json";
pub const SCALER_FILE_NAME: &str = "scaler.json";

/// A model/scaler pair as loaded from disk
#[derive(Debug, Clone)]
pub struct ArtifactPair {
    pub model: RandomForestRegressor,
    pub scaler: ScalerState,
    pub model_fingerprint: String,
    pub scaler_fingerprint: String,
}

/// Fixed-location storage for the model and scaler
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_path: PathBuf,
    scaler_path: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `model_dir` using the well-known file names
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        let dir = model_dir.as_ref();
        Self {
            model_path: dir.join(MODEL_FILE_NAME),
            scaler_path: dir.join(SCALER_FILE_NAME),
        }
    }

    pub fn with_paths(model_path: impl Into<PathBuf>, scaler_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            scaler_path: scaler_path.into(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn scaler_path(&self) -> &Path {
        &self.scaler_path
    }

    /// True when both artifacts are present
    pub fn exists(&self) -> bool {
        self.model_path.is_file() && self.scaler_path.is_file()
    }

    /// Persist both artifacts, returning (model, scaler) fingerprints
    ///
    /// The scaler is written first so that a crash in between leaves an
    /// old model next to a new scaler, which a later training overwrites.
    pub fn save(&self, model: &RandomForestRegressor, scaler: &ScalerState) -> Result<(String, String)> {
        let scaler_fingerprint = write_json_atomic(&self.scaler_path, scaler)?;
        let model_fingerprint = write_json_atomic(&self.model_path, model)?;

        info!(
            model_path = %self.model_path.display(),
            scaler_path = %self.scaler_path.display(),
            model_fingerprint = %short(&model_fingerprint),
            scaler_fingerprint = %short(&scaler_fingerprint),
            "Persisted model artifacts"
        );
        Ok((model_fingerprint, scaler_fingerprint))
    }

    /// Load both artifacts, None when either file is absent
    pub fn load(&self) -> Result<Option<ArtifactPair>> {
        if !self.exists() {
            debug!(
                model_path = %self.model_path.display(),
                "Model artifacts not present"
            );
            return Ok(None);
        }

        let (model, model_fingerprint) = read_json::<RandomForestRegressor>(&self.model_path)?;
        let (scaler, scaler_fingerprint) = read_json::<ScalerState>(&self.scaler_path)?;

        model.validate().map_err(|e| {
            HvacError::ModelUnavailable(format!("corrupt model at {}: {}", self.model_path.display(), e))
        })?;
        scaler.validate().map_err(|e| {
            HvacError::ModelUnavailable(format!("corrupt scaler at {}: {}", self.scaler_path.display(), e))
        })?;

        info!(
            model_fingerprint = %short(&model_fingerprint),
            scaler_fingerprint = %short(&scaler_fingerprint),
            trees = model.n_trees(),
            "Loaded model artifacts"
        );

        Ok(Some(ArtifactPair {
            model,
            scaler,
            model_fingerprint,
            scaler_fingerprint,
        }))
    }

    /// Fingerprints of the artifacts currently on disk
    pub fn fingerprints(&self) -> Result<Option<(String, String)>> {
        if !self.exists() {
            return Ok(None);
        }
        let model = compute_checksum(&fs::read(&self.model_path)?);
        let scaler = compute_checksum(&fs::read(&self.scaler_path)?);
        Ok(Some((model, scaler)))
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(value)?;

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(compute_checksum(&bytes))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<(T, String)> {
    let bytes = fs::read(path)?;
    let value = serde_json::from_slice(&bytes)?;
    Ok((value, compute_checksum(&bytes)))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}
