//! Sensor sources
//!
//! The control loop and the dashboard endpoint both read through
//! [`SensorSource`]. Acquisition itself (DHT, CO2 and camera drivers) lives
//! outside this crate; the `file` source reads whatever an acquisition
//! daemon last wrote.

use crate::error::{HvacError, Result};
use crate::models::{
    SensorSnapshot, DEFAULT_CO2_LEVEL, DEFAULT_HUMIDITY, DEFAULT_OCCUPANCY, DEFAULT_TEMPERATURE,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Produces one snapshot per call
#[async_trait]
pub trait SensorSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read(&self) -> Result<SensorSnapshot>;
}

/// Source selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSourceKind {
    #[default]
    Simulated,
    File,
}

impl std::fmt::Display for SensorSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorSourceKind::Simulated => write!(f, "simulated"),
            SensorSourceKind::File => write!(f, "file"),
        }
    }
}

/// Build the configured source; `file` needs a path
pub fn build_source(kind: SensorSourceKind, file: Option<&Path>) -> Result<Arc<dyn SensorSource>> {
    match kind {
        SensorSourceKind::Simulated => Ok(Arc::new(SimulatedSensorSource::default())),
        SensorSourceKind::File => {
            let path = file.ok_or_else(|| {
                HvacError::Sensor("sensor_source is `file` but no sensor_file is set".to_string())
            })?;
            Ok(Arc::new(FileSensorSource::new(path)))
        }
    }
}

/// Fixed readings for development hosts
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSensorSource {
    snapshot: SensorSnapshot,
}

impl Default for SimulatedSensorSource {
    fn default() -> Self {
        Self {
            snapshot: SensorSnapshot {
                temperature: 24.5,
                humidity: 55.0,
                co2_level: 400,
                occupancy: 1,
            },
        }
    }
}

impl SimulatedSensorSource {
    pub fn with_snapshot(snapshot: SensorSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SensorSource for SimulatedSensorSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn read(&self) -> Result<SensorSnapshot> {
        Ok(self.snapshot)
    }
}

/// Raw document written by the acquisition daemon; any field may be absent
#[derive(Debug, Default, Deserialize)]
struct RawReading {
    temperature: Option<f64>,
    humidity: Option<f64>,
    co2_level: Option<f64>,
    occupancy: Option<f64>,
}

impl RawReading {
    fn into_snapshot(self) -> SensorSnapshot {
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
        SensorSnapshot {
            temperature: finite(self.temperature).map_or(DEFAULT_TEMPERATURE, round2),
            humidity: finite(self.humidity).map_or(DEFAULT_HUMIDITY, round2),
            co2_level: finite(self.co2_level)
                .filter(|v| *v >= 0.0)
                .map_or(DEFAULT_CO2_LEVEL, |v| v.round().min(u32::MAX as f64) as u32),
            occupancy: finite(self.occupancy)
                .map_or(DEFAULT_OCCUPANCY, |v| u8::from(v >= 0.5)),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Reads the latest readings from a JSON file
///
/// Missing or null fields are replaced by the defaults. A missing or
/// unparseable file is an error; the loop substitutes the default snapshot.
#[derive(Debug, Clone)]
pub struct FileSensorSource {
    path: PathBuf,
}

impl FileSensorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SensorSource for FileSensorSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self) -> Result<SensorSnapshot> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            HvacError::Sensor(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let raw: RawReading = serde_json::from_str(&content).map_err(|e| {
            HvacError::Sensor(format!("malformed reading in {}: {}", self.path.display(), e))
        })?;

        let snapshot = raw.into_snapshot();
        debug!(
            temperature = snapshot.temperature,
            humidity = snapshot.humidity,
            co2_level = snapshot.co2_level,
            occupancy = snapshot.occupancy,
            "Sensor reading loaded"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_simulated_readings() {
        let snapshot = SimulatedSensorSource::default().read().await.unwrap();
        assert_eq!(snapshot.temperature, 24.5);
        assert_eq!(snapshot.humidity, 55.0);
        assert_eq!(snapshot.co2_level, 400);
        assert_eq!(snapshot.occupancy, 1);
    }

    #[tokio::test]
    async fn test_file_source_full_reading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reading.json");
        fs::write(
            &path,
            r#"{"temperature": 23.456, "humidity": 41.2, "co2_level": 812, "occupancy": 1}"#,
        )
        .unwrap();

        let snapshot = FileSensorSource::new(&path).read().await.unwrap();
        assert_eq!(
            snapshot,
            SensorSnapshot {
                temperature: 23.46,
                humidity: 41.2,
                co2_level: 812,
                occupancy: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_file_source_missing_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reading.json");
        fs::write(&path, r#"{"temperature": null, "co2_level": 650}"#).unwrap();

        let snapshot = FileSensorSource::new(&path).read().await.unwrap();
        assert_eq!(snapshot.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(snapshot.humidity, DEFAULT_HUMIDITY);
        assert_eq!(snapshot.co2_level, 650);
        assert_eq!(snapshot.occupancy, DEFAULT_OCCUPANCY);
    }

    #[tokio::test]
    async fn test_file_source_errors() {
        let dir = TempDir::new().unwrap();
        let source = FileSensorSource::new(dir.path().join("absent.json"));
        assert!(matches!(source.read().await, Err(HvacError::Sensor(_))));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileSensorSource::new(&path).read().await,
            Err(HvacError::Sensor(_))
        ));
    }

    #[test]
    fn test_build_source() {
        assert_eq!(
            build_source(SensorSourceKind::Simulated, None).unwrap().name(),
            "simulated"
        );
        assert!(build_source(SensorSourceKind::File, None).is_err());
        assert_eq!(
            build_source(SensorSourceKind::File, Some(Path::new("/tmp/x.json")))
                .unwrap()
                .name(),
            "file"
        );
    }
}
