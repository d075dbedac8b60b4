//! Core data models for the HVAC agent

use serde::{Deserialize, Serialize};

/// Number of model input features
pub const NUM_FEATURES: usize = 4;

/// Feature column names, in model input order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["temperature", "humidity", "co2_level", "occupancy"];

/// Label column name
pub const LABEL_NAME: &str = "desired_temperature";

/// Substitutes used when a physical reading is unavailable
pub const DEFAULT_TEMPERATURE: f64 = 22.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;
pub const DEFAULT_CO2_LEVEL: u32 = 400;
pub const DEFAULT_OCCUPANCY: u8 = 0;

/// One complete set of sensor readings taken together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    /// CO2 concentration, ppm
    pub co2_level: u32,
    /// 1 if the room is occupied, 0 otherwise
    pub occupancy: u8,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            humidity: DEFAULT_HUMIDITY,
            co2_level: DEFAULT_CO2_LEVEL,
            occupancy: DEFAULT_OCCUPANCY,
        }
    }
}

impl SensorSnapshot {
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.temperature,
            self.humidity,
            self.co2_level as f64,
            self.occupancy.min(1) as f64,
        ])
    }
}

/// Model input: `[temperature, humidity, co2_level, occupancy]`
///
/// The ordering is shared by training and inference. Changing it requires
/// refitting the scaler and the model together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; NUM_FEATURES]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// A snapshot paired with the temperature the occupant actually wanted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    #[serde(flatten)]
    pub snapshot: SensorSnapshot,
    pub desired_temperature: f64,
}

/// Operating mode of the HVAC plant for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Cooling,
    Heating,
    Idle,
}

impl std::fmt::Display for HvacMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HvacMode::Cooling => write!(f, "cooling"),
            HvacMode::Heating => write!(f, "heating"),
            HvacMode::Idle => write!(f, "idle"),
        }
    }
}

/// Electrical/logical state of one actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        matches!(self, SwitchState::On)
    }

    /// Wire payload for networked devices
    pub fn payload(self) -> &'static str {
        match self {
            SwitchState::On => "ON",
            SwitchState::Off => "OFF",
        }
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

/// The three logical actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Fan,
    Heater,
    Cooler,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Fan, Device::Heater, Device::Cooler];

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Fan => "fan",
            Device::Heater => "heater",
            Device::Cooler => "cooler",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target state for all actuators in one cycle
///
/// Built from an [`HvacMode`], so only the three legal combinations exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    mode: HvacMode,
}

impl ActuatorCommand {
    pub fn new(mode: HvacMode) -> Self {
        Self { mode }
    }

    pub fn cooling() -> Self {
        Self::new(HvacMode::Cooling)
    }

    pub fn heating() -> Self {
        Self::new(HvacMode::Heating)
    }

    pub fn idle() -> Self {
        Self::new(HvacMode::Idle)
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn fan(&self) -> SwitchState {
        (self.mode == HvacMode::Cooling).into()
    }

    pub fn cooler(&self) -> SwitchState {
        (self.mode == HvacMode::Cooling).into()
    }

    pub fn heater(&self) -> SwitchState {
        (self.mode == HvacMode::Heating).into()
    }

    pub fn state_of(&self, device: Device) -> SwitchState {
        match device {
            Device::Fan => self.fan(),
            Device::Heater => self.heater(),
            Device::Cooler => self.cooler(),
        }
    }
}

/// Outcome of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows: usize,
    pub fit_rows: usize,
    pub holdout_rows: usize,
    /// Mean absolute error on the holdout split, None if the split is empty
    pub holdout_mae: Option<f64>,
    /// Coefficient of determination on the holdout split
    pub holdout_r2: Option<f64>,
    pub duration_ms: u64,
    pub model_fingerprint: String,
    pub scaler_fingerprint: String,
    pub trained_at: i64,
}

/// What one control cycle did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub snapshot: SensorSnapshot,
    pub sensor_fallback: bool,
    pub predicted_temperature: Option<f64>,
    pub setpoint: f64,
    pub mode: Option<HvacMode>,
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub completed_at: i64,
}

/// Agent status as served by `GET /api/v1/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub zone: String,
    pub setpoint: f64,
    pub deadband: f64,
    pub backend: String,
    pub sensor_source: String,
    pub model_loaded: bool,
    pub total_inferences: u64,
    pub total_trainings: u64,
    pub model_fingerprint: Option<String>,
    pub scaler_fingerprint: Option<String>,
    pub last_cycle: Option<CycleReport>,
    pub last_training: Option<TrainingReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_order() {
        let snapshot = SensorSnapshot {
            temperature: 24.5,
            humidity: 55.0,
            co2_level: 400,
            occupancy: 1,
        };
        assert_eq!(snapshot.features().0, [24.5, 55.0, 400.0, 1.0]);
    }

    #[test]
    fn test_snapshot_json_keys() {
        let json = serde_json::to_value(SensorSnapshot::default()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        for key in FEATURE_NAMES {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(json["co2_level"], 400);
    }

    #[test]
    fn test_command_modes() {
        let cool = ActuatorCommand::cooling();
        assert_eq!((cool.fan(), cool.cooler(), cool.heater()), (SwitchState::On, SwitchState::On, SwitchState::Off));

        let heat = ActuatorCommand::heating();
        assert_eq!((heat.fan(), heat.cooler(), heat.heater()), (SwitchState::Off, SwitchState::Off, SwitchState::On));

        let idle = ActuatorCommand::idle();
        for device in Device::ALL {
            assert_eq!(idle.state_of(device), SwitchState::Off);
        }
    }

    #[test]
    fn test_labeled_sample_flattened() {
        let json = r#"{"temperature":23.0,"humidity":40.0,"co2_level":650,"occupancy":1,"desired_temperature":21.5}"#;
        let sample: LabeledSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.snapshot.co2_level, 650);
        assert_eq!(sample.desired_temperature, 21.5);
    }
}
