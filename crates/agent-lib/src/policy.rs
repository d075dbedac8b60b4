//! Actuation policy
//!
//! Compares the predicted desired temperature with the setpoint and picks
//! one of three modes. With the default zero deadband this is plain
//! bang-bang control: any difference switches the plant on.

use crate::models::{ActuatorCommand, HvacMode};
use serde::{Deserialize, Serialize};

/// Bang-bang decision with no tolerance
///
/// `predicted > desired` cools, `predicted < desired` heats, equal idles.
/// A NaN prediction idles.
pub fn decide(predicted: f64, desired: f64) -> ActuatorCommand {
    ActuationPolicy::default().decide(predicted, desired)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuationPolicy {
    /// Half-width in °C of the band around the setpoint that idles
    pub deadband: f64,
}

impl Default for ActuationPolicy {
    fn default() -> Self {
        Self { deadband: 0.0 }
    }
}

impl ActuationPolicy {
    /// Negative or non-finite deadbands are treated as zero
    pub fn with_deadband(deadband: f64) -> Self {
        let deadband = if deadband.is_finite() && deadband > 0.0 {
            deadband
        } else {
            0.0
        };
        Self { deadband }
    }

    pub fn decide(&self, predicted: f64, desired: f64) -> ActuatorCommand {
        let delta = predicted - desired;
        if !delta.is_finite() {
            return ActuatorCommand::idle();
        }

        let mode = if self.deadband > 0.0 && delta.abs() <= self.deadband {
            HvacMode::Idle
        } else if delta > 0.0 {
            HvacMode::Cooling
        } else if delta < 0.0 {
            HvacMode::Heating
        } else {
            HvacMode::Idle
        };
        ActuatorCommand::new(mode)
    }
}
