//! Predictive control loop
//!
//! One cycle reads a snapshot, predicts the desired temperature, decides
//! the actuator states against the setpoint and dispatches them. Failures
//! are contained in the cycle that hit them.

mod r#loop;
mod state;

pub use r#loop::{
    ControlConfig, ControlLoop, ControlLoopBuilder, DEFAULT_CYCLE_INTERVAL, DEFAULT_SETPOINT,
};
pub use state::ControlState;
