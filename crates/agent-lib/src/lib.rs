//! Agent library for predictive HVAC control
//!
//! This crate provides the core functionality for:
//! - Training and serving the desired-temperature model
//! - Deciding fan/heater/cooler states against a setpoint
//! - Driving relays or networked smart devices
//! - The periodic control loop and continuous learning
//! - Health checks and observability

pub mod actuator;
pub mod control;
pub mod dataset;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod policy;
pub mod predictor;
pub mod sensors;

pub use error::{HvacError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HvacMetrics, StructuredLogger};
