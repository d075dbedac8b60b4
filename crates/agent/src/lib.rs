//! Process wiring for the HVAC agent: configuration, the HTTP API and
//! shutdown signals

pub mod api;
pub mod config;
pub mod signals;
