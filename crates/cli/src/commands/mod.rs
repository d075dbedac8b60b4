//! Subcommand implementations

pub mod agent;
pub mod model;
