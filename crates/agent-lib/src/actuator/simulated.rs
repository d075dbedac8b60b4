//! Simulated backend for hosts with neither relays nor a broker

use super::ActuatorBackend;
use crate::error::Result;
use crate::models::ActuatorCommand;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Remembers the last command instead of driving anything
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    last: Mutex<Option<ActuatorCommand>>,
    applied: AtomicU64,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_command(&self) -> Option<ActuatorCommand> {
        self.last.lock().ok().and_then(|l| *l)
    }

    pub fn apply_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActuatorBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn apply(&self, command: &ActuatorCommand) -> Result<()> {
        info!(
            mode = %command.mode(),
            fan = command.fan().payload(),
            heater = command.heater().payload(),
            cooler = command.cooler().payload(),
            "Simulated actuation"
        );
        if let Ok(mut last) = self.last.lock() {
            *last = Some(*command);
        }
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(ActuatorCommand::idle());
        }
        Ok(())
    }
}
