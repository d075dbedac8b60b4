//! Actuator backends
//!
//! A backend executes an [`ActuatorCommand`] on real or simulated devices.
//! The control loop only sees the [`ActuatorBackend`] trait; which
//! implementation runs is decided by configuration, never by probing.

mod mqtt;
mod relay;
mod simulated;

pub use mqtt::{MqttSettings, MqttTopics, NetworkedBackend, Publisher, RumqttPublisher};
pub use relay::{DirectBackend, GpioSettings, MemoryPin, RelayLines, SysfsPin, SysfsPinError};
pub use simulated::SimulatedBackend;

use crate::error::Result;
use crate::models::ActuatorCommand;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Executes actuator commands
#[async_trait]
pub trait ActuatorBackend: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Drive every actuator to the state the command asks for
    async fn apply(&self, command: &ActuatorCommand) -> Result<()>;

    /// Release owned resources (lines, broker connection)
    async fn shutdown(&self) -> Result<()>;
}

/// Backend selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relays on GPIO output lines
    Direct,
    /// Smart devices behind an MQTT broker
    Networked,
    /// In-memory only
    #[default]
    Simulated,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Direct => write!(f, "direct"),
            BackendKind::Networked => write!(f, "networked"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Acquire the resources for `kind` and return a ready backend
///
/// Direct backends switch every line off before returning. Networked
/// backends wait for the broker to accept the connection.
pub async fn build_backend(
    kind: BackendKind,
    gpio: &GpioSettings,
    mqtt: &MqttSettings,
) -> Result<Arc<dyn ActuatorBackend>> {
    let backend: Arc<dyn ActuatorBackend> = match kind {
        BackendKind::Direct => {
            let lines = RelayLines::<SysfsPin>::acquire(gpio)?;
            Arc::new(DirectBackend::new(lines)?)
        }
        BackendKind::Networked => {
            let publisher = RumqttPublisher::connect(mqtt).await?;
            Arc::new(NetworkedBackend::new(publisher, mqtt.topics()))
        }
        BackendKind::Simulated => Arc::new(SimulatedBackend::new()),
    };

    info!(backend = backend.name(), "Actuator backend ready");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"networked\"").unwrap();
        assert_eq!(kind, BackendKind::Networked);
        assert_eq!(BackendKind::default(), BackendKind::Simulated);
        assert_eq!(BackendKind::Direct.to_string(), "direct");
    }

    #[tokio::test]
    async fn test_build_simulated_backend() {
        let backend = build_backend(
            BackendKind::Simulated,
            &GpioSettings::default(),
            &MqttSettings::default(),
        )
        .await
        .unwrap();
        assert_eq!(backend.name(), "simulated");
        backend.apply(&ActuatorCommand::heating()).await.unwrap();
    }
}
