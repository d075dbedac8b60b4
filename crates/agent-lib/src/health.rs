//! Component health for the HVAC agent
//!
//! Backs the `/healthz` and `/readyz` endpoints. The control loop reports
//! on the sensors, predictor and actuators every cycle; the retrain worker
//! reports on the trainer. Each entry remembers when its status last
//! changed and how many reports in a row were not healthy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Parts of the agent that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Sensors,
    Predictor,
    Actuators,
    Trainer,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Sensors,
        Component::Predictor,
        Component::Actuators,
        Component::Trainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Sensors => "sensors",
            Component::Predictor => "predictor",
            Component::Actuators => "actuators",
            Component::Trainer => "trainer",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, with a fallback or a stale result
    Degraded,
    Unhealthy,
}

/// Latest report for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
    /// When `status` last changed
    pub since_timestamp: i64,
    /// Reports in a row that were not healthy
    pub consecutive_failures: u32,
}

impl ComponentHealth {
    fn initial() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: now,
            since_timestamp: now,
            consecutive_failures: 0,
        }
    }

    /// Fold a new report into this entry, returning the previous status
    fn record(&mut self, status: ComponentStatus, message: Option<String>) -> ComponentStatus {
        let now = chrono::Utc::now().timestamp();
        let previous = self.status;
        if previous != status {
            self.since_timestamp = now;
        }
        self.consecutive_failures = match status {
            ComponentStatus::Healthy => 0,
            _ => self.consecutive_failures.saturating_add(1),
        };
        self.status = status;
        self.message = message;
        self.last_check_timestamp = now;
        previous
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &BTreeMap<Component, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared, cloneable view of component health and loop readiness
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    /// Empty registry; components appear on their first report
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every HVAC component registered as healthy
    pub async fn with_hvac_components() -> Self {
        let registry = Self::new();
        {
            let mut components = registry.components.write().await;
            for component in Component::ALL {
                components.insert(component, ComponentHealth::initial());
            }
        }
        registry
    }

    async fn report(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let mut components = self.components.write().await;
        let entry = components
            .entry(component)
            .or_insert_with(ComponentHealth::initial);
        let previous = entry.record(status, message);

        if previous != status {
            match status {
                ComponentStatus::Healthy => {
                    info!(component = %component, from = ?previous, "Component recovered")
                }
                _ => warn!(
                    component = %component,
                    from = ?previous,
                    to = ?status,
                    message = entry.message.as_deref().unwrap_or(""),
                    "Component health changed"
                ),
            }
        }
    }

    pub async fn set_healthy(&self, component: Component) {
        self.report(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Set once the control loop has completed a cycle
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn get(&self, component: Component) -> Option<ComponentHealth> {
        self.components.read().await.get(&component).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready after the first cycle while no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Control loop has not completed a cycle".to_string()),
            };
        }

        let components = self.components.read().await;
        let failing = components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);
        match failing {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{} unhealthy: {}", component, message),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hvac_components_start_healthy() {
        let registry = HealthRegistry::with_hvac_components().await;
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 4);
        for component in Component::ALL {
            assert_eq!(health.components[&component].status, ComponentStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_degraded_actuators_degrade_overall() {
        let registry = HealthRegistry::with_hvac_components().await;
        registry
            .set_degraded(Component::Actuators, "delivery to home/hvac/fan not confirmed")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.components[&Component::Actuators].message.is_some());
    }

    #[tokio::test]
    async fn test_unhealthy_predictor() {
        let registry = HealthRegistry::with_hvac_components().await;
        registry
            .set_unhealthy(Component::Predictor, "training dataset not found")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.set_healthy(Component::Predictor).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_consecutive_failures_reset_on_recovery() {
        let registry = HealthRegistry::with_hvac_components().await;
        for _ in 0..3 {
            registry.set_degraded(Component::Sensors, "read timed out").await;
        }
        let sensors = registry.get(Component::Sensors).await.unwrap();
        assert_eq!(sensors.consecutive_failures, 3);
        assert_eq!(sensors.status, ComponentStatus::Degraded);
        assert!(sensors.since_timestamp <= sensors.last_check_timestamp);

        registry.set_healthy(Component::Sensors).await;
        let sensors = registry.get(Component::Sensors).await.unwrap();
        assert_eq!(sensors.consecutive_failures, 0);
        assert!(sensors.message.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_component_appears_on_report() {
        let registry = HealthRegistry::new();
        assert!(registry.get(Component::Trainer).await.is_none());

        registry.set_degraded(Component::Trainer, "last retrain failed").await;
        let health = registry.health().await;
        assert_eq!(health.components.len(), 1);
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[test]
    fn test_components_serialize_by_name() {
        let mut components = BTreeMap::new();
        components.insert(Component::Trainer, ComponentHealth::initial());
        let response = HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["trainer"]["consecutive_failures"], 0);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_ready_when_set() {
        let registry = HealthRegistry::with_hvac_components().await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_component() {
        let registry = HealthRegistry::with_hvac_components().await;
        registry.set_ready(true).await;
        registry.set_unhealthy(Component::Sensors, "bus error").await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("sensors unhealthy: bus error"));
    }
}
