//! State shared between the control loop and the HTTP API

use crate::models::CycleReport;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest cycle outcome, readable while the loop runs
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    last_cycle: Arc<RwLock<Option<CycleReport>>>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, report: CycleReport) {
        *self.last_cycle.write().await = Some(report);
    }

    pub async fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.read().await.clone()
    }

    pub async fn cycles_completed(&self) -> u64 {
        self.last_cycle.read().await.as_ref().map_or(0, |r| r.cycle)
    }
}
