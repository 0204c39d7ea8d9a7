//! Health reporting for dashboards. Read-only.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metrics::RefreshMetricsSnapshot;
use crate::resilience::{CircuitBreakerRegistry, CircuitBreakerStatus, CircuitState};

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// At least one circuit is open or probing.
    Degraded,
}

/// Refresh metrics and every breaker's status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub generated_at: DateTime<Utc>,
    pub refresh: RefreshMetricsSnapshot,
    pub circuits: Vec<CircuitBreakerStatus>,
}

impl HealthReport {
    pub fn new(refresh: RefreshMetricsSnapshot, circuits: Vec<CircuitBreakerStatus>) -> Self {
        let status = if circuits.iter().all(|c| c.state == CircuitState::Closed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            generated_at: Utc::now(),
            refresh,
            circuits,
        }
    }

    pub fn collect(refresh: RefreshMetricsSnapshot, registry: &CircuitBreakerRegistry) -> Self {
        Self::new(refresh, registry.statuses())
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
