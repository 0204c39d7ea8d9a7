//! Telemetry
//!
//! Observability for credential resolution and upstream protection.
//!
//! This module provides:
//!
//! - **Logging**: Call context for structured `tracing` events
//! - **Metrics**: Refresh counters
//! - **Health**: Serializable report for dashboards

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{HealthReport, HealthStatus};
pub use logging::{generate_correlation_id, init_logging, LogContext, LogFormat};
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
