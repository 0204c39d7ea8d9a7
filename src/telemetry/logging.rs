//! Logging
//!
//! Call context carried into structured `tracing` events, and subscriber
//! setup for binaries embedding this crate.

use rand::Rng;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Placeholder rendered for unset context fields.
const UNSET: &str = "-";

/// Context of the call being protected or resolved.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// Operation name (e.g. `oauth.refresh`, `messages.create`).
    pub operation: Option<String>,
    /// Correlation ID of the originating request.
    pub correlation_id: Option<String>,
    /// Credential key involved, if any.
    pub credential: Option<String>,
    /// Additional context.
    pub extra: HashMap<String, String>,
}

impl LogContext {
    /// Create new log context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `operation` with a fresh correlation ID.
    pub fn for_operation(operation: impl Into<String>) -> Self {
        Self::new()
            .operation(operation)
            .correlation_id(generate_correlation_id())
    }

    /// Set operation.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set correlation ID.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set credential key.
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Add extra context.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn operation_name(&self) -> &str {
        self.operation.as_deref().unwrap_or(UNSET)
    }

    pub fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(UNSET)
    }

    pub fn credential_key(&self) -> &str {
        self.credential.as_deref().unwrap_or(UNSET)
    }
}

/// Random 16-hex-digit correlation ID.
pub fn generate_correlation_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`.
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(format: LogFormat, default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
