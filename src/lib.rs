//! Gateway Resilience
//!
//! Credential resolution and upstream protection for an API gateway that
//! fronts an LLM provider.
//!
//! # Features
//!
//! - Credential files holding API keys or OAuth tokens, keyed by path
//! - Proactive OAuth refresh with one in-flight refresh per credential
//! - Negative caching of failed refreshes
//! - Atomic write-then-rename persistence that keeps unknown file fields
//! - Circuit breaker with failure, success and error-rate windows
//! - Retry with jittered exponential backoff, budgets and `Retry-After`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gateway_resilience::{credential_manager, FileCredentialStore, ReqwestHttpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = credential_manager()
//!         .client_id("my-client-id")
//!         .token_endpoint("https://console.example.com/v1/oauth/token")
//!         .retry_preset("standard")
//!         .map_domain("api.example.com", "/etc/gateway/team-a.json")
//!         .map_domain("*", "/etc/gateway/default.json")
//!         .build(
//!             Arc::new(ReqwestHttpTransport::new()?),
//!             Arc::new(FileCredentialStore::new()),
//!         )?;
//!
//!     let headers = manager.authorization_headers_for_domain("api.example.com").await?;
//!     println!("{} auth headers", headers.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: Credential files, token wire types and configuration
//! - `error`: Error hierarchy with classification helpers
//! - `core`: HTTP transport seam
//! - `credential`: Stores, domain mapping, refresher and the manager
//! - `resilience`: Retry, circuit breaker and breaker registry
//! - `telemetry`: Logging context, refresh metrics and health report
//! - `builders`: Fluent builder for the manager

pub mod builders;
pub mod core;
pub mod credential;
pub mod error;
pub mod resilience;
pub mod telemetry;
pub mod types;

// Re-export builders
pub use builders::{credential_manager, CredentialManagerBuilder};

// Re-export errors
pub use error::{
    create_error_from_response, parse_error_response, ConfigurationError, CredentialError,
    NetworkError, OAuthErrorResponse, ProtocolError, ProviderError, ResilienceError,
    ResilienceResult, StorageError,
};

// Re-export types
pub use types::{
    BetaHeader, Credential, CredentialFile, CredentialKey, CredentialManagerConfig,
    CredentialType, OAuthClientConfig, OAuthTokens, TokenResponse,
};

// Re-export core components
pub use core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export credential management
pub use credential::{
    CredentialManager, CredentialStore, DomainCredentialMapping, FileCredentialStore,
    InMemoryCredentialStore, MockCredentialStore, TokenRefresher,
};

// Re-export resilience
pub use resilience::{
    execute_resilient, retry_with_backoff, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerHook, CircuitBreakerRegistry, CircuitBreakerStatus, CircuitState, RetryConfig,
    RetryExecutor, RetryPreset,
};

// Re-export telemetry
pub use telemetry::{
    init_logging, HealthReport, HealthStatus, LogContext, LogFormat, RefreshMetricsSnapshot,
};
