//! Configuration Types
//!
//! Credential manager and OAuth client configuration.

use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, ResilienceError, ResilienceResult};
use crate::resilience::{CircuitBreakerConfig, RetryConfig, RetryPreset};

/// Refresh tokens this long before they expire.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);

/// Suppress refresh attempts for this long after a failure.
pub const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Header carrying a raw API key.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Provider beta header sent with OAuth bearer tokens.
pub const DEFAULT_BETA_HEADER_NAME: &str = "anthropic-beta";
pub const DEFAULT_OAUTH_BETA: &str = "oauth-2025-04-20";

/// Circuit name guarding the token endpoint.
pub const TOKEN_ENDPOINT_CIRCUIT: &str = "oauth-token-endpoint";

/// Default HTTP timeout for the token endpoint.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider-specific header added to OAuth traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetaHeader {
    pub name: String,
    pub value: String,
}

impl BetaHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Default for BetaHeader {
    fn default() -> Self {
        Self::new(DEFAULT_BETA_HEADER_NAME, DEFAULT_OAUTH_BETA)
    }
}

/// OAuth client settings for the refresh-token grant.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    /// Public client identifier.
    pub client_id: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Beta header sent on refresh and on bearer traffic.
    pub beta_header: Option<BetaHeader>,
    /// HTTP timeout for a single refresh call.
    pub timeout: Duration,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, token_endpoint: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token_endpoint: token_endpoint.into(),
            beta_header: Some(BetaHeader::default()),
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    /// Load from `GATEWAY_OAUTH_*` environment variables.
    ///
    /// `GATEWAY_OAUTH_BETA` set to an empty string disables the beta header.
    pub fn from_env() -> ResilienceResult<Self> {
        let client_id = required_env("GATEWAY_OAUTH_CLIENT_ID")?;
        let token_endpoint = required_env("GATEWAY_OAUTH_TOKEN_ENDPOINT")?;

        let beta_header = match std::env::var("GATEWAY_OAUTH_BETA") {
            Ok(value) if value.is_empty() => None,
            Ok(value) => Some(BetaHeader::new(DEFAULT_BETA_HEADER_NAME, value)),
            Err(_) => Some(BetaHeader::default()),
        };

        let timeout = match std::env::var("GATEWAY_OAUTH_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigurationError::InvalidValue {
                    field: "GATEWAY_OAUTH_TIMEOUT_SECS".to_string(),
                    message: e.to_string(),
                })?,
            Err(_) => DEFAULT_TOKEN_TIMEOUT,
        };

        let config = Self {
            client_id,
            token_endpoint,
            beta_header,
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parsed token endpoint. Only absolute http(s) URLs with a host pass.
    pub fn token_endpoint_url(&self) -> ResilienceResult<Url> {
        let invalid = |message: String| -> ResilienceError {
            ConfigurationError::InvalidValue {
                field: "token_endpoint".to_string(),
                message,
            }
            .into()
        };

        let url = Url::parse(&self.token_endpoint)
            .map_err(|e| invalid(format!("{}: {}", self.token_endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid(format!("missing host: {}", self.token_endpoint)));
        }
        Ok(url)
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if self.client_id.is_empty() {
            return Err(missing("client_id"));
        }
        if self.token_endpoint.is_empty() {
            return Err(missing("token_endpoint"));
        }
        self.token_endpoint_url()?;
        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                field: "timeout".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Credential manager configuration.
#[derive(Clone, Debug)]
pub struct CredentialManagerConfig {
    /// Refresh when the token expires within this window.
    pub refresh_buffer: Duration,
    /// Negative-cache lifetime after a failed refresh.
    pub failure_cooldown: Duration,
    /// Token endpoint client settings.
    pub oauth: OAuthClientConfig,
    /// Retry policy around the refresh call.
    pub retry: RetryConfig,
    /// Circuit breaker settings for the token endpoint.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Name of the token endpoint circuit in the registry.
    pub circuit_name: String,
    /// Header used for API key credentials.
    pub api_key_header: String,
}

impl CredentialManagerConfig {
    pub fn new(oauth: OAuthClientConfig) -> Self {
        Self {
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
            oauth,
            retry: RetryPreset::Standard.config(),
            circuit_breaker: CircuitBreakerConfig::default(),
            circuit_name: TOKEN_ENDPOINT_CIRCUIT.to_string(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        self.oauth.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        if self.failure_cooldown.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                field: "failure_cooldown".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.circuit_name.is_empty() {
            return Err(missing("circuit_name"));
        }
        if self.api_key_header.is_empty() {
            return Err(missing("api_key_header"));
        }
        Ok(())
    }
}

fn required_env(name: &str) -> ResilienceResult<String> {
    std::env::var(name).map_err(|_| {
        ConfigurationError::MissingRequired {
            field: name.to_string(),
        }
        .into()
    })
}

fn missing(field: &str) -> ResilienceError {
    ConfigurationError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}
