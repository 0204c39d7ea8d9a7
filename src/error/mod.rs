//! Error Types
//!
//! Error hierarchy shared by the credential manager, the circuit breaker and
//! the retry policy.

use std::time::Duration;
use thiserror::Error;

/// Network error codes treated as transient by the default retry condition.
pub const TRANSIENT_NETWORK_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EPIPE",
    "ENOTFOUND",
    "ENETUNREACH",
    "EAI_AGAIN",
];

/// HTTP status codes treated as retryable by the default retry condition.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 502, 503, 504];

/// Root error type.
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Fast-fail rejection; the wrapped operation was never invoked.
    #[error("Service unavailable: circuit '{name}' is open, retry in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("Retry budget exhausted after {attempts} attempt(s) in {elapsed:?}")]
    RetryTimeout { elapsed: Duration, attempts: u32 },
}

impl ResilienceError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::Credential(_) => "CREDENTIAL",
            Self::Network(_) => "NETWORK",
            Self::Provider(ProviderError::InvalidGrant { .. }) => "INVALID_GRANT",
            Self::Provider(ProviderError::RateLimited { .. }) => "RATE_LIMITED",
            Self::Provider(_) => "PROVIDER",
            Self::Storage(_) => "STORAGE",
            Self::Protocol(_) => "PROTOCOL",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::RetryTimeout { .. } => "RETRY_TIMEOUT",
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider(e) => e.status_code(),
            _ => None,
        }
    }

    /// Default retryability: timeouts, upstream and rate-limit failures,
    /// transient network codes and the retryable status codes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Provider(ProviderError::InvalidGrant { .. }) => false,
            Self::Provider(ProviderError::RateLimited { .. }) => true,
            Self::Provider(ProviderError::ServerError { .. }) => true,
            Self::Provider(e) => e
                .status_code()
                .map(|status| RETRYABLE_STATUS_CODES.contains(&status))
                .unwrap_or(false),
            Self::RetryTimeout { .. } => true,
            _ => false,
        }
    }

    /// Server-provided delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after }) => *retry_after,
            Self::Provider(ProviderError::ServerError { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }

    /// Check if the error requires out-of-band re-authentication.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::InvalidGrant { .. })
                | Self::Credential(CredentialError::NoRefreshToken { .. })
                | Self::Credential(CredentialError::Invalid { .. })
        )
    }

    /// Check if the failure says something about upstream health.
    ///
    /// Client errors (4xx, including 429 and `invalid_grant`) mean the
    /// upstream answered and never count against the circuit.
    pub fn trips_circuit(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Provider(ProviderError::ServerError { .. }) => true,
            Self::Protocol(ProtocolError::InvalidJson { .. }) => true,
            Self::RetryTimeout { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a circuit breaker fast-fail.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown retry preset: {name}")]
    UnknownPreset { name: String },
}

/// Credential lifecycle error.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credential for key: {key}")]
    NotFound { key: String },

    #[error("Invalid credential {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Credential {key} is expired and has no refresh token")]
    NoRefreshToken { key: String },

    #[error("No usable credential for {key}")]
    Unavailable { key: String },

    #[error("No credential mapped for domain: {domain}")]
    UnmappedDomain { domain: String },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Connection reset: {message}")]
    ConnectionReset { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Transport error ({code}): {message}")]
    Other { code: String, message: String },
}

impl NetworkError {
    /// Canonical error code, in the errno style used by the retry condition.
    pub fn code(&self) -> &str {
        match self {
            Self::ConnectionFailed { .. } => "ECONNREFUSED",
            Self::ConnectionReset { .. } => "ECONNRESET",
            Self::Timeout { .. } => "ETIMEDOUT",
            Self::Other { code, .. } => code.as_str(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        TRANSIENT_NETWORK_CODES.contains(&self.code())
    }
}

/// Upstream (token endpoint or API) error.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Refresh token is dead; terminal until re-authorized.
    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Client error {status}: {message}")]
    ClientError { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error {status}: {message}")]
    ServerError {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
}

impl ProviderError {
    /// HTTP status associated with the error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::InvalidGrant { .. } => Some(400),
            Self::InvalidClient { .. } => Some(401),
            Self::ClientError { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status, .. } => Some(*status),
        }
    }
}

/// Durable storage error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read failed for {key}: {message}")]
    ReadFailed { key: String, message: String },

    #[error("Write failed for {key}: {message}")]
    WriteFailed { key: String, message: String },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Result type for this crate.
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// OAuth error body returned by the token endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuthErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Map a non-2xx response to an error.
///
/// `invalid_grant` or a bare 400 is the terminal refresh failure.
pub fn create_error_from_response(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> ResilienceError {
    let parsed = parse_error_response(body);
    let message = match &parsed {
        Some(response) => response
            .error_description
            .clone()
            .unwrap_or_else(|| response.error.clone()),
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => body.trim().chars().take(512).collect(),
    };

    if let Some(response) = &parsed {
        match response.error.as_str() {
            "invalid_grant" => return ProviderError::InvalidGrant { message }.into(),
            "invalid_client" => {
                return ProviderError::InvalidClient {
                    error_description: response.error_description.clone(),
                }
                .into()
            }
            _ => {}
        }
    }

    let error = match status {
        400 => ProviderError::InvalidGrant { message },
        401 => ProviderError::InvalidClient {
            error_description: Some(message),
        },
        429 => ProviderError::RateLimited { retry_after },
        500..=599 => ProviderError::ServerError {
            status,
            message,
            retry_after,
        },
        _ => ProviderError::ClientError { status, message },
    };

    error.into()
}
