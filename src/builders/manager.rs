//! Credential Manager Builder
//!
//! Fluent builder for [`CredentialManager`] and its configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::core::HttpTransport;
use crate::credential::{CredentialManager, CredentialStore, DomainCredentialMapping};
use crate::error::{ConfigurationError, ResilienceResult};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, RetryConfig};
use crate::types::{BetaHeader, CredentialKey, CredentialManagerConfig, OAuthClientConfig};

/// Credential manager builder.
#[derive(Default)]
pub struct CredentialManagerBuilder {
    oauth: Option<OAuthClientConfig>,
    client_id: Option<String>,
    token_endpoint: Option<String>,
    beta_header: Option<Option<BetaHeader>>,
    token_timeout: Option<Duration>,
    refresh_buffer: Option<Duration>,
    failure_cooldown: Option<Duration>,
    retry: Option<RetryConfig>,
    retry_preset: Option<String>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    circuit_name: Option<String>,
    api_key_header: Option<String>,
    mapping: DomainCredentialMapping,
    registry: Option<Arc<CircuitBreakerRegistry>>,
}

impl CredentialManagerBuilder {
    /// Create new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a complete OAuth client config. Individual OAuth setters applied
    /// afterwards still override its fields.
    pub fn oauth_config(mut self, config: OAuthClientConfig) -> Self {
        self.oauth = Some(config);
        self
    }

    /// Set OAuth client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set the provider beta header.
    pub fn beta_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.beta_header = Some(Some(BetaHeader::new(name, value)));
        self
    }

    /// Send no beta header.
    pub fn without_beta_header(mut self) -> Self {
        self.beta_header = Some(None);
        self
    }

    /// Set token endpoint request timeout.
    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = Some(timeout);
        self
    }

    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    pub fn failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = Some(cooldown);
        self
    }

    /// Set retry policy for refresh calls.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self.retry_preset = None;
        self
    }

    /// Select a named retry preset, resolved on build.
    pub fn retry_preset(mut self, name: impl Into<String>) -> Self {
        self.retry_preset = Some(name.into());
        self.retry = None;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn circuit_name(mut self, name: impl Into<String>) -> Self {
        self.circuit_name = Some(name.into());
        self
    }

    pub fn api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = Some(header.into());
        self
    }

    /// Append a domain mapping entry.
    pub fn map_domain(mut self, domain: impl Into<String>, key: impl Into<CredentialKey>) -> Self {
        self.mapping = self.mapping.with(domain, key);
        self
    }

    /// Replace the domain mapping.
    pub fn mapping(mut self, mapping: DomainCredentialMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Share a breaker registry with other components.
    pub fn registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Assemble and validate the configuration.
    pub fn config(&self) -> ResilienceResult<CredentialManagerConfig> {
        let mut oauth = match (&self.oauth, &self.client_id, &self.token_endpoint) {
            (Some(oauth), _, _) => oauth.clone(),
            (None, Some(client_id), Some(endpoint)) => {
                OAuthClientConfig::new(client_id.clone(), endpoint.clone())
            }
            (None, None, _) => {
                return Err(ConfigurationError::MissingRequired {
                    field: "client_id".to_string(),
                }
                .into())
            }
            (None, _, None) => {
                return Err(ConfigurationError::MissingRequired {
                    field: "token_endpoint".to_string(),
                }
                .into())
            }
        };

        if let Some(client_id) = &self.client_id {
            oauth.client_id = client_id.clone();
        }
        if let Some(endpoint) = &self.token_endpoint {
            oauth.token_endpoint = endpoint.clone();
        }
        if let Some(beta) = &self.beta_header {
            oauth.beta_header = beta.clone();
        }
        if let Some(timeout) = self.token_timeout {
            oauth.timeout = timeout;
        }

        let mut config = CredentialManagerConfig::new(oauth);
        if let Some(buffer) = self.refresh_buffer {
            config.refresh_buffer = buffer;
        }
        if let Some(cooldown) = self.failure_cooldown {
            config.failure_cooldown = cooldown;
        }
        if let Some(retry) = &self.retry {
            config.retry = retry.clone();
        }
        if let Some(preset) = &self.retry_preset {
            config.retry = RetryConfig::preset(preset)?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            config.circuit_breaker = breaker.clone();
        }
        if let Some(name) = &self.circuit_name {
            config.circuit_name = name.clone();
        }
        if let Some(header) = &self.api_key_header {
            config.api_key_header = header.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Build the credential manager.
    pub fn build<T: HttpTransport, S: CredentialStore>(
        self,
        transport: Arc<T>,
        store: Arc<S>,
    ) -> ResilienceResult<CredentialManager<T, S>> {
        let config = self.config()?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone())?),
        };
        CredentialManager::new(config, transport, store, registry, self.mapping)
    }
}

/// Create a new credential manager builder.
pub fn credential_manager() -> CredentialManagerBuilder {
    CredentialManagerBuilder::new()
}
