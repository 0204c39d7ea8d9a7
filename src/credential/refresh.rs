//! Token Refresh
//!
//! Refresh-token grant against the token endpoint, run under retry and the
//! token endpoint circuit breaker.

use std::sync::Arc;

use crate::core::{HttpRequest, HttpTransport};
use crate::error::{create_error_from_response, CredentialError, ProtocolError, ResilienceResult};
use crate::resilience::{execute_resilient, CircuitBreaker, RetryConfig};
use crate::telemetry::LogContext;
use crate::types::{now_millis, OAuthClientConfig, OAuthTokens, RefreshTokenRequest, TokenResponse};

/// Exchanges refresh tokens for new access tokens.
pub struct TokenRefresher<T: HttpTransport> {
    transport: Arc<T>,
    config: OAuthClientConfig,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
}

impl<T: HttpTransport> TokenRefresher<T> {
    pub fn new(
        transport: Arc<T>,
        config: OAuthClientConfig,
        retry: RetryConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            transport,
            config,
            retry,
            breaker,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Refresh `current`, returning the replacement token set.
    ///
    /// `invalid_grant` and other client errors come back on the first
    /// attempt; transient failures are retried while the circuit allows.
    pub async fn refresh(
        &self,
        current: &OAuthTokens,
        context: &LogContext,
    ) -> ResilienceResult<OAuthTokens> {
        let refresh_token = current
            .refresh_token()
            .ok_or_else(|| CredentialError::NoRefreshToken {
                key: context.credential_key().to_string(),
            })?;

        let body = serde_json::to_string(&RefreshTokenRequest::new(
            &self.config.client_id,
            refresh_token,
        ))
        .map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?;

        let response = execute_resilient(&self.breaker, &self.retry, context, || {
            self.request_once(body.clone())
        })
        .await?;

        Ok(response.into_tokens(current, now_millis()))
    }

    async fn request_once(&self, body: String) -> ResilienceResult<TokenResponse> {
        let mut request = HttpRequest::post_json(self.config.token_endpoint.as_str(), body)
            .timeout(self.config.timeout);
        if let Some(beta) = &self.config.beta_header {
            request = request.header(beta.name.as_str(), beta.value.as_str());
        }

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(create_error_from_response(
                response.status,
                &response.body,
                response.retry_after(),
            ));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            ProtocolError::InvalidJson {
                message: format!("token response: {}", e),
            }
            .into()
        })
    }
}
