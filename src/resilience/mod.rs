//! Resilience
//!
//! Protection for calls to the upstream provider.
//!
//! This module provides:
//!
//! - **Retry**: Exponential backoff with jitter, budget and `Retry-After`
//! - **Circuit Breaker**: Fail fast while a target is unhealthy
//! - **Registry**: Process-wide name to breaker map
//!
//! [`execute_resilient`] composes the two: retry is outermost and every
//! attempt passes through the breaker, so an open circuit stops the retry
//! loop instead of hammering the target.

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

use std::future::Future;

use crate::error::ResilienceResult;
use crate::telemetry::LogContext;

// Retry
pub use retry::{
    apply_jitter, compute_backoff, parse_retry_after, parse_retry_after_at, retry_delay,
    retry_with_backoff, RetryCondition, RetryConfig, RetryExecutor, RetryPreset, RetryStats,
};

// Circuit Breaker
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitBreakerStats,
    CircuitBreakerStatus, CircuitState,
};

// Registry
pub use registry::CircuitBreakerRegistry;

/// Run `operation` with retries, each attempt guarded by `breaker`.
///
/// A `CircuitOpen` rejection is not retryable, so the loop ends as soon as
/// the circuit opens.
pub async fn execute_resilient<T, F, Fut>(
    breaker: &CircuitBreaker,
    retry: &RetryConfig,
    context: &LogContext,
    mut operation: F,
) -> ResilienceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResilienceResult<T>>,
{
    retry_with_backoff(
        move || {
            let attempt = operation();
            breaker.execute(move || attempt)
        },
        retry,
        context,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ResilienceError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_stops_retries() {
        let breaker = CircuitBreaker::new(
            "upstream",
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let retry = RetryPreset::Aggressive
            .config()
            .with_initial_delay(Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<()> =
            execute_resilient(&breaker, &retry, &LogContext::for_operation("test"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::ServerError {
                    status: 503,
                    message: "unavailable".to_string(),
                    retry_after: None,
                }
                .into())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let breaker = CircuitBreaker::new("upstream", CircuitBreakerConfig::default()).unwrap();
        let calls = AtomicU32::new(0);

        let result = execute_resilient(
            &breaker,
            &RetryPreset::Fast.config(),
            &LogContext::new(),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::ServerError {
                        status: 502,
                        message: "bad gateway".to_string(),
                        retry_after: None,
                    }
                    .into())
                } else {
                    Ok("ok")
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(breaker.status().failure_count, 0);
    }
}
