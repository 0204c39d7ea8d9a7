//! Circuit breaker registry: one breaker per named target.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus};
use crate::error::ResilienceResult;

/// Name → breaker map, created at startup and shared by every caller.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Registry whose implicitly created breakers use `default_config`.
    pub fn new(default_config: CircuitBreakerConfig) -> ResilienceResult<Self> {
        default_config.validate()?;
        Ok(Self {
            default_config,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Breaker for `name`, created with the default config on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(circuit = name, "creating circuit breaker");
                Arc::new(CircuitBreaker::with_validated(
                    name.to_string(),
                    self.default_config.clone(),
                ))
            })
            .clone()
    }

    /// Breaker for `name`, created with `config` on first use. An existing
    /// breaker keeps its original config.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ResilienceResult<Arc<CircuitBreaker>> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        let created = Arc::new(CircuitBreaker::new(name, config)?);
        let mut breakers = self.breakers.lock();
        Ok(breakers.entry(name.to_string()).or_insert(created).clone())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    /// Status of every breaker, ordered by name.
    pub fn statuses(&self) -> Vec<CircuitBreakerStatus> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        let mut statuses: Vec<CircuitBreakerStatus> =
            breakers.iter().map(|breaker| breaker.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Drop every breaker. Outstanding `Arc`s keep working but are no longer
    /// reachable by name.
    pub fn clear(&self) {
        self.breakers.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self {
            default_config: CircuitBreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ResilienceError};
    use crate::resilience::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_same_name_same_breaker() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("messages");
        let b = registry.get_or_create("messages");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_custom_config_validated() {
        let registry = CircuitBreakerRegistry::default();
        let bad = CircuitBreakerConfig {
            success_threshold: 0,
            ..Default::default()
        };
        assert!(registry.get_or_create_with("x", bad).is_err());
        assert!(registry.is_empty());

        let custom = CircuitBreakerConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let breaker = registry.get_or_create_with("x", custom).unwrap();
        assert_eq!(breaker.config().timeout, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_statuses_and_reset_all() {
        let registry = CircuitBreakerRegistry::default();
        let token = registry.get_or_create("token");
        registry.get_or_create("api");

        for _ in 0..5 {
            let _: Result<(), _> = token
                .execute(|| async {
                    Err(ResilienceError::from(ProviderError::ServerError {
                        status: 500,
                        message: "boom".to_string(),
                        retry_after: None,
                    }))
                })
                .await;
        }

        let statuses = registry.statuses();
        let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api", "token"]);
        assert_eq!(statuses[1].state, CircuitState::Open);

        registry.reset_all();
        assert_eq!(token.state(), CircuitState::Closed);

        registry.clear();
        assert!(registry.is_empty());
    }
}
