//! Retry Logic
//!
//! Exponential backoff with additive jitter, an overall elapsed-time budget
//! and `Retry-After` support.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ConfigurationError, ResilienceError, ResilienceResult};
use crate::telemetry::LogContext;

/// Predicate deciding whether a failed attempt is retried.
pub type RetryCondition = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of invocations, first attempt included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap on the pre-jitter delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub factor: f64,
    /// Upper bound of the random addition, as a fraction of the delay.
    pub jitter: f64,
    /// Overall elapsed-time budget, checked before every attempt.
    pub timeout: Option<Duration>,
    /// Overrides [`ResilienceError::is_retryable`] when set.
    pub retry_condition: Option<RetryCondition>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPreset::Standard.config()
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("factor", &self.factor)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .field("custom_condition", &self.retry_condition.is_some())
            .finish()
    }
}

impl RetryConfig {
    /// Look up a preset by name.
    pub fn preset(name: &str) -> ResilienceResult<Self> {
        Ok(name.parse::<RetryPreset>()?.config())
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    /// Apply the configured (or default) retry condition.
    pub fn should_retry(&self, error: &ResilienceError) -> bool {
        match &self.retry_condition {
            Some(condition) => condition(error),
            None => error.is_retryable(),
        }
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        let invalid = |field: &str, message: &str| -> ResilienceError {
            ConfigurationError::InvalidValue {
                field: format!("retry.{}", field),
                message: message.to_string(),
            }
            .into()
        };

        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(invalid("factor", "must be a finite number >= 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid("jitter", "must be within [0, 1]"));
        }
        if self.initial_delay > self.max_delay {
            return Err(invalid("initial_delay", "must not exceed max_delay"));
        }
        Ok(())
    }
}

/// Named retry presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPreset {
    /// Short, latency-sensitive calls.
    Fast,
    /// General upstream calls.
    Standard,
    /// Calls worth waiting for.
    Aggressive,
    /// Only rate limiting and 503, honoring `Retry-After`.
    RateLimit,
}

impl RetryPreset {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Aggressive => "aggressive",
            Self::RateLimit => "rate_limit",
        }
    }

    pub fn config(self) -> RetryConfig {
        match self {
            Self::Fast => RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                factor: 2.0,
                jitter: 0.5,
                timeout: Some(Duration::from_secs(5)),
                retry_condition: None,
            },
            Self::Standard => RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                factor: 2.0,
                jitter: 0.5,
                timeout: Some(Duration::from_secs(60)),
                retry_condition: None,
            },
            Self::Aggressive => RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                factor: 2.0,
                jitter: 0.5,
                timeout: Some(Duration::from_secs(120)),
                retry_condition: None,
            },
            Self::RateLimit => RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                factor: 2.0,
                jitter: 0.5,
                timeout: Some(Duration::from_secs(300)),
                retry_condition: Some(Arc::new(|error: &ResilienceError| {
                    matches!(error.status_code(), Some(429) | Some(503))
                })),
            },
        }
    }
}

impl FromStr for RetryPreset {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fast" => Ok(Self::Fast),
            "standard" | "default" => Ok(Self::Standard),
            "aggressive" => Ok(Self::Aggressive),
            "rate_limit" | "ratelimit" => Ok(Self::RateLimit),
            _ => Err(ConfigurationError::UnknownPreset {
                name: s.to_string(),
            }),
        }
    }
}

/// Pre-jitter delay after failed attempt `attempt` (1-based):
/// `min(initial_delay * factor^(attempt - 1), max_delay)`.
pub fn compute_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let base_ms = config.initial_delay.as_millis() as f64 * config.factor.powi(exponent);
    let capped_ms = base_ms.min(config.max_delay.as_millis() as f64);

    if capped_ms.is_finite() && capped_ms > 0.0 {
        Duration::from_millis(capped_ms as u64)
    } else if capped_ms > 0.0 {
        config.max_delay
    } else {
        Duration::ZERO
    }
}

/// Add a uniform random amount in `[0, jitter * delay]`.
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, jitter: f64, rng: &mut R) -> Duration {
    let spread_ms = delay.as_millis() as f64 * jitter;
    if spread_ms <= 0.0 {
        return delay;
    }
    delay + Duration::from_millis(rng.gen_range(0.0..=spread_ms) as u64)
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

/// [`parse_retry_after`] relative to `now`. Dates in the past yield zero.
pub fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::from_secs_f64(secs));
        }
        return None;
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (date.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Realized delay after failed attempt `attempt`: jittered backoff, raised to
/// the error's `Retry-After` when that is longer.
pub fn retry_delay(attempt: u32, config: &RetryConfig, error: &ResilienceError) -> Duration {
    let jittered = apply_jitter(
        compute_backoff(attempt, config),
        config.jitter,
        &mut rand::thread_rng(),
    );

    match error.retry_after() {
        Some(server_delay) if server_delay > jittered => server_delay,
        _ => jittered,
    }
}

/// Retry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub budget_exhausted: u64,
}

/// Retry executor holding a configuration and accumulating statistics.
pub struct RetryExecutor {
    config: RetryConfig,
    stats: Mutex<RetryStats>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn stats(&self) -> RetryStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = RetryStats::default();
    }

    /// Run `operation` under this executor's policy.
    pub async fn execute<T, F, Fut>(
        &self,
        context: &LogContext,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        run(operation, &self.config, context, Some(&self.stats)).await
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Run `operation` with retries per `config`.
///
/// The final error is returned unchanged once the condition rejects it or
/// attempts run out.
pub async fn retry_with_backoff<T, F, Fut>(
    operation: F,
    config: &RetryConfig,
    context: &LogContext,
) -> ResilienceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResilienceResult<T>>,
{
    run(operation, config, context, None).await
}

async fn run<T, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    context: &LogContext,
    stats: Option<&Mutex<RetryStats>>,
) -> ResilienceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResilienceResult<T>>,
{
    let record = |update: &dyn Fn(&mut RetryStats)| {
        if let Some(stats) = stats {
            update(&mut stats.lock());
        }
    };

    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if let Some(budget) = config.timeout {
            let elapsed = started.elapsed();
            if elapsed >= budget {
                tracing::warn!(
                    operation = context.operation_name(),
                    correlation_id = context.correlation(),
                    attempts = attempt - 1,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "retry budget exhausted"
                );
                record(&|s: &mut RetryStats| {
                    s.failed_operations += 1;
                    s.budget_exhausted += 1;
                });
                return Err(ResilienceError::RetryTimeout {
                    elapsed,
                    attempts: attempt - 1,
                });
            }
        }

        record(&|s: &mut RetryStats| s.total_attempts += 1);

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = context.operation_name(),
                        correlation_id = context.correlation(),
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "operation succeeded after retry"
                    );
                    record(&|s: &mut RetryStats| s.successful_retries += 1);
                }
                return Ok(value);
            }
            Err(error) => {
                if !config.should_retry(&error) {
                    tracing::debug!(
                        operation = context.operation_name(),
                        correlation_id = context.correlation(),
                        attempt,
                        error = %error,
                        "error is not retryable"
                    );
                    record(&|s: &mut RetryStats| s.failed_operations += 1);
                    return Err(error);
                }

                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = context.operation_name(),
                        correlation_id = context.correlation(),
                        attempts = attempt,
                        error = %error,
                        "retries exhausted"
                    );
                    record(&|s: &mut RetryStats| s.failed_operations += 1);
                    return Err(error);
                }

                let delay = retry_delay(attempt, config, &error);
                tracing::warn!(
                    operation = context.operation_name(),
                    correlation_id = context.correlation(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error_code = error.error_code(),
                    error = %error,
                    "attempt failed, retrying"
                );
                record(&|s: &mut RetryStats| s.retries += 1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CredentialError, NetworkError, ProviderError};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> ResilienceError {
        ProviderError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
            retry_after: None,
        }
        .into()
    }

    fn quick() -> RetryConfig {
        RetryPreset::Standard
            .config()
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
    }

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(1000))
            .with_factor(2.0)
            .with_max_delay(Duration::from_millis(30000));

        let delays: Vec<u64> = (1..=6)
            .map(|attempt| compute_backoff(attempt, &config).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);

        let mut rng = rand::thread_rng();
        for attempt in 1..=6 {
            let delay = compute_backoff(attempt, &config);
            for _ in 0..50 {
                let realized = apply_jitter(delay, 0.5, &mut rng);
                assert!(realized >= delay);
                assert!(realized.as_millis() <= delay.as_millis() * 3 / 2);
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let delay = Duration::from_millis(250);
        assert_eq!(apply_jitter(delay, 0.0, &mut rand::thread_rng()), delay);
    }

    #[test]
    fn test_retry_after_raises_delay() {
        let config = quick();
        let error: ResilienceError = ProviderError::RateLimited {
            retry_after: parse_retry_after("2"),
        }
        .into();

        let delay = retry_delay(1, &config, &error);
        assert!(delay >= Duration::from_millis(2000));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-3"), None);

        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 50).unwrap();
        assert_eq!(
            parse_retry_after_at("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            parse_retry_after_at("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_presets_by_name() {
        assert_eq!("fast".parse::<RetryPreset>().unwrap(), RetryPreset::Fast);
        assert_eq!("Rate-Limit".parse::<RetryPreset>().unwrap(), RetryPreset::RateLimit);
        assert!(RetryConfig::preset("reckless").is_err());

        let config = RetryConfig::preset("aggressive").unwrap().with_max_attempts(7);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.initial_delay, Duration::from_millis(500));

        for preset in [
            RetryPreset::Fast,
            RetryPreset::Standard,
            RetryPreset::Aggressive,
            RetryPreset::RateLimit,
        ] {
            assert!(preset.config().validate().is_ok(), "{} invalid", preset.name());
        }
    }

    #[test]
    fn test_rate_limit_preset_condition() {
        let config = RetryPreset::RateLimit.config();
        assert!(config.should_retry(&ProviderError::RateLimited { retry_after: None }.into()));
        assert!(config.should_retry(&unavailable()));
        assert!(!config.should_retry(
            &NetworkError::ConnectionReset {
                message: "reset".to_string()
            }
            .into()
        ));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(quick().with_max_attempts(0).validate().is_err());
        assert!(quick().with_factor(0.5).validate().is_err());
        assert!(quick().with_jitter(1.5).validate().is_err());
        assert!(quick()
            .with_initial_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(quick());

        let result = executor
            .execute(&LogContext::for_operation("test"), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = executor.stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.successful_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_final_error_unchanged() {
        let calls = AtomicU32::new(0);
        let config = quick().with_max_attempts(4);

        let result: ResilienceResult<()> = retry_with_backoff(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::ServerError {
                    status: 503,
                    message: format!("attempt {}", n + 1),
                    retry_after: None,
                }
                .into())
            },
            &config,
            &LogContext::new(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(ResilienceError::Provider(ProviderError::ServerError { status, message, .. })) => {
                assert_eq!(status, 503);
                assert_eq!(message, "attempt 4");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<()> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::InvalidGrant {
                    message: "revoked".to_string(),
                }
                .into())
            },
            &quick(),
            &LogContext::new(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Provider(ProviderError::InvalidGrant { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_condition_overrides_default() {
        let calls = AtomicU32::new(0);
        let config = quick().with_retry_condition(|error| {
            matches!(error, ResilienceError::Credential(CredentialError::NotFound { .. }))
        });

        let result: ResilienceResult<()> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CredentialError::NotFound {
                    key: "k".to_string(),
                }
                .into())
            },
            &config,
            &LogContext::new(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), config.max_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_delay_is_honored() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = retry_with_backoff(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::RateLimited {
                        retry_after: Some(Duration::from_secs(2)),
                    }
                    .into())
                } else {
                    Ok("done")
                }
            },
            &quick(),
            &LogContext::new(),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_checked_before_each_attempt() {
        let calls = AtomicU32::new(0);
        let config = quick()
            .with_max_attempts(10)
            .with_timeout(Some(Duration::from_millis(50)));

        let result: ResilienceResult<()> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err(unavailable())
            },
            &config,
            &LogContext::new(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(ResilienceError::RetryTimeout { attempts: 2, .. })
        ));
    }
}
