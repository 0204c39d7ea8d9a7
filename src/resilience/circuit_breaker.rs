//! Circuit Breaker
//!
//! Per-target state machine that fails fast once a target is unhealthy.
//!
//! ```text
//!            failure threshold or error rate
//!   CLOSED ----------------------------------> OPEN
//!     ^                                          |
//!     | success_threshold successes              | timeout elapsed
//!     |                                          v
//!     +------------------------------------- HALF_OPEN
//!                 any failure reopens ---------> OPEN
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ConfigurationError, ResilienceError, ResilienceResult};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// Trial calls test for recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,
    /// How long the circuit stays open before a trial.
    pub timeout: Duration,
    /// Minimum window outcomes before the error rate is considered.
    pub volume_threshold: usize,
    /// Error rate (percent) at which the circuit opens.
    pub error_threshold_percentage: f64,
    /// Maximum outcomes kept in the rolling window.
    pub window_size: usize,
    /// Maximum age of outcomes in the rolling window.
    pub window_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            volume_threshold: 10,
            error_threshold_percentage: 50.0,
            window_size: 100,
            window_duration: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> ResilienceResult<()> {
        let invalid = |field: &str, message: &str| -> ResilienceError {
            ConfigurationError::InvalidValue {
                field: format!("circuit_breaker.{}", field),
                message: message.to_string(),
            }
            .into()
        };

        if self.failure_threshold == 0 {
            return Err(invalid("failure_threshold", "must be greater than zero"));
        }
        if self.success_threshold == 0 {
            return Err(invalid("success_threshold", "must be greater than zero"));
        }
        if self.volume_threshold == 0 {
            return Err(invalid("volume_threshold", "must be greater than zero"));
        }
        if !(0.0..=100.0).contains(&self.error_threshold_percentage) {
            return Err(invalid("error_threshold_percentage", "must be within [0, 100]"));
        }
        if self.window_size == 0 {
            return Err(invalid("window_size", "must be greater than zero"));
        }
        if self.window_duration.is_zero() {
            return Err(invalid("window_duration", "must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub state_transitions: u64,
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Error rate over the rolling window, in percent.
    pub error_rate: f64,
    pub window_volume: usize,
    /// Mean call duration over the rolling window.
    pub average_latency_ms: u64,
    /// Most recent failure still in the rolling window.
    pub last_error: Option<String>,
    #[serde(rename = "next_attempt_in_ms", serialize_with = "serialize_millis")]
    pub next_attempt_in: Option<Duration>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub stats: CircuitBreakerStats,
}

fn serialize_millis<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Observer of state transitions.
pub trait CircuitBreakerHook: Send + Sync {
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState);
}

#[derive(Debug, Clone)]
struct Outcome {
    success: bool,
    timestamp: Instant,
    duration: Duration,
    error: Option<String>,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_attempt_at: Option<Instant>,
    window: VecDeque<Outcome>,
    trial_in_flight: bool,
    trial_generation: u64,
    stats: CircuitBreakerStats,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            next_attempt_at: None,
            window: VecDeque::new(),
            trial_in_flight: false,
            trial_generation: 0,
            stats: CircuitBreakerStats::default(),
        }
    }

    fn transition(&mut self, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        self.stats.state_transitions += 1;
        Some((from, to))
    }

    fn recent(&self, now: Instant, max_age: Duration) -> impl Iterator<Item = &Outcome> {
        self.window
            .iter()
            .filter(move |o| now.saturating_duration_since(o.timestamp) <= max_age)
    }

    fn error_rate(&self, now: Instant, max_age: Duration) -> (f64, usize) {
        let (volume, failures) = self.recent(now, max_age).fold((0usize, 0usize), |(v, f), o| {
            (v + 1, f + usize::from(!o.success))
        });
        if volume == 0 {
            (0.0, 0)
        } else {
            (failures as f64 * 100.0 / volume as f64, volume)
        }
    }
}

/// Circuit breaker for one named target.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Releases the half-open trial slot when the admitted call settles or is
/// dropped.
struct TrialPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.inner.lock();
        if inner.trial_generation == self.generation {
            inner.trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker. Invalid configuration is rejected, never clamped.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self::with_validated(name.into(), config))
    }

    pub(crate) fn with_validated(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
            hook: None,
        }
    }

    /// Attach a state transition observer.
    pub fn with_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An expired open window still reads as open until the
    /// next call claims the trial.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.inner.lock().stats.clone()
    }

    /// Run `operation` unless the circuit rejects it.
    ///
    /// Only errors for which [`ResilienceError::trips_circuit`] holds count
    /// as failures; other errors are propagated but recorded as successes.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        let permit = self.admit()?;

        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed();

        match &result {
            Err(error) if error.trips_circuit() => self.record_failure(duration, error),
            _ => self.record_success(duration),
        }

        drop(permit);
        result
    }

    /// Force the circuit closed and forget all history.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let transition = inner.transition(CircuitState::Closed);
            inner.consecutive_failures = 0;
            inner.consecutive_successes = 0;
            inner.next_attempt_at = None;
            inner.window.clear();
            inner.trial_in_flight = false;
            inner.trial_generation += 1;
            transition
        };
        tracing::info!(circuit = %self.name, "circuit breaker reset");
        self.notify(transition);
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let now = Instant::now();
        let inner = self.inner.lock();
        let (error_rate, window_volume) = inner.error_rate(now, self.config.window_duration);
        let total_ms: u128 = inner
            .recent(now, self.config.window_duration)
            .map(|o| o.duration.as_millis())
            .sum();
        let average_latency_ms = match window_volume {
            0 => 0,
            volume => (total_ms / volume as u128) as u64,
        };
        let last_error = inner
            .recent(now, self.config.window_duration)
            .filter_map(|o| o.error.clone())
            .last();

        let next_attempt_in = match inner.state {
            CircuitState::Open => inner
                .next_attempt_at
                .map(|deadline| deadline.saturating_duration_since(now)),
            _ => None,
        };
        let next_attempt_at = next_attempt_in
            .and_then(|wait| chrono::Duration::from_std(wait).ok())
            .map(|wait| Utc::now() + wait);

        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            error_rate,
            window_volume,
            average_latency_ms,
            last_error,
            next_attempt_in,
            next_attempt_at,
            stats: inner.stats.clone(),
        }
    }

    fn admit(&self) -> ResilienceResult<Option<TrialPermit<'_>>> {
        let now = Instant::now();
        let mut transition = None;

        let decision = {
            let mut inner = self.inner.lock();
            inner.stats.total_requests += 1;

            match inner.state {
                CircuitState::Closed => Ok(None),
                CircuitState::Open => {
                    let deadline = inner.next_attempt_at.unwrap_or(now);
                    if now >= deadline {
                        transition = inner.transition(CircuitState::HalfOpen);
                        inner.consecutive_successes = 0;
                        Ok(Some(Self::claim_trial(&mut inner)))
                    } else {
                        inner.stats.rejected_requests += 1;
                        Err(deadline - now)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        inner.stats.rejected_requests += 1;
                        Err(Duration::ZERO)
                    } else {
                        Ok(Some(Self::claim_trial(&mut inner)))
                    }
                }
            }
        };

        self.notify(transition);

        match decision {
            Ok(generation) => Ok(generation.map(|generation| TrialPermit {
                breaker: self,
                generation,
            })),
            Err(retry_in) => {
                tracing::debug!(
                    circuit = %self.name,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "call rejected by open circuit"
                );
                Err(ResilienceError::CircuitOpen {
                    name: self.name.clone(),
                    retry_in,
                })
            }
        }
    }

    fn claim_trial(inner: &mut BreakerState) -> u64 {
        inner.trial_in_flight = true;
        inner.trial_generation += 1;
        inner.trial_generation
    }

    fn record_success(&self, duration: Duration) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.stats.successful_requests += 1;
            self.push_outcome(&mut inner, true, duration, None);

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
                    None
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.consecutive_failures = 0;
                        inner.consecutive_successes = 0;
                        inner.next_attempt_at = None;
                        inner.window.clear();
                        inner.transition(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                // a call admitted before a concurrent trip
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    fn record_failure(&self, duration: Duration, error: &ResilienceError) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.stats.failed_requests += 1;
            self.push_outcome(&mut inner, false, duration, Some(error.to_string()));

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    let (error_rate, volume) =
                        inner.error_rate(Instant::now(), self.config.window_duration);

                    let too_many_failures =
                        inner.consecutive_failures >= self.config.failure_threshold;
                    let error_rate_exceeded = volume >= self.config.volume_threshold
                        && error_rate >= self.config.error_threshold_percentage;

                    if too_many_failures || error_rate_exceeded {
                        tracing::warn!(
                            circuit = %self.name,
                            consecutive_failures = inner.consecutive_failures,
                            error_rate,
                            volume,
                            "circuit opening"
                        );
                        self.open(&mut inner)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    tracing::warn!(
                        circuit = %self.name,
                        error = %error,
                        "trial call failed, reopening"
                    );
                    self.open(&mut inner)
                }
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    fn open(&self, inner: &mut BreakerState) -> Option<(CircuitState, CircuitState)> {
        inner.consecutive_successes = 0;
        inner.next_attempt_at = Some(Instant::now() + self.config.timeout);
        inner.transition(CircuitState::Open)
    }

    fn push_outcome(
        &self,
        inner: &mut BreakerState,
        success: bool,
        duration: Duration,
        error: Option<String>,
    ) {
        let now = Instant::now();
        inner.window.push_back(Outcome {
            success,
            timestamp: now,
            duration,
            error,
        });

        while inner.window.len() > self.config.window_size {
            inner.window.pop_front();
        }
        while let Some(oldest) = inner.window.front() {
            if now.saturating_duration_since(oldest.timestamp) > self.config.window_duration {
                inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => {
                tracing::warn!(circuit = %self.name, %from, %to, "circuit state changed")
            }
            _ => tracing::info!(circuit = %self.name, %from, %to, "circuit state changed"),
        }

        if let Some(hook) = &self.hook {
            hook.on_state_change(&self.name, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NetworkError, ProviderError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn upstream_down() -> ResilienceError {
        ProviderError::ServerError {
            status: 502,
            message: "Bad gateway".to_string(),
            retry_after: None,
        }
        .into()
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "upstream",
            CircuitBreakerConfig {
                failure_threshold: 5,
                volume_threshold: 10,
                success_threshold: 2,
                timeout: Duration::from_secs(30),
                ..Default::default()
            },
        )
        .unwrap()
    }

    async fn fail(breaker: &CircuitBreaker) -> ResilienceResult<()> {
        breaker.execute(|| async { Err(upstream_down()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> ResilienceResult<()> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[derive(Default)]
    struct RecordingHook {
        transitions: Mutex<Vec<(CircuitState, CircuitState)>>,
    }

    impl CircuitBreakerHook for RecordingHook {
        fn on_state_change(&self, _name: &str, from: CircuitState, to: CircuitState) {
            self.transitions.lock().push((from, to));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = [
            CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                error_threshold_percentage: 101.0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                error_threshold_percentage: f64::NAN,
                ..Default::default()
            },
            CircuitBreakerConfig {
                window_size: 0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                timeout: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(CircuitBreaker::new("x", config).is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_error_rate_then_half_open_cycle() {
        let hook = Arc::new(RecordingHook::default());
        let breaker = breaker().with_hook(hook.clone());

        // F,S,F,S,F,S,F,S,F,F: consecutive failures never reach 5, but the
        // 10th call brings the window to 60% errors at volume 10.
        for i in 0..8 {
            if i % 2 == 0 {
                assert!(fail(&breaker).await.is_err());
            } else {
                assert!(succeed(&breaker).await.is_ok());
            }
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let rejected = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(30)).await;

        // exactly one trial: a concurrent caller is rejected while it runs
        let trial = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err::<(), _>(upstream_down())
        });
        let concurrent = async {
            tokio::task::yield_now().await;
            succeed(&breaker).await
        };
        let (trial, concurrent) = futures::join!(trial, concurrent);
        assert!(matches!(trial, Err(ResilienceError::Provider(_))));
        assert!(matches!(concurrent, Err(ResilienceError::CircuitOpen { .. })));

        // trial failure reopened with a fresh timeout
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(succeed(&breaker).await.is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);

        let status = breaker.status();
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.window_volume, 0);

        assert_eq!(
            *hook.transitions.lock(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_consecutive_failures() {
        let breaker = breaker();
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 5);
        assert_eq!(status.error_rate, 100.0);
        assert_eq!(status.next_attempt_in, Some(Duration::from_secs(30)));
        assert!(status.next_attempt_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_latency_and_last_error() {
        let breaker = breaker();
        let _ = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, ResilienceError>(())
            })
            .await;
        let _ = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Err::<(), _>(upstream_down())
            })
            .await;

        let status = breaker.status();
        assert_eq!(status.window_volume, 2);
        assert_eq!(status.average_latency_ms, 200);
        assert_eq!(
            status.last_error.as_deref(),
            Some("Provider error: Server error 502: Bad gateway")
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        let status = breaker.status();
        assert_eq!(status.window_volume, 0);
        assert_eq!(status.average_latency_ms, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_decays_failure_count() {
        let breaker = breaker();
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        let _ = succeed(&breaker).await;
        assert_eq!(breaker.status().failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_do_not_trip() {
        let breaker = breaker();
        for _ in 0..20 {
            let result: ResilienceResult<()> = breaker
                .execute(|| async {
                    Err(ProviderError::RateLimited { retry_after: None }.into())
                })
                .await;
            assert!(matches!(
                result,
                Err(ResilienceError::Provider(ProviderError::RateLimited { .. }))
            ));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().successful_requests, 20);

        for _ in 0..5 {
            let _: ResilienceResult<()> = breaker
                .execute(|| async {
                    Err(NetworkError::ConnectionFailed {
                        message: "refused".to_string(),
                    }
                    .into())
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_releases_slot() {
        let breaker = breaker();
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let hung = breaker.execute(|| std::future::pending::<ResilienceResult<()>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forces_closed() {
        let breaker = breaker();
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert!(breaker.is_open());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());

        let stats = breaker.stats();
        assert_eq!(stats.failed_requests, 5);
        assert_eq!(stats.state_transitions, 2);
    }

    #[test]
    fn test_status_serialization() {
        let breaker = breaker();
        let json = serde_json::to_value(breaker.status()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert_eq!(json["name"], "upstream");
        assert!(json["next_attempt_in_ms"].is_null());
    }
}
