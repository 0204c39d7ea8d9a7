//! Credential Manager
//!
//! Resolves credentials per key or routing domain and keeps OAuth tokens
//! fresh.
//!
//! For each credential key at most one refresh is in flight. Callers that
//! find one running wait for its outcome instead of starting another. A
//! failed refresh suppresses further attempts for the failure cooldown.
//! A refreshed credential is persisted before it replaces the cached copy.

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

use super::headers::authorization_headers;
use super::mapping::DomainCredentialMapping;
use super::refresh::TokenRefresher;
use super::store::CredentialStore;
use crate::core::HttpTransport;
use crate::error::{CredentialError, ResilienceResult};
use crate::resilience::CircuitBreakerRegistry;
use crate::telemetry::{HealthReport, LogContext, RefreshMetrics, RefreshMetricsSnapshot};
use crate::types::{
    now_millis, Credential, CredentialFile, CredentialKey, CredentialManagerConfig, CredentialType,
    OAuthTokens,
};

/// Negative-cache entry for a failed refresh.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub occurred_at: Instant,
    pub reason: String,
}

/// Outcome published to callers waiting on an in-flight refresh. `None`
/// until the leader finishes.
type RefreshOutcome = Option<Option<OAuthTokens>>;

enum RefreshRole {
    Leader(u64, watch::Sender<RefreshOutcome>),
    Follower(watch::Receiver<RefreshOutcome>),
}

/// Registered refresh for one key. `id` tells a leader's own entry apart
/// from one claimed after it was abandoned.
struct InFlight {
    id: u64,
    outcome: watch::Receiver<RefreshOutcome>,
}

/// Removes the leader's in-flight entry when the refresh settles, is
/// cancelled or panics.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<CredentialKey, InFlight>>,
    key: CredentialKey,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&self.key).map(|entry| entry.id) == Some(self.id) {
            in_flight.remove(&self.key);
        }
    }
}

/// Credential manager.
pub struct CredentialManager<T: HttpTransport, S: CredentialStore> {
    config: CredentialManagerConfig,
    store: Arc<S>,
    refresher: TokenRefresher<T>,
    registry: Arc<CircuitBreakerRegistry>,
    mapping: DomainCredentialMapping,
    credentials: Mutex<HashMap<CredentialKey, CredentialFile>>,
    in_flight: Mutex<HashMap<CredentialKey, InFlight>>,
    next_refresh_id: AtomicU64,
    failures: Mutex<HashMap<CredentialKey, FailureRecord>>,
    metrics: RefreshMetrics,
}

impl<T: HttpTransport, S: CredentialStore> CredentialManager<T, S> {
    /// Create a manager. The token endpoint breaker is taken from
    /// `registry` under `config.circuit_name`.
    pub fn new(
        config: CredentialManagerConfig,
        transport: Arc<T>,
        store: Arc<S>,
        registry: Arc<CircuitBreakerRegistry>,
        mapping: DomainCredentialMapping,
    ) -> ResilienceResult<Self> {
        config.validate()?;

        let breaker =
            registry.get_or_create_with(&config.circuit_name, config.circuit_breaker.clone())?;
        let refresher = TokenRefresher::new(
            transport,
            config.oauth.clone(),
            config.retry.clone(),
            breaker,
        );

        Ok(Self {
            config,
            store,
            refresher,
            registry,
            mapping,
            credentials: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_refresh_id: AtomicU64::new(0),
            failures: Mutex::new(HashMap::new()),
            metrics: RefreshMetrics::new(),
        })
    }

    pub fn config(&self) -> &CredentialManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn mapping(&self) -> &DomainCredentialMapping {
        &self.mapping
    }

    /// Valid access token (or API key) for `key`.
    ///
    /// Never fails: every problem resolves to `None` with the reason logged.
    pub async fn get_access_token(&self, key: &CredentialKey) -> Option<String> {
        self.resolve(key)
            .await
            .map(|credential| credential.secret().to_string())
    }

    /// [`get_access_token`](Self::get_access_token) for the key mapped to
    /// `domain`.
    pub async fn get_access_token_for_domain(&self, domain: &str) -> Option<String> {
        let key = self.key_for_domain(domain)?;
        self.get_access_token(&key).await
    }

    /// Authorization headers for an outbound request using `key`.
    pub async fn authorization_headers(&self, key: &CredentialKey) -> ResilienceResult<HeaderMap> {
        let credential = self
            .resolve(key)
            .await
            .ok_or_else(|| CredentialError::Unavailable {
                key: key.to_string(),
            })?;

        let beta = match credential.kind() {
            CredentialType::OAuth => self.config.oauth.beta_header.as_ref(),
            CredentialType::ApiKey => None,
        };
        authorization_headers(&credential, &self.config.api_key_header, beta)
    }

    /// Authorization headers for the credential mapped to `domain`.
    pub async fn authorization_headers_for_domain(
        &self,
        domain: &str,
    ) -> ResilienceResult<HeaderMap> {
        let key = self
            .mapping
            .resolve(domain)
            .cloned()
            .ok_or_else(|| CredentialError::UnmappedDomain {
                domain: domain.to_string(),
            })?;
        self.authorization_headers(&key).await
    }

    /// In-memory copy of the credential file, if loaded.
    pub fn cached_credential(&self, key: &CredentialKey) -> Option<CredentialFile> {
        self.credentials.lock().get(key).cloned()
    }

    /// Drop the cached copy of `key`; the next call reloads it.
    pub fn invalidate(&self, key: &CredentialKey) -> bool {
        self.credentials.lock().remove(key).is_some()
    }

    /// Drop cached credentials, failure records and metrics. In-flight
    /// refreshes finish normally.
    pub fn clear(&self) {
        self.credentials.lock().clear();
        self.failures.lock().clear();
        self.metrics.reset();
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        let active = self.in_flight.lock().len();
        let cooldown = self.config.failure_cooldown;
        let cooled_down = self
            .failures
            .lock()
            .values()
            .filter(|record| record.occurred_at.elapsed() < cooldown)
            .count();
        self.metrics.snapshot(active, cooled_down)
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport::collect(self.metrics(), &self.registry)
    }

    fn key_for_domain(&self, domain: &str) -> Option<CredentialKey> {
        let key = self.mapping.resolve(domain).cloned();
        if key.is_none() {
            tracing::warn!(domain, "no credential mapped for domain");
        }
        key
    }

    async fn resolve(&self, key: &CredentialKey) -> Option<Credential> {
        let context = LogContext::for_operation("credential.resolve").credential(key.as_str());
        let file = self.load(key, &context).await?;

        let tokens = match file.credential() {
            Some(Credential::OAuth(tokens)) => tokens,
            Some(api_key @ Credential::ApiKey { .. }) => return Some(api_key),
            None => {
                tracing::warn!(credential = %key, "credential file has no usable material");
                return None;
            }
        };

        let now = now_millis();
        if tokens.is_fresh(now, self.refresh_buffer_ms()) {
            return Some(Credential::OAuth(tokens));
        }

        if tokens.refresh_token().is_none() {
            if tokens.is_expired(now) {
                tracing::warn!(
                    credential = %key,
                    correlation_id = context.correlation(),
                    "OAuth token expired and no refresh token is stored; re-authentication required"
                );
                return None;
            }
            return Some(Credential::OAuth(tokens));
        }

        self.refresh(key, &context).await.map(Credential::OAuth)
    }

    async fn load(&self, key: &CredentialKey, context: &LogContext) -> Option<CredentialFile> {
        if let Some(file) = self.cached_credential(key) {
            return Some(file);
        }

        match self.store.load(key).await {
            Ok(file) => {
                tracing::debug!(credential = %key, kind = file.kind.as_str(), "credential loaded");
                Some(
                    self.credentials
                        .lock()
                        .entry(key.clone())
                        .or_insert(file)
                        .clone(),
                )
            }
            Err(error) => {
                tracing::warn!(
                    credential = %key,
                    correlation_id = context.correlation(),
                    error = %error,
                    "failed to load credential"
                );
                None
            }
        }
    }

    async fn refresh(&self, key: &CredentialKey, context: &LogContext) -> Option<OAuthTokens> {
        loop {
            if let Some(reason) = self.cooling_down(key) {
                tracing::debug!(
                    credential = %key,
                    correlation_id = context.correlation(),
                    reason = %reason,
                    "refresh suppressed during failure cooldown"
                );
                return None;
            }

            match self.claim(key) {
                RefreshRole::Follower(mut receiver) => {
                    self.metrics.record_concurrent();
                    tracing::debug!(
                        credential = %key,
                        correlation_id = context.correlation(),
                        "joining in-flight refresh"
                    );
                    match receiver.wait_for(Option::is_some).await {
                        Ok(outcome) => return (*outcome).clone().flatten(),
                        // the leader was dropped before publishing; take over
                        Err(_) => {
                            tracing::debug!(
                                credential = %key,
                                correlation_id = context.correlation(),
                                "in-flight refresh abandoned, retrying"
                            );
                        }
                    }
                }
                RefreshRole::Leader(id, sender) => {
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        key: key.clone(),
                        id,
                    };
                    let outcome = self.lead_refresh(key, context).await;
                    let _ = sender.send(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    fn claim(&self, key: &CredentialKey) -> RefreshRole {
        let mut in_flight = self.in_flight.lock();
        if let Some(entry) = in_flight.get(key) {
            // a closed channel belongs to a leader that is gone
            if entry.outcome.has_changed().is_ok() {
                return RefreshRole::Follower(entry.outcome.clone());
            }
        }
        let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let (sender, outcome) = watch::channel(None);
        in_flight.insert(key.clone(), InFlight { id, outcome });
        RefreshRole::Leader(id, sender)
    }

    /// Reason of a failure still inside its cooldown. Expired records are
    /// purged here.
    fn cooling_down(&self, key: &CredentialKey) -> Option<String> {
        let mut failures = self.failures.lock();
        let record = failures.get(key)?;
        if record.occurred_at.elapsed() < self.config.failure_cooldown {
            return Some(record.reason.clone());
        }
        failures.remove(key);
        None
    }

    async fn lead_refresh(&self, key: &CredentialKey, context: &LogContext) -> Option<OAuthTokens> {
        // Another leader may have finished between our checks and the claim.
        if self.cooling_down(key).is_some() {
            return None;
        }
        let cached = self.cached_credential(key)?;
        let current = cached.oauth.clone()?;
        if current.is_fresh(now_millis(), self.refresh_buffer_ms()) {
            return Some(current);
        }

        self.metrics.record_attempt();
        let started = Instant::now();
        tracing::info!(
            credential = %key,
            correlation_id = context.correlation(),
            expires_at = current.expires_at,
            "refreshing OAuth token"
        );

        let refreshed = match self.refresher.refresh(&current, context).await {
            Ok(tokens) => tokens,
            Err(error) => {
                if error.needs_reauth() {
                    tracing::error!(
                        credential = %key,
                        correlation_id = context.correlation(),
                        error = %error,
                        "refresh token rejected; re-authentication required"
                    );
                } else {
                    tracing::warn!(
                        credential = %key,
                        correlation_id = context.correlation(),
                        error_code = error.error_code(),
                        error = %error,
                        "OAuth token refresh failed"
                    );
                }
                self.record_failure(key, error.to_string());
                self.metrics.record_failure(started.elapsed());
                return None;
            }
        };

        let merged = self.merge_base(key, &cached).await.with_oauth(refreshed.clone());
        if let Err(error) = self.store.persist(key, &merged).await {
            tracing::error!(
                credential = %key,
                correlation_id = context.correlation(),
                error = %error,
                "refreshed credential could not be persisted; keeping the previous one"
            );
            self.metrics.record_failure(started.elapsed());
            return None;
        }

        self.credentials.lock().insert(key.clone(), merged);
        self.failures.lock().remove(key);

        let elapsed = started.elapsed();
        self.metrics.record_success(elapsed);
        tracing::info!(
            credential = %key,
            correlation_id = context.correlation(),
            expires_at = refreshed.expires_at,
            duration_ms = elapsed.as_millis() as u64,
            "OAuth token refreshed"
        );

        Some(refreshed)
    }

    /// File the refreshed tokens are merged into: the stored copy, so
    /// out-of-band edits to passthrough fields survive, else the cached one.
    async fn merge_base(&self, key: &CredentialKey, cached: &CredentialFile) -> CredentialFile {
        match self.store.load(key).await {
            Ok(stored) if stored.kind == CredentialType::OAuth => stored,
            Ok(_) => cached.clone(),
            Err(error) => {
                tracing::debug!(
                    credential = %key,
                    error = %error,
                    "re-read failed, merging into cached copy"
                );
                cached.clone()
            }
        }
    }

    fn record_failure(&self, key: &CredentialKey, reason: String) {
        self.failures.lock().insert(
            key.clone(),
            FailureRecord {
                occurred_at: Instant::now(),
                reason,
            },
        );
    }

    fn refresh_buffer_ms(&self) -> i64 {
        i64::try_from(self.config.refresh_buffer.as_millis()).unwrap_or(i64::MAX)
    }
}
