//! Circuit breaker implementation for resilience
//!
//! Wraps calls to flaky dependencies (the extraction service, the broker)
//! and fails fast once a dependency shows sustained errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{OrchestratorError, OrchestratorResult};

/// Circuit breaker state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF_OPEN")]
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to trip the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing
    pub recovery_timeout: Duration,
    /// Upper bound for the backoff-scaled recovery timeout
    pub max_recovery_timeout: Duration,
    /// Recovery timeout multiplier applied when a half-open probe fails
    pub backoff_multiplier: f64,
    /// Per-call timeout; a timed-out call counts as a failure
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            max_recovery_timeout: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_settings(settings: &crate::config::CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_millis(settings.open_duration_ms),
            max_recovery_timeout: Duration::from_millis(settings.max_open_duration_ms),
            backoff_multiplier: settings.backoff_multiplier,
            call_timeout: Duration::from_millis(settings.call_timeout_ms),
        }
    }
}

/// Circuit breaker statistics snapshot
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_state_change: Instant,
    pub current_recovery_timeout: Duration,
    pub(crate) probe_in_flight: bool,
}

impl CircuitBreakerStats {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            last_failure_at: None,
            last_success_at: None,
            next_attempt_at: None,
            last_state_change: Instant::now(),
            current_recovery_timeout: config.recovery_timeout,
            probe_in_flight: false,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// Circuit breaker guarding one dependency
pub struct CircuitBreaker {
    service_name: String,
    config: CircuitBreakerConfig,
    stats: Arc<RwLock<CircuitBreakerStats>>,
}

impl CircuitBreaker {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_config(service_name, CircuitBreakerConfig::default())
    }

    pub fn with_config(service_name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let stats = CircuitBreakerStats::new(&config);
        Self {
            service_name: service_name.into(),
            config,
            stats: Arc::new(RwLock::new(stats)),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Runs the operation through the breaker. Rejects immediately while the
    /// breaker is open or while a half-open probe is already in flight.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> OrchestratorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrchestratorResult<T>>,
    {
        if !self.acquire_call_permit().await {
            return Err(OrchestratorError::CircuitBreakerOpen {
                service: self.service_name.clone(),
            });
        }

        let result = tokio::time::timeout(self.config.call_timeout, operation()).await;

        match result {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure().await;
                Err(error)
            }
            Err(_) => {
                self.record_failure().await;
                Err(OrchestratorError::ExecutionTimeout)
            }
        }
    }

    async fn acquire_call_permit(&self) -> bool {
        let mut stats = self.stats.write().await;

        match stats.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if Instant::now().duration_since(stats.last_state_change)
                    > stats.current_recovery_timeout
                {
                    stats.state = CircuitState::HalfOpen;
                    stats.last_state_change = Instant::now();
                    stats.probe_in_flight = true;
                    debug!(service = %self.service_name, "circuit half-open, admitting probe call");
                    true
                } else {
                    false
                }
            }
            // only one probe may be in flight at a time
            CircuitState::HalfOpen => {
                if stats.probe_in_flight {
                    false
                } else {
                    stats.probe_in_flight = true;
                    true
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut stats = self.stats.write().await;

        stats.total_calls += 1;
        stats.successful_calls += 1;
        stats.consecutive_failures = 0;
        stats.last_success_at = Some(Utc::now());

        if stats.state == CircuitState::HalfOpen {
            stats.state = CircuitState::Closed;
            stats.last_state_change = Instant::now();
            stats.current_recovery_timeout = self.config.recovery_timeout;
            stats.next_attempt_at = None;
            stats.probe_in_flight = false;
            debug!(service = %self.service_name, "probe succeeded, circuit closed");
        }
    }

    async fn record_failure(&self) {
        let mut stats = self.stats.write().await;

        stats.total_calls += 1;
        stats.failed_calls += 1;
        stats.consecutive_failures += 1;
        stats.last_failure_at = Some(Utc::now());

        if stats.state == CircuitState::Closed
            && stats.consecutive_failures >= self.config.failure_threshold
        {
            stats.state = CircuitState::Open;
            stats.last_state_change = Instant::now();
            stats.current_recovery_timeout = self.config.recovery_timeout;
            stats.next_attempt_at = Some(next_attempt(stats.current_recovery_timeout));
            warn!(
                service = %self.service_name,
                consecutive_failures = stats.consecutive_failures,
                "failure threshold reached, circuit opened"
            );
        } else if stats.state == CircuitState::HalfOpen {
            stats.state = CircuitState::Open;
            stats.last_state_change = Instant::now();
            stats.probe_in_flight = false;
            stats.current_recovery_timeout = std::cmp::min(
                Duration::from_millis(
                    (stats.current_recovery_timeout.as_millis() as f64
                        * self.config.backoff_multiplier) as u64,
                ),
                self.config.max_recovery_timeout,
            );
            stats.next_attempt_at = Some(next_attempt(stats.current_recovery_timeout));
            warn!(
                service = %self.service_name,
                recovery_timeout_ms = stats.current_recovery_timeout.as_millis() as u64,
                "probe failed, circuit re-opened"
            );
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.stats.read().await.state
    }

    pub async fn get_stats(&self) -> CircuitBreakerStats {
        self.stats.read().await.clone()
    }

    pub async fn reset(&self) {
        let mut stats = self.stats.write().await;
        *stats = CircuitBreakerStats::new(&self.config);
    }
}

fn next_attempt(recovery_timeout: Duration) -> DateTime<Utc> {
    Utc::now()
        + chrono::Duration::from_std(recovery_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_millis(100),
            max_recovery_timeout: Duration::from_millis(800),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_closed_state_passes_calls() {
        let cb = CircuitBreaker::new("extractor");
        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let result = cb.execute(|| async { Ok::<_, OrchestratorError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_blocks_calls() {
        let cb = CircuitBreaker::with_config("extractor", fast_config(3));
        let invocations = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let invocations = Arc::clone(&invocations);
            let result: OrchestratorResult<()> = cb
                .execute(move || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Err(OrchestratorError::DependencyFailure("boom".to_string()))
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        // While open, the wrapped operation must not run at all.
        let invocations2 = Arc::clone(&invocations);
        let result = cb
            .execute(move || async move {
                invocations2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OrchestratorError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(OrchestratorError::CircuitBreakerOpen { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        let stats = cb.get_stats().await;
        assert!(stats.next_attempt_at.is_some());
        assert!(stats.failure_rate() > 0.99);
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes() {
        let cb = CircuitBreaker::with_config("extractor", fast_config(2));

        for _ in 0..2 {
            let _: OrchestratorResult<()> = cb
                .execute(|| async {
                    Err(OrchestratorError::DependencyFailure("boom".to_string()))
                })
                .await;
        }
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = cb.execute(|| async { Ok::<_, OrchestratorError>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let stats = cb.get_stats().await;
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_half_open_admits_single_probe() {
        let cb = CircuitBreaker::with_config("extractor", fast_config(1));

        let _: OrchestratorResult<()> = cb
            .execute(|| async { Err(OrchestratorError::DependencyFailure("boom".to_string())) })
            .await;
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // First call after the timeout becomes the probe and holds the slot.
        let (probe_tx, probe_rx) = tokio::sync::oneshot::channel::<()>();
        let cb_probe = cb.clone();
        let probe = tokio::spawn(async move {
            cb_probe
                .execute(move || async move {
                    let _ = probe_rx.await;
                    Ok::<_, OrchestratorError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);

        // A second caller is rejected while the probe is still in flight.
        let second = cb.execute(|| async { Ok::<_, OrchestratorError>(()) }).await;
        assert!(matches!(
            second,
            Err(OrchestratorError::CircuitBreakerOpen { .. })
        ));

        let _ = probe_tx.send(());
        let probe_result = probe.await.expect("probe task panicked");
        assert!(probe_result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_scales_recovery_timeout() {
        let cb = CircuitBreaker::with_config("extractor", fast_config(1));

        let _: OrchestratorResult<()> = cb
            .execute(|| async { Err(OrchestratorError::DependencyFailure("boom".to_string())) })
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let _: OrchestratorResult<()> = cb
            .execute(|| async { Err(OrchestratorError::DependencyFailure("boom".to_string())) })
            .await;

        let stats = cb.get_stats().await;
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.current_recovery_timeout, Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_call_timeout_counts_as_failure() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            call_timeout: Duration::from_millis(50),
            ..fast_config(1)
        };
        let cb = CircuitBreaker::with_config("extractor", config);

        let result: OrchestratorResult<()> = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(OrchestratorError::ExecutionTimeout)));
        assert_eq!(cb.get_state().await, CircuitState::Open);
    }
}
