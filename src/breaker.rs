//! Circuit breaker guarding outbound dependencies.
//!
//! One breaker instance is constructed per protected resource (email
//! provider, document store) at process start and shared by reference; state
//! is in-memory only and resets to CLOSED on restart.
//!
//! # State machine
//!
//! ```text
//!           failures >= threshold
//! CLOSED ───────────────────────────▶ OPEN
//!    ▲                                  │ now >= next_attempt
//!    │ trial success                    ▼
//!    └────────────────────────────── HALF_OPEN
//!                 trial failure ──▶ OPEN (renewed timeout)
//! ```
//!
//! While CLOSED, an isolated success does not reset the failure count; only
//! a HALF_OPEN trial success (or an explicit [`CircuitBreaker::reset`])
//! clears it.

use std::future::Future;
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Breaker tuning, injected at construction rather than read from globals.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive-failure count that opens the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing trial calls.
    pub recovery_timeout: Duration,
    /// Maximum in-flight trial calls while half-open.
    pub half_open_max_calls: u32,
}

impl BreakerConfig {
    /// Preset for the outbound email provider.
    pub const EMAIL_PROVIDER: Self = Self {
        failure_threshold: 5,
        recovery_timeout: Duration::from_secs(30),
        half_open_max_calls: 3,
    };

    /// Preset for the document store.
    pub const DOCUMENT_STORE: Self = Self {
        failure_threshold: 3,
        recovery_timeout: Duration::from_secs(15),
        half_open_max_calls: 2,
    };
}

/// Health state of a protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls fail fast until the recovery timeout elapses.
    Open,
    /// A bounded number of trial calls probe the resource.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    half_open_calls: u32,
    next_attempt: Option<Instant>,
}

/// How a call was admitted; decides how its outcome is recorded.
enum Permit {
    Closed,
    Trial,
}

/// Circuit breaker wrapping any fallible unit of work.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named resource.
    pub fn new<S: Into<String>>(name: S, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                half_open_calls: 0,
                next_attempt: None,
            }),
        }
    }

    /// Current state (for status reporting and tests).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Force the breaker back to CLOSED and clear all counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.half_open_calls = 0;
        inner.next_attempt = None;
    }

    /// Run `op` under the breaker.
    ///
    /// While OPEN and before the recovery deadline this returns
    /// [`Error::BreakerOpen`] synchronously without invoking `op`. State
    /// mutation happens under a single mutex per call; the operation itself
    /// runs without the lock held.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.admit()?;

        let result = op().await;

        // Only dependency failures count against the circuit; domain errors
        // (validation, not-found) mean the resource answered fine.
        let healthy = !matches!(&result, Err(Error::ExternalService { .. }));
        self.record(&permit, healthy);
        result
    }

    /// Decide whether a call may proceed, transitioning OPEN -> HALF_OPEN
    /// when the recovery timeout has elapsed.
    fn admit(&self) -> Result<Permit> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::Closed),
            CircuitState::Open => {
                let due = inner
                    .next_attempt
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if !due {
                    counter!("breaker_rejected_total", "resource" => self.name.clone())
                        .increment(1);
                    return Err(Error::BreakerOpen {
                        resource: self.name.clone(),
                    });
                }
                debug!(resource = %self.name, "breaker half-open, allowing trial call");
                inner.state = CircuitState::HalfOpen;
                inner.half_open_calls = 1;
                Ok(Permit::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    counter!("breaker_rejected_total", "resource" => self.name.clone())
                        .increment(1);
                    return Err(Error::BreakerOpen {
                        resource: self.name.clone(),
                    });
                }
                inner.half_open_calls += 1;
                Ok(Permit::Trial)
            }
        }
    }

    /// Record a call outcome against the current state.
    fn record(&self, permit: &Permit, success: bool) {
        let mut inner = self.inner.lock();
        match (permit, success) {
            // Trial outcomes only apply while the circuit is still half-open:
            // a concurrent trial may already have reopened (or closed) it, and
            // a stale outcome must not override that transition.
            (Permit::Trial, true) => {
                if inner.state == CircuitState::HalfOpen {
                    debug!(resource = %self.name, "breaker trial succeeded, closing circuit");
                    counter!("breaker_closed_total", "resource" => self.name.clone()).increment(1);
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.half_open_calls = 0;
                    inner.next_attempt = None;
                }
            }
            (Permit::Trial, false) => {
                if inner.state == CircuitState::HalfOpen {
                    warn!(resource = %self.name, "breaker trial failed, reopening circuit");
                    counter!("breaker_opened_total", "resource" => self.name.clone()).increment(1);
                    inner.state = CircuitState::Open;
                    inner.half_open_calls = 0;
                    inner.next_attempt = Some(Instant::now() + self.config.recovery_timeout);
                }
            }
            (Permit::Closed, false) => {
                // A concurrent caller may already have opened the circuit;
                // in that case the counter no longer matters.
                if inner.state == CircuitState::Closed {
                    inner.failures += 1;
                    if inner.failures >= self.config.failure_threshold {
                        warn!(
                            resource = %self.name,
                            failures = inner.failures,
                            "failure threshold reached, opening circuit"
                        );
                        counter!("breaker_opened_total", "resource" => self.name.clone())
                            .increment(1);
                        inner.state = CircuitState::Open;
                        inner.next_attempt =
                            Some(Instant::now() + self.config.recovery_timeout);
                    }
                }
            }
            // Isolated success while CLOSED does not reset the counter.
            (Permit::Closed, true) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            half_open_max_calls: 2,
        }
    }

    async fn fail(breaker: &CircuitBreaker, calls: &Arc<AtomicU32>) -> crate::error::Result<()> {
        let calls = calls.clone();
        breaker
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::external("provider_error", "boom"))
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &Arc<AtomicU32>) -> crate::error::Result<()> {
        let calls = calls.clone();
        breaker
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new("test", test_config());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            assert!(fail(&breaker, &calls).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Fourth call is rejected without invoking the operation.
        let err = fail(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, Error::BreakerOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_does_not_reset_failures_while_closed() {
        let breaker = CircuitBreaker::new("test", test_config());
        let calls = Arc::new(AtomicU32::new(0));

        assert!(fail(&breaker, &calls).await.is_err());
        assert!(fail(&breaker, &calls).await.is_err());
        assert!(succeed(&breaker, &calls).await.is_ok());
        // Third failure still trips the threshold of 3.
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_success_closes_circuit() {
        let breaker = CircuitBreaker::new("test", test_config());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Recovery timeout elapsed: the trial call goes through and closes.
        assert!(succeed(&breaker, &calls).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Fully reset: it takes a full threshold of new failures to reopen.
        assert!(fail(&breaker, &calls).await.is_err());
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_with_new_timeout() {
        let breaker = CircuitBreaker::new("test", test_config());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Single half-open failure reopens immediately.
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        // Still open before the renewed timeout elapses.
        let before = calls.load(Ordering::SeqCst);
        let err = fail(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, Error::BreakerOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    /// Spawn a trial that blocks inside the operation until released.
    ///
    /// The first channel fires once the breaker has admitted the call; the
    /// returned sender releases the operation to complete successfully.
    async fn held_trial(
        breaker: &Arc<CircuitBreaker>,
        calls: &Arc<AtomicU32>,
    ) -> (
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<crate::error::Result<()>>,
    ) {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let breaker = breaker.clone();
        let calls = calls.clone();
        let handle = tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).ok();
                    release_rx.await.ok();
                    Ok(())
                })
                .await
        });
        started_rx.await.expect("trial admitted");
        (release_tx, handle)
    }

    #[tokio::test]
    async fn test_stale_trial_success_does_not_close_reopened_circuit() {
        let breaker = Arc::new(CircuitBreaker::new("test", test_config()));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        // First trial admitted and held in flight.
        let (release, slow) = held_trial(&breaker, &calls).await;

        // A second trial fails while the first is still running; the circuit
        // reopens with a renewed timeout.
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        // The slow trial's success arrives after the reopen and must not
        // cancel the renewed timeout.
        release.send(()).ok();
        slow.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_cap_rejects_excess_trials() {
        let breaker = Arc::new(CircuitBreaker::new("test", test_config()));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Fill both trial slots (half_open_max_calls = 2) with in-flight calls.
        let (release_a, trial_a) = held_trial(&breaker, &calls).await;
        let (release_b, trial_b) = held_trial(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A third call is rejected without invoking the operation.
        let before = calls.load(Ordering::SeqCst);
        let err = succeed(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, Error::BreakerOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), before);

        release_a.send(()).ok();
        release_b.send(()).ok();
        trial_a.await.unwrap().unwrap();
        trial_b.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let breaker = CircuitBreaker::new("test", test_config());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker, &calls).await.is_ok());
    }

    #[tokio::test]
    async fn test_presets() {
        assert_eq!(BreakerConfig::EMAIL_PROVIDER.failure_threshold, 5);
        assert_eq!(
            BreakerConfig::EMAIL_PROVIDER.recovery_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(BreakerConfig::EMAIL_PROVIDER.half_open_max_calls, 3);
        assert_eq!(BreakerConfig::DOCUMENT_STORE.failure_threshold, 3);
        assert_eq!(
            BreakerConfig::DOCUMENT_STORE.recovery_timeout,
            Duration::from_secs(15)
        );
        assert_eq!(BreakerConfig::DOCUMENT_STORE.half_open_max_calls, 2);
    }
}
