// ABOUTME: Circuit breaker guarding outbound dependencies of the sync path
// ABOUTME: Fails fast after repeated failures; one half-open trial after cool-down
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::retry::Retryable;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Circuit is open - requests fail immediately without I/O
    Open,
    /// Testing recovery - exactly one trial request is allowed through
    HalfOpen,
}

impl CircuitState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::HalfOpen,
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Cool-down before the half-open trial is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }
}

/// Rejection produced by a breaker-protected call
#[derive(Debug)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was not attempted
    Open { retry_after: Duration },
    /// The operation ran and failed
    Inner(E),
}

/// Thread-safe circuit breaker for outbound calls.
///
/// The breaker owns no knowledge of what it protects, only how failures are
/// handled. All state is managed with atomics, safe for concurrent access
/// without locks.
///
/// # States
///
/// - **Closed**: requests pass through, consecutive retryable failures are
///   counted.
/// - **Open**: tripped after the failure threshold; calls fail immediately.
/// - **Half-open**: after the cool-down, exactly one trial call is allowed;
///   success closes the circuit, failure reopens it.
pub struct CircuitBreaker {
    /// Dependency name for logging
    name: String,
    /// Current state (0=Closed, 1=Open, 2=HalfOpen)
    state: AtomicU8,
    /// Count of consecutive retryable failures
    failure_count: AtomicU32,
    /// Milliseconds since `start_instant` when the circuit last opened
    last_failure_time: AtomicU64,
    config: CircuitBreakerConfig,
    start_instant: Instant,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    #[must_use]
    pub fn with_config(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_owned(),
            state: AtomicU8::new(CircuitState::Closed.to_u8()),
            failure_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
            config,
            start_instant: Instant::now(),
        }
    }

    /// Current circuit state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Count of consecutive retryable failures
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Check whether a call may proceed, transitioning open → half-open when
    /// the cool-down has elapsed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => self.should_attempt_recovery(),
            // Only one trial at a time in half-open
            CircuitState::HalfOpen => false,
        }
    }

    fn should_attempt_recovery(&self) -> bool {
        let last_failure = self.last_failure_time.load(Ordering::SeqCst);
        let elapsed_ms = self.elapsed_millis();
        #[allow(clippy::cast_possible_truncation)]
        let recovery_ms = self.config.recovery_timeout.as_millis() as u64;

        if elapsed_ms.saturating_sub(last_failure) >= recovery_ms {
            let expected = CircuitState::Open.to_u8();
            let new_state = CircuitState::HalfOpen.to_u8();
            if self
                .state
                .compare_exchange(expected, new_state, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                info!(dependency = %self.name, "circuit half-open; allowing recovery trial");
                return true;
            }
        }
        false
    }

    fn elapsed_millis(&self) -> u64 {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.start_instant.elapsed().as_millis() as u64
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                // Trial succeeded; close immediately
                self.state
                    .store(CircuitState::Closed.to_u8(), Ordering::SeqCst);
                self.failure_count.store(0, Ordering::SeqCst);
                info!(dependency = %self.name, "circuit closed - dependency recovered");
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.state
                        .store(CircuitState::Open.to_u8(), Ordering::SeqCst);
                    self.last_failure_time
                        .store(self.elapsed_millis(), Ordering::SeqCst);
                    warn!(
                        dependency = %self.name,
                        failures = count,
                        threshold = self.config.failure_threshold,
                        recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                        "circuit opened - dependency failing"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state
                    .store(CircuitState::Open.to_u8(), Ordering::SeqCst);
                self.last_failure_time
                    .store(self.elapsed_millis(), Ordering::SeqCst);
                warn!(dependency = %self.name, "circuit re-opened - recovery trial failed");
            }
            CircuitState::Open => {
                self.last_failure_time
                    .store(self.elapsed_millis(), Ordering::SeqCst);
            }
        }
    }

    /// Time remaining until a recovery trial can be attempted
    #[must_use]
    pub fn time_until_recovery(&self) -> Duration {
        let last_failure = self.last_failure_time.load(Ordering::SeqCst);
        let elapsed = self.elapsed_millis();
        #[allow(clippy::cast_possible_truncation)]
        let recovery_ms = self.config.recovery_timeout.as_millis() as u64;

        Duration::from_millis(recovery_ms.saturating_sub(elapsed.saturating_sub(last_failure)))
    }

    /// Execute an async operation behind the breaker.
    ///
    /// Only retryable failures count toward opening the circuit; definitive
    /// rejections pass through without affecting breaker state.
    ///
    /// # Errors
    ///
    /// `CircuitError::Open` when the circuit is open and the cool-down has
    /// not elapsed; otherwise the wrapped operation's error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        if !self.is_allowed() {
            return Err(CircuitError::Open {
                retry_after: self.time_until_recovery(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                if error.is_retryable() {
                    self.record_failure();
                }
                Err(CircuitError::Inner(error))
            }
        }
    }

    /// Force the breaker back to closed; intended for tests and manual
    /// operator intervention
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed.to_u8(), Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        info!(dependency = %self.name, "circuit manually reset to closed");
    }
}
