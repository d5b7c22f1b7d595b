// ABOUTME: Resilience layer - retry-with-backoff and circuit-breaker combinators
// ABOUTME: Cross-cutting utilities wrapping any outbound call made while processing sync or generation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Resilience Layer
//!
//! Generic higher-order combinators (a policy value plus an operation
//! closure) reused by the reconciler, the client sync queue, and any future
//! outbound dependency. The layer owns no state about *what* it protects,
//! only *how* failures are handled.
//!
//! The combined contract is [`Resilient::attempt`]:
//! `success(value) | retry exhausted | non-retryable | circuit open`.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};
pub use retry::{retry, retryable_status, AttemptOutcome, RetryPolicy, Retryable};

use crate::lifecycle::ShutdownSignal;
use std::future::Future;
use tracing::warn;

/// A retry policy and a circuit breaker protecting one outbound dependency
pub struct Resilient {
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl Resilient {
    #[must_use]
    pub fn new(name: &str, policy: RetryPolicy, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            policy,
            breaker: CircuitBreaker::with_config(name, breaker_config),
        }
    }

    /// The breaker, for observability and tests
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` under the retry policy with every attempt gated by the
    /// circuit breaker.
    ///
    /// An open circuit short-circuits before the operation is invoked; no
    /// I/O is attempted. Non-retryable errors fail immediately and do not
    /// trip the breaker. Retryable failures consume retry budget with
    /// exponential backoff; backoff sleeps observe the shutdown signal.
    pub async fn attempt<T, E, F, Fut>(
        &self,
        shutdown: &ShutdownSignal,
        mut op: F,
    ) -> AttemptOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0u32;
        loop {
            if !self.breaker.is_allowed() {
                return AttemptOutcome::CircuitOpen {
                    retry_after: self.breaker.time_until_recovery(),
                };
            }
            attempts += 1;
            match op(attempts).await {
                Ok(value) => {
                    self.breaker.record_success();
                    return AttemptOutcome::Success(value);
                }
                Err(error) if !error.is_retryable() => {
                    return AttemptOutcome::NonRetryable { error };
                }
                Err(error) => {
                    self.breaker.record_failure();
                    if attempts > self.policy.max_retries {
                        return AttemptOutcome::RetryExhausted { attempts, error };
                    }
                    let delay = self.policy.delay_before_retry(attempts);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = shutdown.recv() => {
                            warn!(attempts, "shutdown during backoff; abandoning retries");
                            return AttemptOutcome::RetryExhausted { attempts, error };
                        }
                    }
                }
            }
        }
    }
}
