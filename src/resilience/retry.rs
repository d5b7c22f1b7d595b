// ABOUTME: Generic retry-with-exponential-backoff combinator and error classification
// ABOUTME: Non-retryable failures consume no budget; exhaustion reports the attempt count
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use crate::lifecycle::ShutdownSignal;
use colloquy_core::errors::AppError;
use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Cap applied to the growing delay
    pub max_interval: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Retries after the initial attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// The delay preceding retry number `retry` (1-based), non-decreasing
    /// and capped at `max_interval`
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX));
        let scaled = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(scaled.min(self.max_interval.as_secs_f64()))
    }
}

/// Classification of failures into retryable and non-retryable
pub trait Retryable {
    /// Whether the operation may succeed if attempted again
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }
}

impl Retryable for io::Error {
    fn is_retryable(&self) -> bool {
        // Timeouts and torn connections are worth another attempt; not-found
        // (the definitive DNS answer) and permission failures are not
        matches!(
            self.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::WouldBlock
        )
    }
}

/// Whether an HTTP status code indicates a retryable condition
///
/// 408 (request timeout), 429 (rate limited), and all 5xx retry; every other
/// 4xx is a definitive rejection.
#[must_use]
pub const fn retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (status >= 500 && status < 600)
}

/// Outcome of a resilient attempt
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    /// The operation succeeded within the retry budget
    Success(T),
    /// Every attempt failed with a retryable error; `error` is the last one
    RetryExhausted { attempts: u32, error: E },
    /// The operation failed with an error that retrying cannot fix
    NonRetryable { error: E },
    /// The protecting circuit is open; no I/O was attempted
    CircuitOpen { retry_after: Duration },
}

impl<T, E> AttemptOutcome<T, E> {
    /// The success value, if any
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Run `op` with exponential backoff under `policy`.
///
/// `op` receives the 1-based attempt number. Non-retryable errors fail
/// immediately without consuming retry budget. A shutdown arriving during a
/// backoff sleep cuts the budget short and reports the attempts made so far.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
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
        attempts += 1;
        match op(attempts).await {
            Ok(value) => return AttemptOutcome::Success(value),
            Err(error) if !error.is_retryable() => {
                debug!(attempt = attempts, error = %error, "non-retryable failure");
                return AttemptOutcome::NonRetryable { error };
            }
            Err(error) => {
                if attempts > policy.max_retries {
                    warn!(attempts, error = %error, "retry budget exhausted");
                    return AttemptOutcome::RetryExhausted { attempts, error };
                }
                let delay = policy.delay_before_retry(attempts);
                debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %error, "retrying after backoff");
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
