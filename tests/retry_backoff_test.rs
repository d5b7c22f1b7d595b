// ABOUTME: Tests for the retry-with-backoff combinator and the combined resilience contract
// ABOUTME: Verifies attempt counting, classification, delay bounds, and circuit integration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy
#![allow(missing_docs)]

use colloquy_server::errors::AppError;
use colloquy_server::lifecycle::{Lifecycle, ShutdownSignal};
use colloquy_server::resilience::{
    retry, AttemptOutcome, CircuitBreakerConfig, Resilient, RetryPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(4),
        multiplier: 2.0,
        max_retries,
    }
}

#[tokio::test]
async fn permanently_failing_retryable_operation_makes_exactly_max_plus_one_attempts() {
    let attempts = AtomicU32::new(0);
    let outcome: AttemptOutcome<(), AppError> =
        retry(&fast_policy(3), &ShutdownSignal::never(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::transient("connection reset")) }
        })
        .await;

    // initial + 3 retries
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    match outcome {
        AttemptOutcome::RetryExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn non_retryable_error_fails_immediately_consuming_no_budget() {
    let attempts = AtomicU32::new(0);
    let outcome: AttemptOutcome<(), AppError> =
        retry(&fast_policy(5), &ShutdownSignal::never(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::permission_denied("bad identity")) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, AttemptOutcome::NonRetryable { .. }));
}

#[tokio::test]
async fn success_after_transient_failures_reports_the_value() {
    let attempts = AtomicU32::new(0);
    let outcome = retry(&fast_policy(5), &ShutdownSignal::never(), |attempt| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err(AppError::timeout("slow downstream"))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.success(), Some(3));
}

#[tokio::test]
async fn shutdown_during_backoff_abandons_remaining_retries() {
    let lifecycle = Lifecycle::new();
    let signal = lifecycle.signal();
    lifecycle.shutdown();

    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy {
        initial_interval: Duration::from_secs(60),
        max_interval: Duration::from_secs(60),
        multiplier: 2.0,
        max_retries: 5,
    };
    let outcome: AttemptOutcome<(), AppError> = retry(&policy, &signal, |_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(AppError::transient("unreachable")) }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, AttemptOutcome::RetryExhausted { attempts: 1, .. }));
}

#[tokio::test]
async fn resilient_attempt_reports_circuit_open_without_io() {
    let resilient = Resilient::new(
        "downstream",
        fast_policy(0),
        CircuitBreakerConfig::new(1, Duration::from_secs(60)),
    );

    // Trip the breaker with one retryable failure
    let first: AttemptOutcome<(), AppError> = resilient
        .attempt(&ShutdownSignal::never(), |_| async {
            Err(AppError::transient("boom"))
        })
        .await;
    assert!(matches!(first, AttemptOutcome::RetryExhausted { .. }));

    // Now the circuit is open: the operation must not run
    let ran = AtomicU32::new(0);
    let second: AttemptOutcome<(), AppError> = resilient
        .attempt(&ShutdownSignal::never(), |_| {
            ran.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
    assert!(matches!(second, AttemptOutcome::CircuitOpen { .. }));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resilient_attempt_passes_success_through() {
    let resilient = Resilient::new(
        "downstream",
        fast_policy(2),
        CircuitBreakerConfig::default(),
    );
    let outcome: AttemptOutcome<u32, AppError> = resilient
        .attempt(&ShutdownSignal::never(), |attempt| async move {
            if attempt == 1 {
                Err(AppError::transient("first try fails"))
            } else {
                Ok(attempt)
            }
        })
        .await;
    assert_eq!(outcome.success(), Some(2));
}
