// ABOUTME: Server lifecycle management with a broadcastable shutdown signal
// ABOUTME: Suspension points (backoff sleeps, cool-downs, queues) observe one signal per instance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! Graceful shutdown signalling.
//!
//! One [`Lifecycle`] is owned by a server instance; every long-lived task
//! and every cancellable suspension point holds a [`ShutdownSignal`] clone.
//! No global state: tests create isolated lifecycles freely.

use tokio::sync::watch;
use tracing::info;

/// Owner side of the shutdown signal
pub struct Lifecycle {
    tx: watch::Sender<bool>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A signal handle for a task or suspension point
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Broadcast shutdown to every held signal
    pub fn shutdown(&self) {
        info!("shutdown signalled");
        let _ = self.tx.send(true);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle observing the shutdown broadcast
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl ShutdownSignal {
    /// A signal that never fires, for contexts without a lifecycle (tests,
    /// standalone tools)
    #[must_use]
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether shutdown has been signalled
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve when shutdown is signalled; pends forever on a `never` signal
    pub async fn recv(&self) {
        match self.rx.clone() {
            Some(mut rx) => {
                if *rx.borrow() {
                    return;
                }
                // A closed channel means the lifecycle owner is gone; treat
                // that as shutdown rather than running on unowned
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        return;
                    }
                }
            }
            None => std::future::pending().await,
        }
    }
}
