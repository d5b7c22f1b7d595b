// ABOUTME: Client-owned offline sync queue with a background drainer
// ABOUTME: Single-owner discipline - UI appends, one drainer drains, removal only after confirmed application
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Offline Sync Queue
//!
//! Clients persist authored messages here while offline and drain them in
//! creation order once connectivity returns. An item leaves the queue only
//! after the server confirms application (a conflict counts: it is an
//! answer, not a failure) or after exceeding the retry ceiling, in which
//! case it is surfaced in the drain report, never silently dropped.

use crate::lifecycle::ShutdownSignal;
use crate::resilience::{retry, AttemptOutcome, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::protocol::{SyncItemBody, SyncResponseBody, SyncResultStatus, SyncedMessageBody};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Operation type of a queued write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOperation {
    CreateMessage,
}

/// One persisted entry of the client offline queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Client-local id; the queue key and reconciliation idempotency key
    pub local_id: String,
    pub operation: QueueOperation,
    pub conversation_id: String,
    /// The sync item exactly as it will be sent
    pub payload: SyncItemBody,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Persistence backend for the offline queue
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an item; the queue is append-only until drained
    async fn append(&self, item: SyncQueueItem) -> AppResult<()>;

    /// All items in creation order
    async fn list(&self) -> AppResult<Vec<SyncQueueItem>>;

    /// Update an item's retry counter
    async fn set_retry_count(&self, local_id: &str, retry_count: u32) -> AppResult<()>;

    /// Remove an item after confirmed application or permanent failure
    async fn remove(&self, local_id: &str) -> AppResult<()>;
}

/// Volatile queue store for tests and ephemeral clients
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<SyncQueueItem>>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn append(&self, item: SyncQueueItem) -> AppResult<()> {
        self.items.lock().await.push(item);
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<SyncQueueItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn set_retry_count(&self, local_id: &str, retry_count: u32) -> AppResult<()> {
        let mut items = self.items.lock().await;
        if let Some(item) = items.iter_mut().find(|i| i.local_id == local_id) {
            item.retry_count = retry_count;
        }
        Ok(())
    }

    async fn remove(&self, local_id: &str) -> AppResult<()> {
        self.items.lock().await.retain(|i| i.local_id != local_id);
        Ok(())
    }
}

/// JSON-file-backed queue store; survives client restarts
pub struct FileQueueStore {
    path: PathBuf,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl FileQueueStore {
    /// Open (or create) the queue file at `path`
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file exists but cannot be read or
    /// parsed.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let items = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| AppError::storage("read queue file").with_source(e))?;
            serde_json::from_slice(&raw)
                .map_err(|e| AppError::storage("parse queue file").with_source(e))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    fn persist(&self, items: &[SyncQueueItem]) -> AppResult<()> {
        let raw = serde_json::to_vec_pretty(items)
            .map_err(|e| AppError::storage("encode queue file").with_source(e))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| AppError::storage("write queue file").with_source(e))
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn append(&self, item: SyncQueueItem) -> AppResult<()> {
        let mut items = self.items.lock().await;
        items.push(item);
        self.persist(&items)
    }

    async fn list(&self) -> AppResult<Vec<SyncQueueItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn set_retry_count(&self, local_id: &str, retry_count: u32) -> AppResult<()> {
        let mut items = self.items.lock().await;
        if let Some(item) = items.iter_mut().find(|i| i.local_id == local_id) {
            item.retry_count = retry_count;
        }
        self.persist(&items)
    }

    async fn remove(&self, local_id: &str) -> AppResult<()> {
        let mut items = self.items.lock().await;
        items.retain(|i| i.local_id != local_id);
        self.persist(&items)
    }
}

/// Transport used to deliver batches to the server
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send one conversation's batch and return the per-item results
    async fn send_batch(
        &self,
        conversation_id: &str,
        items: Vec<SyncItemBody>,
    ) -> AppResult<SyncResponseBody>;
}

/// An item dropped after exceeding the retry ceiling; reported, never
/// silently discarded
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub local_id: String,
    pub conversation_id: String,
    pub retry_count: u32,
    pub reason: String,
}

/// Outcome of one drain pass
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Results confirmed by the server (synced and conflict alike)
    pub applied: Vec<SyncedMessageBody>,
    /// Items removed after exceeding the retry ceiling
    pub failed: Vec<FailedItem>,
    /// Items still queued for a later pass
    pub remaining: usize,
}

/// The client offline queue: append from UI code, drain from one background
/// worker
pub struct SyncQueue {
    store: Arc<dyn QueueStore>,
    /// Serializes drain passes; appends may interleave safely
    drain_lock: Mutex<()>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            drain_lock: Mutex::new(()),
        }
    }

    /// Append an authored message to the queue (UI side)
    ///
    /// # Errors
    ///
    /// Propagates queue store failures.
    pub async fn enqueue(
        &self,
        conversation_id: impl Into<String>,
        payload: SyncItemBody,
    ) -> AppResult<()> {
        let item = SyncQueueItem {
            local_id: payload.local_id.clone(),
            operation: QueueOperation::CreateMessage,
            conversation_id: conversation_id.into(),
            payload,
            retry_count: 0,
            created_at: Utc::now(),
        };
        self.store.append(item).await
    }

    /// Number of queued items
    pub async fn pending(&self) -> AppResult<usize> {
        Ok(self.store.list().await?.len())
    }

    /// Drain the queue in creation order, one batch per conversation.
    ///
    /// Transport failures are retried per `policy`; items whose retry count
    /// exceeds `max_item_retries` are removed and reported in the drain
    /// report's `failed` list.
    ///
    /// # Errors
    ///
    /// Propagates queue store failures; transport failures are absorbed into
    /// the report.
    pub async fn drain(
        &self,
        transport: &dyn SyncTransport,
        policy: &RetryPolicy,
        max_item_retries: u32,
        shutdown: &ShutdownSignal,
    ) -> AppResult<DrainReport> {
        let _guard = self.drain_lock.lock().await;
        let snapshot = self.store.list().await?;
        let mut report = DrainReport::default();

        // Group by conversation, preserving creation order within and
        // across groups
        let mut groups: Vec<(String, Vec<SyncQueueItem>)> = Vec::new();
        for item in snapshot {
            match groups.iter_mut().find(|(c, _)| *c == item.conversation_id) {
                Some((_, items)) => items.push(item),
                None => groups.push((item.conversation_id.clone(), vec![item])),
            }
        }

        for (conversation_id, items) in groups {
            if shutdown.is_shutdown() {
                break;
            }
            let payloads: Vec<SyncItemBody> =
                items.iter().map(|i| i.payload.clone()).collect();

            let outcome = retry(policy, shutdown, |_| {
                transport.send_batch(&conversation_id, payloads.clone())
            })
            .await;

            match outcome {
                AttemptOutcome::Success(response) => {
                    self.apply_response(&conversation_id, &items, response, max_item_retries, &mut report)
                        .await?;
                }
                AttemptOutcome::RetryExhausted { attempts, error } => {
                    warn!(conversation_id = %conversation_id, attempts, error = %error, "sync batch failed after retries");
                    self.bump_group(&items, max_item_retries, &error.to_string(), &mut report)
                        .await?;
                }
                AttemptOutcome::NonRetryable { error } => {
                    warn!(conversation_id = %conversation_id, error = %error, "sync batch rejected");
                    self.bump_group(&items, max_item_retries, &error.to_string(), &mut report)
                        .await?;
                }
                AttemptOutcome::CircuitOpen { retry_after } => {
                    info!(
                        conversation_id = %conversation_id,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "sync transport circuit open; deferring drain"
                    );
                    // Not the items' fault: leave retry counts untouched
                }
            }
        }

        report.remaining = self.store.list().await?.len();
        Ok(report)
    }

    async fn apply_response(
        &self,
        conversation_id: &str,
        items: &[SyncQueueItem],
        response: SyncResponseBody,
        max_item_retries: u32,
        report: &mut DrainReport,
    ) -> AppResult<()> {
        for result in response.synced_messages {
            match result.status {
                SyncResultStatus::Synced | SyncResultStatus::Conflict => {
                    // Confirmed application; a conflict still needs the
                    // caller's decision but is out of the queue's hands
                    self.store.remove(&result.local_id).await?;
                    report.applied.push(result);
                }
                SyncResultStatus::Error => {
                    let retry_count = items
                        .iter()
                        .find(|i| i.local_id == result.local_id)
                        .map_or(0, |i| i.retry_count)
                        + 1;
                    if retry_count > max_item_retries {
                        self.store.remove(&result.local_id).await?;
                        report.failed.push(FailedItem {
                            local_id: result.local_id.clone(),
                            conversation_id: conversation_id.to_owned(),
                            retry_count,
                            reason: "server-side storage failure; retry ceiling exceeded".into(),
                        });
                    } else {
                        self.store
                            .set_retry_count(&result.local_id, retry_count)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn bump_group(
        &self,
        items: &[SyncQueueItem],
        max_item_retries: u32,
        reason: &str,
        report: &mut DrainReport,
    ) -> AppResult<()> {
        for item in items {
            let retry_count = item.retry_count + 1;
            if retry_count > max_item_retries {
                self.store.remove(&item.local_id).await?;
                report.failed.push(FailedItem {
                    local_id: item.local_id.clone(),
                    conversation_id: item.conversation_id.clone(),
                    retry_count,
                    reason: reason.to_owned(),
                });
            } else {
                self.store.set_retry_count(&item.local_id, retry_count).await?;
            }
        }
        Ok(())
    }
}
