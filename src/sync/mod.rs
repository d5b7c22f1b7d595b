// ABOUTME: Offline synchronization - server-side reconciliation and the client queue
// ABOUTME: At-least-once delivery with idempotent replay; conflicts surface as results, not faults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Offline Sync
//!
//! Two halves of the same contract:
//!
//! - [`reconciler::SyncService`] applies client-queued writes against server
//!   state, assigning canonical identifiers and sequence numbers, detecting
//!   conflicts, and staying idempotent under replay.
//! - [`queue::SyncQueue`] is the client-owned persisted queue drained in
//!   creation order through the resilience layer.

pub mod queue;
pub mod reconciler;

pub use queue::{
    DrainReport, FailedItem, FileQueueStore, MemoryQueueStore, QueueOperation, QueueStore,
    SyncQueue, SyncQueueItem, SyncTransport,
};
pub use reconciler::{ConflictPolicy, SyncService};
