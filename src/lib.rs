// ABOUTME: Main library entry point for the Colloquy conversation sync server
// ABOUTME: Conversation synchronization, branching message trees, and real-time fan-out
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

#![deny(unsafe_code)]

//! # Colloquy Sync Server
//!
//! Backend core for a voice/text assistant product: mobile and web clients
//! exchange branching conversations with this server, which streams
//! AI-generated responses, tool calls, and memory traces in real time while
//! tolerating offline clients and flaky networks.
//!
//! ## Architecture
//!
//! - **Protocol** (`colloquy-core`): a tagged binary/text envelope codec
//!   multiplexed over a single connection per client
//! - **Conversations**: the branching message-tree model with tip tracking
//! - **Sync**: offline-queue reconciliation with conflict detection, plus
//!   the client-owned persisted queue
//! - **Ws**: per-conversation fan-out in commit order with per-connection
//!   backpressure
//! - **Resilience**: retry-with-backoff and circuit-breaker combinators
//!   wrapping outbound calls on the sync path
//!
//! ## Example
//!
//! ```rust,no_run
//! use colloquy_server::config::ServerConfig;
//! use colloquy_server::resources::ServerResources;
//! use colloquy_server::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::from_env()?;
//! let resources = ServerResources::new(config, Arc::new(MemoryStorage::new()));
//! let router = colloquy_server::routes::router(resources);
//! # let _ = router;
//! # Ok(())
//! # }
//! ```

/// Environment-driven server configuration
pub mod config;

/// Conversation service: message tree rules, tip tracking, branch switching
pub mod conversations;

/// Server lifecycle and the shutdown signal
pub mod lifecycle;

/// Structured logging setup
pub mod logging;

/// Resilience layer: retry-with-backoff and circuit breaker combinators
pub mod resilience;

/// Dependency container for one server instance
pub mod resources;

/// HTTP routes: REST surface, WebSocket upgrade, health
pub mod routes;

/// Storage abstraction and the in-memory reference backend
pub mod storage;

/// Offline sync: server-side reconciler and the client queue
pub mod sync;

/// Multiplexed WebSocket transport: hub and per-connection handling
pub mod ws;

pub use colloquy_core::{errors, ids, models, protocol};
