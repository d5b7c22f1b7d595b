// ABOUTME: Centralized resource container for dependency injection
// ABOUTME: One instance owns storage, the hub, the services, and the lifecycle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Server Resources
//!
//! Centralized resource container for dependency injection. One
//! [`ServerResources`] per server instance holds every shared object,
//! including the connection hub, which is deliberately scoped here rather
//! than living in process-wide global state, so shutdown is clean and tests
//! get isolated instances.

use crate::config::ServerConfig;
use crate::conversations::ConversationService;
use crate::lifecycle::Lifecycle;
use crate::storage::Storage;
use crate::sync::SyncService;
use crate::ws::ConnectionHub;
use std::sync::Arc;

/// Shared resources of one server instance
pub struct ServerResources {
    pub config: ServerConfig,
    pub storage: Arc<dyn Storage>,
    pub hub: Arc<ConnectionHub>,
    pub conversations: ConversationService,
    pub sync: SyncService,
    pub lifecycle: Lifecycle,
}

impl ServerResources {
    /// Wire up a server instance over the given storage backend
    #[must_use]
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Arc<Self> {
        let hub = Arc::new(ConnectionHub::new(config.ws.outbound_queue_capacity));
        let conversations = ConversationService::new(storage.clone(), hub.clone());
        let sync = SyncService::new(
            storage.clone(),
            hub.clone(),
            config.sync.lock_timeout,
            config.sync.max_batch_size,
        );

        Arc::new(Self {
            config,
            storage,
            hub,
            conversations,
            sync,
            lifecycle: Lifecycle::new(),
        })
    }
}
