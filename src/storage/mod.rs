// ABOUTME: Storage abstraction for conversations and messages
// ABOUTME: Backend-agnostic trait offering atomic inserts with unique-key conflict detection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Storage Abstraction
//!
//! The persistence engine is an external collaborator: this trait captures
//! the operations the sync core needs (atomic per-row insert/update with
//! unique-key conflict detection) without committing to a backend. The
//! bundled [`memory::MemoryStorage`] is the reference implementation used by
//! the server and the test suite.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colloquy_core::errors::AppResult;
use colloquy_core::models::{Conversation, Message, MessageRole, MessageStatus, SyncState};

pub use memory::MemoryStorage;

/// Insert payload for a message; the backend assigns `branch_index` and
/// `sequence_number` atomically with the row insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub local_id: Option<String>,
    pub conversation_id: String,
    pub previous_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub sync_state: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Server-authored message committed in one step
    #[must_use]
    pub fn committed(
        id: String,
        conversation_id: String,
        previous_id: Option<String>,
        role: MessageRole,
        content: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            local_id: None,
            conversation_id,
            previous_id,
            role,
            content,
            status: MessageStatus::Completed,
            sync_state: SyncState::Synced,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }
}

/// Backend-agnostic persistence operations for the sync core
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a conversation row
    async fn create_conversation(&self, conversation: Conversation) -> AppResult<()>;

    /// Fetch a conversation by id
    async fn get_conversation(&self, id: &str) -> AppResult<Conversation>;

    /// List a caller's conversations, newest first; archived conversations
    /// are excluded unless requested
    async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>>;

    /// Persist updated conversation fields (title, status, tip)
    async fn update_conversation(&self, conversation: Conversation) -> AppResult<()>;

    /// Insert a message, atomically assigning `branch_index` (current child
    /// count of the parent) and the next per-conversation `sequence_number`.
    ///
    /// Fails with `ResourceNotFound` when the conversation or the claimed
    /// parent does not exist, and with `StorageError` on a duplicate id or a
    /// duplicate `(conversation, local_id)` key.
    async fn insert_message(&self, message: NewMessage) -> AppResult<Message>;

    /// Fetch a message by canonical id
    async fn get_message(&self, id: &str) -> AppResult<Message>;

    /// Look up a previously committed message by its client-local id
    async fn find_by_local_id(
        &self,
        conversation_id: &str,
        local_id: &str,
    ) -> AppResult<Option<Message>>;

    /// Persist updated message fields
    async fn update_message(&self, message: Message) -> AppResult<()>;

    /// All messages of a conversation in sequence order
    async fn list_messages(&self, conversation_id: &str) -> AppResult<Vec<Message>>;

    /// Messages with `sequence_number` strictly greater than `sequence`,
    /// in sequence order
    async fn messages_after(&self, conversation_id: &str, sequence: u64)
        -> AppResult<Vec<Message>>;

    /// Children of `previous_id` (roots when `None`), ordered by
    /// `branch_index`
    async fn children_of(
        &self,
        conversation_id: &str,
        previous_id: Option<&str>,
    ) -> AppResult<Vec<Message>>;
}
