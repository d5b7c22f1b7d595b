// ABOUTME: Message domain model for the branching conversation tree
// ABOUTME: Tracks tree position, advisory sequence numbers, and offline sync state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    /// Parse a wire role string; unknown values are rejected
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Processing state of a message during generation/streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Completed,
    Error,
}

/// Synchronization state of a message relative to its originating client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Exists locally but has not been applied by the server
    Pending,
    /// Applied by the server and assigned a canonical id
    Synced,
    /// A sync conflict requires manual resolution
    Conflict,
}

/// A message in a conversation's branch tree
///
/// Messages within a conversation form a forest keyed by `previous_id`.
/// `sequence_number` is a display/ordering hint only and never drives the
/// tree structure; two messages on different branches may hold adjacent
/// sequence numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Canonical server-assigned id; never reassigned once allocated
    pub id: String,
    /// Client-assigned id, stable across reconnects and retries; the
    /// idempotency key for reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// Parent message; `None` only for a conversation root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    /// Position among siblings sharing the same parent
    pub branch_index: u32,
    /// Monotonic per conversation; advisory ordering only
    pub sequence_number: u64,
    /// Author role
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Processing state
    pub status: MessageStatus,
    /// Sync state relative to the originating client
    pub sync_state: SyncState,
    /// When the message was created (client clock for synced messages)
    pub created_at: DateTime<Utc>,
    /// When the message was last updated
    pub updated_at: DateTime<Utc>,
    /// When the message was applied by the server, if it arrived via sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Mark the message as carrying an unresolved sync conflict
    pub fn mark_conflict(&mut self) {
        self.sync_state = SyncState::Conflict;
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.previous_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_round_trips() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("agent"), None);
    }
}
