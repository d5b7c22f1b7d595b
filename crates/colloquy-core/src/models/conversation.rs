// ABOUTME: Conversation domain model with soft archive state and branch tip tracking
// ABOUTME: The tip names the active leaf message of the conversation's branch tree
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a conversation
///
/// Archiving is a soft state change: archived conversations remain
/// addressable but are excluded from default listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

/// A conversation owned by a single caller identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation id
    pub id: String,
    /// Opaque caller identity that owns the conversation
    pub user_id: String,
    /// Conversation title (auto-generated or user-defined)
    pub title: String,
    /// Lifecycle state
    pub status: ConversationStatus,
    /// Currently active leaf message, if any message exists yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_message_id: Option<String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new active conversation
    #[must_use]
    pub fn new(id: String, user_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            title,
            status: ConversationStatus::Active,
            tip_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Soft-archive the conversation
    pub fn archive(&mut self) {
        self.status = ConversationStatus::Archived;
        self.updated_at = Utc::now();
    }

    /// Repoint the tip to a new active leaf
    pub fn set_tip(&mut self, message_id: String) {
        self.tip_message_id = Some(message_id);
        self.updated_at = Utc::now();
    }

    /// Rename the conversation
    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.status == ConversationStatus::Archived
    }
}
