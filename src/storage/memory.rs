// ABOUTME: In-memory reference implementation of the storage abstraction
// ABOUTME: Single write-lock state keeps branch-index and sequence assignment atomic
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::{NewMessage, Storage};
use async_trait::async_trait;
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::models::{Conversation, Message};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Message>,
    /// Per-conversation message ids in insertion (= sequence) order
    by_conversation: HashMap<String, Vec<String>>,
    /// Last assigned sequence number per conversation
    sequences: HashMap<String, u64>,
}

/// In-memory storage backend
///
/// All state lives behind one `RwLock` so that branch-index computation,
/// sequence allocation, and the row insert are a single atomic step, the
/// same guarantee a relational backend provides with an insert-select.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_conversation(&self, conversation: Conversation) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(AppError::storage(format!(
                "conversation already exists: {}",
                conversation.id
            )));
        }
        state
            .by_conversation
            .entry(conversation.id.clone())
            .or_default();
        state
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> AppResult<Conversation> {
        let state = self.state.read().await;
        state
            .conversations
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("conversation not found: {id}")))
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| include_archived || !c.is_archived())
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn update_conversation(&self, conversation: Conversation) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation.id) {
            return Err(AppError::not_found(format!(
                "conversation not found: {}",
                conversation.id
            )));
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut state = self.state.write().await;

        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(AppError::not_found(format!(
                "conversation not found: {}",
                message.conversation_id
            )));
        }
        if state.messages.contains_key(&message.id) {
            return Err(AppError::storage(format!(
                "message already exists: {}",
                message.id
            )));
        }
        if let Some(previous_id) = &message.previous_id {
            let parent_ok = state
                .messages
                .get(previous_id)
                .is_some_and(|p| p.conversation_id == message.conversation_id);
            if !parent_ok {
                return Err(AppError::not_found(format!(
                    "parent message not found: {previous_id}"
                )));
            }
        }
        if let Some(local_id) = &message.local_id {
            let duplicate = state
                .by_conversation
                .get(&message.conversation_id)
                .into_iter()
                .flatten()
                .filter_map(|id| state.messages.get(id))
                .any(|m| m.local_id.as_deref() == Some(local_id));
            if duplicate {
                return Err(AppError::storage(format!(
                    "duplicate local id in conversation: {local_id}"
                )));
            }
        }

        let branch_index = u32::try_from(
            state
                .by_conversation
                .get(&message.conversation_id)
                .into_iter()
                .flatten()
                .filter_map(|id| state.messages.get(id))
                .filter(|m| m.previous_id == message.previous_id)
                .count(),
        )
        .map_err(|_| AppError::storage("branch index overflow"))?;

        let sequence = state
            .sequences
            .entry(message.conversation_id.clone())
            .or_insert(0);
        *sequence += 1;
        let sequence_number = *sequence;

        let stored = Message {
            id: message.id.clone(),
            local_id: message.local_id,
            conversation_id: message.conversation_id.clone(),
            previous_id: message.previous_id,
            branch_index,
            sequence_number,
            role: message.role,
            content: message.content,
            status: message.status,
            sync_state: message.sync_state,
            created_at: message.created_at,
            updated_at: message.updated_at,
            synced_at: message.synced_at,
        };

        state
            .by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        state.messages.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, id: &str) -> AppResult<Message> {
        let state = self.state.read().await;
        state
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("message not found: {id}")))
    }

    async fn find_by_local_id(
        &self,
        conversation_id: &str,
        local_id: &str,
    ) -> AppResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state
            .by_conversation
            .get(conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id))
            .find(|m| m.local_id.as_deref() == Some(local_id))
            .cloned())
    }

    async fn update_message(&self, message: Message) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.messages.contains_key(&message.id) {
            return Err(AppError::not_found(format!(
                "message not found: {}",
                message.id
            )));
        }
        state.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .by_conversation
            .get(conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id))
            .cloned()
            .collect())
    }

    async fn messages_after(
        &self,
        conversation_id: &str,
        sequence: u64,
    ) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .by_conversation
            .get(conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id))
            .filter(|m| m.sequence_number > sequence)
            .cloned()
            .collect())
    }

    async fn children_of(
        &self,
        conversation_id: &str,
        previous_id: Option<&str>,
    ) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        let mut children: Vec<Message> = state
            .by_conversation
            .get(conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id))
            .filter(|m| m.previous_id.as_deref() == previous_id)
            .cloned()
            .collect();
        children.sort_by_key(|m| m.branch_index);
        Ok(children)
    }
}
