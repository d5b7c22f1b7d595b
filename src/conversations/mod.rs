// ABOUTME: Conversation service - message tree rules, tip tracking, and branch switching
// ABOUTME: Append assigns branch indexes; siblings cycle regenerated alternatives; tip never hides branches
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Message Tree & Branch Model
//!
//! Messages within a conversation form a forest keyed by `previous_id`. A
//! parent with several children represents branches, created by edits or
//! regenerations. The conversation `tip` names the active leaf; switching
//! branches repoints it and never deletes the alternatives.

use crate::storage::{NewMessage, Storage};
use crate::ws::hub::ConnectionHub;
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::ids;
use colloquy_core::models::{Conversation, Message, MessageRole};
use colloquy_core::protocol::{
    BranchUpdateBody, Envelope, EventBody, GenerationRequestBody, SiblingInfo, TitleUpdateBody,
    TraceContext,
};
use std::sync::Arc;
use tracing::info;

/// Domain service for conversations and their branch trees
pub struct ConversationService {
    storage: Arc<dyn Storage>,
    hub: Arc<ConnectionHub>,
}

impl ConversationService {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, hub: Arc<ConnectionHub>) -> Self {
        Self { storage, hub }
    }

    /// Create a new conversation owned by the caller
    pub async fn create(&self, user_id: &str, title: &str) -> AppResult<Conversation> {
        let conversation =
            Conversation::new(ids::conversation_id(), user_id.to_owned(), title.to_owned());
        self.storage.create_conversation(conversation.clone()).await?;
        info!(conversation_id = %conversation.id, user_id = %user_id, "conversation created");
        Ok(conversation)
    }

    /// Fetch a conversation the caller owns
    pub async fn get(&self, user_id: &str, conversation_id: &str) -> AppResult<Conversation> {
        let conversation = self.storage.get_conversation(conversation_id).await?;
        if conversation.user_id != user_id {
            return Err(
                AppError::not_found(format!("conversation not found: {conversation_id}"))
                    .with_user_id(user_id),
            );
        }
        Ok(conversation)
    }

    /// List the caller's conversations; archived ones only on request
    pub async fn list(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>> {
        self.storage.list_conversations(user_id, include_archived).await
    }

    /// Soft-archive a conversation; it stays addressable
    pub async fn archive(&self, user_id: &str, conversation_id: &str) -> AppResult<Conversation> {
        let mut conversation = self.get(user_id, conversation_id).await?;
        conversation.archive();
        self.storage.update_conversation(conversation.clone()).await?;
        info!(conversation_id = %conversation_id, "conversation archived");
        Ok(conversation)
    }

    /// Rename a conversation and notify subscribers
    pub async fn rename(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> AppResult<Conversation> {
        let mut conversation = self.get(user_id, conversation_id).await?;
        conversation.set_title(title.to_owned());
        self.storage.update_conversation(conversation.clone()).await?;

        let envelope = Envelope::new(
            conversation_id,
            EventBody::TitleUpdate(TitleUpdateBody {
                conversation_id: conversation_id.to_owned(),
                title: title.to_owned(),
            }),
        );
        self.hub.broadcast(conversation_id, &envelope, None).await;
        Ok(conversation)
    }

    /// All messages of a conversation in sequence order
    pub async fn messages(&self, user_id: &str, conversation_id: &str) -> AppResult<Vec<Message>> {
        self.get(user_id, conversation_id).await?;
        self.storage.list_messages(conversation_id).await
    }

    /// Append a new child of `previous_id`.
    ///
    /// The new message's `branch_index` is the number of existing children
    /// of that parent. Fails with `ResourceNotFound` when the parent does
    /// not exist in the conversation, or when `previous_id` is `None` and
    /// the conversation already has a root.
    pub async fn append(
        &self,
        user_id: &str,
        conversation_id: &str,
        previous_id: Option<String>,
        role: MessageRole,
        content: String,
    ) -> AppResult<Message> {
        let mut conversation = self.get(user_id, conversation_id).await?;

        if previous_id.is_none() {
            let roots = self.storage.children_of(conversation_id, None).await?;
            if !roots.is_empty() {
                return Err(AppError::not_found(
                    "conversation already has a root; append under an existing message",
                ));
            }
        }

        let message = self
            .storage
            .insert_message(NewMessage::committed(
                ids::message_id(),
                conversation_id.to_owned(),
                previous_id,
                role,
                content,
            ))
            .await?;

        conversation.set_tip(message.id.clone());
        self.storage.update_conversation(conversation).await?;

        self.hub.broadcast_committed(&message).await;
        if message.branch_index > 0 {
            self.broadcast_branch_update(&message).await?;
        }
        Ok(message)
    }

    /// All messages sharing `message_id`'s parent, ordered by `branch_index`
    ///
    /// Clients use this to cycle between regenerated or edited alternatives.
    pub async fn siblings(&self, user_id: &str, message_id: &str) -> AppResult<Vec<Message>> {
        let message = self.storage.get_message(message_id).await?;
        // Ownership check rides on the conversation lookup
        self.get(user_id, &message.conversation_id).await?;
        self.storage
            .children_of(&message.conversation_id, message.previous_id.as_deref())
            .await
    }

    /// Repoint the conversation tip to `leaf_id`.
    ///
    /// The leaf must belong to the conversation; every stored message is
    /// reachable from a root by construction. Other branches are neither
    /// deleted nor hidden.
    pub async fn switch_branch(
        &self,
        user_id: &str,
        conversation_id: &str,
        leaf_id: &str,
    ) -> AppResult<Conversation> {
        let mut conversation = self.get(user_id, conversation_id).await?;
        let leaf = self.storage.get_message(leaf_id).await?;
        if leaf.conversation_id != conversation_id {
            return Err(AppError::not_found(format!(
                "message not found in conversation: {leaf_id}"
            )));
        }
        conversation.set_tip(leaf_id.to_owned());
        self.storage.update_conversation(conversation.clone()).await?;
        info!(conversation_id = %conversation_id, tip = %leaf_id, "branch switched");
        Ok(conversation)
    }

    /// Commit an inbound user message under the current tip, fan it out, and
    /// route a generation request to the agent
    pub async fn handle_user_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: String,
        trace: TraceContext,
    ) -> AppResult<Message> {
        if content.is_empty() {
            return Err(AppError::validation("user message has empty content"));
        }

        let mut conversation = self.get(user_id, conversation_id).await?;
        let previous_id = conversation.tip_message_id.clone();

        let message = self
            .storage
            .insert_message(NewMessage::committed(
                ids::message_id(),
                conversation_id.to_owned(),
                previous_id.clone(),
                MessageRole::User,
                content,
            ))
            .await?;

        conversation.set_tip(message.id.clone());
        self.storage.update_conversation(conversation).await?;

        info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            chars = message.content.len(),
            "user message committed"
        );

        self.hub.broadcast_committed(&message).await;
        if message.branch_index > 0 {
            self.broadcast_branch_update(&message).await?;
        }

        let request = Envelope::new(
            conversation_id,
            EventBody::GenerationRequest(GenerationRequestBody {
                conversation_id: conversation_id.to_owned(),
                message_id: message.id.clone(),
                previous_id,
                request_type: "send".into(),
                new_content: None,
                enable_tools: true,
                enable_reasoning: true,
                enable_streaming: true,
            }),
        )
        .with_trace(trace);
        self.hub.send_to_agent(&request).await;

        Ok(message)
    }

    /// Persist an assistant message arriving from the agent and repoint the
    /// tip; the caller fans the committed form out
    pub async fn record_assistant_message(
        &self,
        conversation_id: &str,
        message_id: String,
        previous_id: Option<String>,
        content: String,
    ) -> AppResult<Message> {
        let mut conversation = self.storage.get_conversation(conversation_id).await?;

        let message = self
            .storage
            .insert_message(NewMessage::committed(
                message_id,
                conversation_id.to_owned(),
                previous_id,
                MessageRole::Assistant,
                content,
            ))
            .await?;

        conversation.set_tip(message.id.clone());
        self.storage.update_conversation(conversation).await?;
        Ok(message)
    }

    /// Broadcast the sibling set of a parent that just gained a new branch
    async fn broadcast_branch_update(&self, new_sibling: &Message) -> AppResult<()> {
        let Some(parent_id) = new_sibling.previous_id.clone() else {
            return Ok(());
        };
        let siblings = self
            .storage
            .children_of(&new_sibling.conversation_id, Some(&parent_id))
            .await?;

        let infos: Vec<SiblingInfo> = siblings.iter().map(sibling_info).collect();
        let total = u32::try_from(infos.len()).unwrap_or(u32::MAX);
        let envelope = Envelope::new(
            new_sibling.conversation_id.clone(),
            EventBody::BranchUpdate(BranchUpdateBody {
                conversation_id: new_sibling.conversation_id.clone(),
                parent_message_id: parent_id,
                new_sibling: sibling_info(new_sibling),
                all_siblings: infos,
                total_count: total,
            }),
        );
        self.hub
            .broadcast(&new_sibling.conversation_id, &envelope, None)
            .await;
        Ok(())
    }
}

fn sibling_info(message: &Message) -> SiblingInfo {
    SiblingInfo {
        id: message.id.clone(),
        content: message.content.clone(),
        branch_index: message.branch_index,
        created_at: message.created_at.into(),
    }
}
