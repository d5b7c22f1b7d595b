// ABOUTME: Offline sync reconciler - applies client-queued writes with conflict detection
// ABOUTME: Idempotent under replay; one in-flight batch per conversation with a bounded lock wait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use crate::storage::{NewMessage, Storage};
use crate::ws::hub::ConnectionHub;
use colloquy_core::errors::{AppError, AppResult, ErrorCode};
use colloquy_core::ids;
use colloquy_core::models::{Message, MessageRole, MessageStatus, SyncState};
use colloquy_core::protocol::{
    ConflictDetailBody, SyncItemBody, SyncRequestBody, SyncResponseBody, SyncResultStatus,
    SyncStatusBody, SyncedMessageBody, Timestamp,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How concurrent extensions of the same parent are resolved.
///
/// Only manual resolution is implemented; the enum is the swap point should
/// a last-write-wins or merge policy ever be wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep both versions as siblings and hand the decision to the caller
    #[default]
    Manual,
}

impl ConflictPolicy {
    /// Wire label reported in conflict details
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
        }
    }
}

/// Server-side reconciliation of client offline queues
pub struct SyncService {
    storage: Arc<dyn Storage>,
    hub: Arc<ConnectionHub>,
    policy: ConflictPolicy,
    lock_timeout: Duration,
    max_batch_size: usize,
    /// One async mutex per conversation serializes reconciliation so
    /// conflict detection stays deterministic
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SyncService {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        hub: Arc<ConnectionHub>,
        lock_timeout: Duration,
        max_batch_size: usize,
    ) -> Self {
        Self {
            storage,
            hub,
            policy: ConflictPolicy::default(),
            lock_timeout,
            max_batch_size,
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply an ordered batch of client-authored items.
    ///
    /// Per item, in batch order: an already-committed `local_id` returns its
    /// existing mapping unchanged; a parent already extended by another
    /// client without an explicit branch declaration yields a `conflict`
    /// result with both versions retained as siblings; otherwise the item is
    /// appended, assigned a server id and the next sequence number, and
    /// fanned out after commit. A storage failure for one item yields an
    /// `error` result without aborting the rest of the batch.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for an unknown or inaccessible conversation,
    /// `InvalidInput` for an oversized batch, and `Timeout` (retryable) when
    /// the conversation's reconciliation lock cannot be acquired in time.
    pub async fn sync_batch(
        &self,
        user_id: &str,
        conversation_id: &str,
        request: SyncRequestBody,
    ) -> AppResult<SyncResponseBody> {
        let conversation = self.storage.get_conversation(conversation_id).await?;
        if conversation.user_id != user_id {
            return Err(
                AppError::not_found(format!("conversation not found: {conversation_id}"))
                    .with_user_id(user_id),
            );
        }
        if request.messages.len() > self.max_batch_size {
            return Err(AppError::validation(format!(
                "sync batch exceeds maximum size of {}",
                self.max_batch_size
            )));
        }

        let lock = self
            .locks
            .entry(conversation_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // A hung downstream call must not hold the conversation hostage
        let _guard = tokio::time::timeout(self.lock_timeout, lock.lock())
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "reconciliation lock for {conversation_id} not acquired within {:?}",
                    self.lock_timeout
                ))
            })?;

        let mut results = Vec::with_capacity(request.messages.len());
        // local ids resolved to server ids within this batch, so later items
        // can claim earlier ones as parents
        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut committed: Vec<Message> = Vec::new();
        let mut tip = conversation.tip_message_id.clone();

        for item in request.messages {
            let result = self
                .process_item(conversation_id, &item, &mut resolved, &mut tip, &mut committed)
                .await;
            results.push(result);
        }

        // Move the tip only if reconciliation extended the active chain
        if tip != conversation.tip_message_id {
            let mut updated = conversation;
            if let Some(tip_id) = tip.clone() {
                updated.set_tip(tip_id);
            }
            if let Err(e) = self.storage.update_conversation(updated).await {
                warn!(conversation_id = %conversation_id, error = %e, "failed to advance tip after sync");
            }
        }

        // Fan out in commit order while still holding the conversation lock,
        // so broadcast order equals commit order
        for message in &committed {
            self.hub.broadcast_committed(message).await;
        }

        info!(
            conversation_id = %conversation_id,
            items = results.len(),
            synced = results.iter().filter(|r| r.status == SyncResultStatus::Synced).count(),
            conflicts = results.iter().filter(|r| r.status == SyncResultStatus::Conflict).count(),
            "sync batch reconciled"
        );

        Ok(SyncResponseBody {
            synced_messages: results,
            synced_at: Timestamp::now(),
        })
    }

    async fn process_item(
        &self,
        conversation_id: &str,
        item: &SyncItemBody,
        resolved: &mut HashMap<String, String>,
        tip: &mut Option<String>,
        committed: &mut Vec<Message>,
    ) -> SyncedMessageBody {
        if item.local_id.is_empty() {
            return conflict_result(String::new(), "local id is required", None, self.policy);
        }
        let Some(role) = MessageRole::parse(&item.role) else {
            return conflict_result(
                item.local_id.clone(),
                &format!("unknown message role: {}", item.role),
                None,
                self.policy,
            );
        };

        // Step 1: idempotent replay - an already-committed local id returns
        // its existing mapping unchanged
        match self
            .storage
            .find_by_local_id(conversation_id, &item.local_id)
            .await
        {
            Ok(Some(existing)) => {
                resolved.insert(item.local_id.clone(), existing.id.clone());
                if existing.content != item.contents {
                    // The client edited a message it already synced
                    let mut conflicted = existing.clone();
                    conflicted.mark_conflict();
                    if let Err(e) = self.storage.update_message(conflicted.clone()).await {
                        return error_result(item.local_id.clone(), &e);
                    }
                    return SyncedMessageBody {
                        local_id: item.local_id.clone(),
                        server_id: Some(existing.id.clone()),
                        status: SyncResultStatus::Conflict,
                        message: Some(conflicted.clone()),
                        conflict: Some(ConflictDetailBody {
                            reason: "contents differ from the already-synced version".into(),
                            server_message: Some(conflicted),
                            resolution: self.policy.as_str().into(),
                        }),
                    };
                }
                return SyncedMessageBody {
                    local_id: item.local_id.clone(),
                    server_id: Some(existing.id.clone()),
                    status: SyncResultStatus::Synced,
                    message: Some(existing),
                    conflict: None,
                };
            }
            Ok(None) => {}
            Err(e) => return error_result(item.local_id.clone(), &e),
        }

        // Resolve the claimed parent: a server id, a local id synced in an
        // earlier batch, or a local id earlier in this batch
        let previous_id = match &item.previous_id {
            None => None,
            Some(claimed) => match self
                .resolve_parent(conversation_id, claimed, resolved)
                .await
            {
                Ok(Some(id)) => Some(id),
                Ok(None) => {
                    return conflict_result(
                        item.local_id.clone(),
                        &format!("previous message not found: {claimed}"),
                        None,
                        self.policy,
                    );
                }
                Err(e) => return error_result(item.local_id.clone(), &e),
            },
        };

        // Step 3: concurrent-extension detection. A committed child from a
        // different origin under the same parent, without an explicit branch
        // declaration, is a conflict - but both versions are kept as
        // siblings rather than either being overwritten.
        let mut conflict_with: Option<Message> = None;
        if !item.branch {
            match self
                .storage
                .children_of(conversation_id, previous_id.as_deref())
                .await
            {
                Ok(children) => {
                    conflict_with = children
                        .into_iter()
                        .find(|c| c.local_id.as_deref() != Some(item.local_id.as_str()));
                }
                Err(e) => return error_result(item.local_id.clone(), &e),
            }
        }

        let created_at = item.created_at.as_datetime();
        let updated_at = item.updated_at.map_or(created_at, Timestamp::as_datetime);
        let now = Utc::now();
        let sync_state = if conflict_with.is_some() {
            SyncState::Conflict
        } else {
            SyncState::Synced
        };

        let inserted = self
            .storage
            .insert_message(NewMessage {
                id: ids::message_id(),
                local_id: Some(item.local_id.clone()),
                conversation_id: conversation_id.to_owned(),
                previous_id: previous_id.clone(),
                role,
                content: item.contents.clone(),
                status: MessageStatus::Completed,
                sync_state,
                created_at,
                updated_at,
                synced_at: Some(now),
            })
            .await;

        let message = match inserted {
            Ok(message) => message,
            Err(e) => return error_result(item.local_id.clone(), &e),
        };

        resolved.insert(item.local_id.clone(), message.id.clone());
        committed.push(message.clone());

        match conflict_with {
            Some(competing) => SyncedMessageBody {
                local_id: item.local_id.clone(),
                server_id: Some(message.id.clone()),
                status: SyncResultStatus::Conflict,
                message: Some(message),
                conflict: Some(ConflictDetailBody {
                    reason: "parent already extended by another client".into(),
                    server_message: Some(competing),
                    resolution: self.policy.as_str().into(),
                }),
            },
            None => {
                // Extend the active chain when the item grows it
                if previous_id == *tip || tip.is_none() {
                    *tip = Some(message.id.clone());
                }
                SyncedMessageBody {
                    local_id: item.local_id.clone(),
                    server_id: Some(message.id.clone()),
                    status: SyncResultStatus::Synced,
                    message: Some(message),
                    conflict: None,
                }
            }
        }
    }

    async fn resolve_parent(
        &self,
        conversation_id: &str,
        claimed: &str,
        resolved: &HashMap<String, String>,
    ) -> AppResult<Option<String>> {
        if let Some(server_id) = resolved.get(claimed) {
            return Ok(Some(server_id.clone()));
        }
        match self.storage.get_message(claimed).await {
            Ok(message) if message.conversation_id == conversation_id => {
                return Ok(Some(message.id));
            }
            Ok(_) => return Ok(None),
            Err(e) if e.code == ErrorCode::ResourceNotFound => {}
            Err(e) => return Err(e),
        }
        Ok(self
            .storage
            .find_by_local_id(conversation_id, claimed)
            .await?
            .map(|m| m.id))
    }

    /// Sync bookkeeping counts for a conversation
    pub async fn sync_status(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<SyncStatusBody> {
        let conversation = self.storage.get_conversation(conversation_id).await?;
        if conversation.user_id != user_id {
            return Err(
                AppError::not_found(format!("conversation not found: {conversation_id}"))
                    .with_user_id(user_id),
            );
        }

        let messages = self.storage.list_messages(conversation_id).await?;
        let mut pending = 0u64;
        let mut synced = 0u64;
        let mut conflicts = 0u64;
        let mut last_synced_at = None;
        for message in &messages {
            match message.sync_state {
                SyncState::Pending => pending += 1,
                SyncState::Synced => synced += 1,
                SyncState::Conflict => conflicts += 1,
            }
            if let Some(at) = message.synced_at {
                if last_synced_at.is_none_or(|prev| at > prev) {
                    last_synced_at = Some(at);
                }
            }
        }

        Ok(SyncStatusBody {
            conversation_id: conversation_id.to_owned(),
            pending_count: pending,
            synced_count: synced,
            conflict_count: conflicts,
            last_synced_at: last_synced_at.map(Into::into),
        })
    }
}

fn conflict_result(
    local_id: String,
    reason: &str,
    server_message: Option<Message>,
    policy: ConflictPolicy,
) -> SyncedMessageBody {
    SyncedMessageBody {
        local_id,
        server_id: None,
        status: SyncResultStatus::Conflict,
        message: None,
        conflict: Some(ConflictDetailBody {
            reason: reason.to_owned(),
            server_message,
            resolution: policy.as_str().into(),
        }),
    }
}

fn error_result(local_id: String, error: &AppError) -> SyncedMessageBody {
    warn!(local_id = %local_id, error = %error, "sync item failed; left queued client-side");
    SyncedMessageBody {
        local_id,
        server_id: None,
        status: SyncResultStatus::Error,
        message: None,
        conflict: None,
    }
}
