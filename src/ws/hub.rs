// ABOUTME: Connection hub - per-conversation fan-out with bounded queues and replay
// ABOUTME: Single-writer table discipline; overflowing subscribers are disconnected, not waited on
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use crate::storage::Storage;
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::models::{Message, MessageRole};
use colloquy_core::protocol::{
    AssistantMessageBody, Envelope, EventBody, UserMessageBody, WireFormat,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of one client connection
pub type ConnectionId = Uuid;

/// Frame queued for delivery on a connection (already encoded)
pub type OutboundFrame = Vec<u8>;

struct ConnectionEntry {
    user_id: String,
    sender: mpsc::Sender<OutboundFrame>,
}

/// Per-(connection, conversation) registration
struct Subscription {
    /// Highest sequence number delivered on this subscription. Replay sets
    /// it; live events at or below it are duplicates of replayed history and
    /// are dropped at the cutover boundary.
    last_delivered_sequence: u64,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    subscriptions: HashMap<String, HashMap<ConnectionId, Subscription>>,
    agent: Option<ConnectionId>,
    voice_participants: HashMap<String, HashSet<ConnectionId>>,
}

/// Registry of live connections and their conversation subscriptions.
///
/// Owned by one server instance and shut down with it, never global state.
/// The fan-out table is guarded by a single lock; subscribes, unsubscribes,
/// and broadcasts all mutate under the write half, which is what makes
/// replay-then-live cutover race-free.
pub struct ConnectionHub {
    state: RwLock<HubState>,
    /// Bound of each connection's outbound queue
    outbound_capacity: usize,
}

impl ConnectionHub {
    #[must_use]
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            outbound_capacity,
        }
    }

    /// Register a connection and hand back its outbound frame queue.
    ///
    /// The caller owns the receiving half: exactly one writer task per
    /// connection drains it, which serializes all writes to that socket.
    pub async fn register_connection(
        &self,
        user_id: impl Into<String>,
    ) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let mut state = self.state.write().await;
        state.connections.insert(
            id,
            ConnectionEntry {
                user_id: user_id.into(),
                sender: tx,
            },
        );
        debug!(connection_id = %id, total = state.connections.len(), "connection registered");
        (id, rx)
    }

    /// Remove a connection and every registration it held
    pub async fn remove_connection(&self, id: ConnectionId) {
        let mut state = self.state.write().await;
        remove_connection_locked(&mut state, id);
        info!(connection_id = %id, "connection removed");
    }

    /// Subscribe a connection to a conversation, optionally replaying
    /// committed messages with `sequence_number > from_sequence` before the
    /// subscription goes live.
    ///
    /// Replay and registration happen under the hub write lock, so no live
    /// broadcast can interleave; the subscription's delivery cursor then
    /// suppresses any duplicate at the cutover boundary. Returns the number
    /// of replayed messages.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` when the conversation is unknown or not owned by
    /// the connection's caller identity; `CapacityExceeded` when replay
    /// overflows the connection's outbound queue.
    pub async fn subscribe(
        &self,
        storage: &dyn Storage,
        connection_id: ConnectionId,
        conversation_id: &str,
        from_sequence: Option<u64>,
    ) -> AppResult<u64> {
        let mut state = self.state.write().await;

        let user_id = state
            .connections
            .get(&connection_id)
            .map(|entry| entry.user_id.clone())
            .ok_or_else(|| AppError::internal("subscribe from unregistered connection"))?;

        let conversation = storage.get_conversation(conversation_id).await?;
        if conversation.user_id != user_id {
            return Err(AppError::not_found(format!(
                "conversation not found: {conversation_id}"
            ))
            .with_user_id(user_id));
        }

        let mut missed = 0u64;
        let mut cursor = from_sequence.unwrap_or(0);

        if let Some(from) = from_sequence {
            let replay = storage.messages_after(conversation_id, from).await?;
            let sender = state
                .connections
                .get(&connection_id)
                .map(|entry| entry.sender.clone())
                .ok_or_else(|| AppError::internal("connection vanished during subscribe"))?;

            for message in &replay {
                let frame = encode_committed(message)?;
                if sender.try_send(frame).is_err() {
                    remove_connection_locked(&mut state, connection_id);
                    return Err(AppError::capacity(
                        "outbound queue overflowed during replay",
                    ));
                }
                cursor = cursor.max(message.sequence_number);
                missed += 1;
            }
        }

        state
            .subscriptions
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(
                connection_id,
                Subscription {
                    last_delivered_sequence: cursor,
                },
            );

        info!(
            connection_id = %connection_id,
            conversation_id = %conversation_id,
            missed,
            "subscribed"
        );
        Ok(missed)
    }

    /// Remove one conversation registration from a connection
    pub async fn unsubscribe(&self, connection_id: ConnectionId, conversation_id: &str) {
        let mut state = self.state.write().await;
        if let Some(subs) = state.subscriptions.get_mut(conversation_id) {
            subs.remove(&connection_id);
            if subs.is_empty() {
                state.subscriptions.remove(conversation_id);
            }
        }
        if let Some(participants) = state.voice_participants.get_mut(conversation_id) {
            participants.remove(&connection_id);
            if participants.is_empty() {
                state.voice_participants.remove(conversation_id);
            }
        }
        info!(connection_id = %connection_id, conversation_id = %conversation_id, "unsubscribed");
    }

    /// Deliver an event to every subscriber of its conversation, in commit
    /// order.
    ///
    /// `sequence` carries the committed sequence number for message events;
    /// sequenced events already delivered to a subscription (replay overlap)
    /// are skipped. A subscriber whose bounded queue would overflow is
    /// forcibly disconnected rather than allowed to stall the others.
    pub async fn broadcast(
        &self,
        conversation_id: &str,
        envelope: &Envelope,
        sequence: Option<u64>,
    ) {
        let frame = match envelope.encode(WireFormat::MsgPack) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "failed to encode broadcast");
                return;
            }
        };

        let mut state = self.state.write().await;
        let Some(subs) = state.subscriptions.get_mut(conversation_id) else {
            return;
        };

        let mut dropped: Vec<ConnectionId> = Vec::new();
        let mut targets: Vec<ConnectionId> = Vec::new();

        for (connection_id, subscription) in subs.iter_mut() {
            if let Some(seq) = sequence {
                if seq <= subscription.last_delivered_sequence {
                    continue;
                }
                subscription.last_delivered_sequence = seq;
            }
            targets.push(*connection_id);
        }

        for connection_id in targets {
            let Some(entry) = state.connections.get(&connection_id) else {
                dropped.push(connection_id);
                continue;
            };
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        conversation_id = %conversation_id,
                        capacity = self.outbound_capacity,
                        "outbound queue overflow; disconnecting slow subscriber"
                    );
                    dropped.push(connection_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(connection_id);
                }
            }
        }

        for connection_id in dropped {
            remove_connection_locked(&mut state, connection_id);
        }
    }

    /// Broadcast a committed message as its role-appropriate event kind,
    /// carrying its sequence number for ordered, deduplicated delivery
    pub async fn broadcast_committed(&self, message: &Message) {
        let envelope = committed_envelope(message);
        self.broadcast(&message.conversation_id, &envelope, Some(message.sequence_number))
            .await;
    }

    /// Send one envelope to a single connection, bypassing subscriptions
    /// (acks and direct replies)
    pub async fn send_to_connection(&self, connection_id: ConnectionId, envelope: &Envelope) {
        let frame = match envelope.encode(WireFormat::MsgPack) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "failed to encode direct frame");
                return;
            }
        };
        let mut state = self.state.write().await;
        let overflowed = match state.connections.get(&connection_id) {
            Some(entry) => match entry.sender.try_send(frame) {
                Ok(()) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = %connection_id, "outbound queue overflow on direct send; disconnecting");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => true,
            },
            None => {
                warn!(connection_id = %connection_id, "direct send to unknown connection");
                false
            }
        };
        if overflowed {
            remove_connection_locked(&mut state, connection_id);
        }
    }

    /// Register the generation agent's connection
    pub async fn register_agent(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        state.agent = Some(connection_id);
        info!(connection_id = %connection_id, "agent connected");
    }

    /// Whether this connection is the registered agent
    pub async fn is_agent(&self, connection_id: ConnectionId) -> bool {
        self.state.read().await.agent == Some(connection_id)
    }

    /// Route an envelope to the generation agent, if one is connected.
    /// Returns false (and logs) when no agent is available.
    pub async fn send_to_agent(&self, envelope: &Envelope) -> bool {
        let agent = self.state.read().await.agent;
        match agent {
            Some(connection_id) => {
                self.send_to_connection(connection_id, envelope).await;
                true
            }
            None => {
                warn!("no agent connected; dropping generation request");
                false
            }
        }
    }

    /// Add a connection to a conversation's voice participant set
    pub async fn voice_join(&self, connection_id: ConnectionId, conversation_id: &str) {
        let mut state = self.state.write().await;
        state
            .voice_participants
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(connection_id);
        info!(connection_id = %connection_id, conversation_id = %conversation_id, "voice joined");
    }

    /// Remove a connection from a conversation's voice participant set
    pub async fn voice_leave(&self, connection_id: ConnectionId, conversation_id: &str) {
        let mut state = self.state.write().await;
        if let Some(participants) = state.voice_participants.get_mut(conversation_id) {
            participants.remove(&connection_id);
            if participants.is_empty() {
                state.voice_participants.remove(conversation_id);
            }
        }
        info!(connection_id = %connection_id, conversation_id = %conversation_id, "voice left");
    }

    /// Whether the connection currently participates in the conversation's
    /// voice session
    pub async fn is_voice_participant(
        &self,
        connection_id: ConnectionId,
        conversation_id: &str,
    ) -> bool {
        self.state
            .read()
            .await
            .voice_participants
            .get(conversation_id)
            .is_some_and(|p| p.contains(&connection_id))
    }

    /// Number of live subscribers for a conversation
    pub async fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.state
            .read()
            .await
            .subscriptions
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }

    /// Number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

fn remove_connection_locked(state: &mut HubState, id: ConnectionId) {
    state.connections.remove(&id);
    state.subscriptions.retain(|_, subs| {
        subs.remove(&id);
        !subs.is_empty()
    });
    state.voice_participants.retain(|_, participants| {
        participants.remove(&id);
        !participants.is_empty()
    });
    if state.agent == Some(id) {
        state.agent = None;
        info!(connection_id = %id, "agent disconnected");
    }
}

/// Envelope for a committed message, shaped by its author role
#[must_use]
pub fn committed_envelope(message: &Message) -> Envelope {
    let body = match message.role {
        MessageRole::Assistant => EventBody::AssistantMessage(AssistantMessageBody {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            content: message.content.clone(),
            previous_id: message.previous_id.clone(),
            reasoning: None,
            timestamp: Some(message.created_at.timestamp_millis()),
        }),
        MessageRole::User | MessageRole::System => EventBody::UserMessage(UserMessageBody {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            content: message.content.clone(),
            previous_id: message.previous_id.clone(),
        }),
    };
    Envelope::new(message.conversation_id.clone(), body)
}

fn encode_committed(message: &Message) -> AppResult<OutboundFrame> {
    committed_envelope(message).encode(WireFormat::MsgPack)
}
