// ABOUTME: Tests for the connection hub - ordering, backpressure, and replay cutover
// ABOUTME: A frozen subscriber is disconnected; active subscribers see commit order exactly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy
#![allow(missing_docs)]

use colloquy_server::errors::ErrorCode;
use colloquy_server::models::{Conversation, MessageRole};
use colloquy_server::protocol::{Envelope, EventBody, WireFormat};
use colloquy_server::storage::{MemoryStorage, NewMessage, Storage};
use colloquy_server::ws::ConnectionHub;
use std::sync::Arc;
use tokio::sync::mpsc;

const USER: &str = "user_1";
const CONV: &str = "conv_1";

async fn storage_with_conversation() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .create_conversation(Conversation::new(CONV.into(), USER.into(), "t".into()))
        .await
        .unwrap();
    storage
}

/// Insert `count` chained user messages and return them in commit order
async fn seed_messages(storage: &MemoryStorage, count: usize) -> Vec<colloquy_server::models::Message> {
    let mut previous: Option<String> = None;
    let mut all = Vec::new();
    for i in 0..count {
        let message = storage
            .insert_message(NewMessage::committed(
                format!("msg_{i}"),
                CONV.into(),
                previous.clone(),
                MessageRole::User,
                format!("message {i}"),
            ))
            .await
            .unwrap();
        previous = Some(message.id.clone());
        all.push(message);
    }
    all
}

fn decode_frame(frame: &[u8]) -> Envelope {
    Envelope::decode(WireFormat::MsgPack, frame).unwrap()
}

fn message_content(envelope: &Envelope) -> String {
    match &envelope.body {
        EventBody::UserMessage(b) => b.content.clone(),
        EventBody::AssistantMessage(b) => b.content.clone(),
        other => panic!("unexpected event body: {other:?}"),
    }
}

async fn drain_ready(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Envelope> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(decode_frame(&frame));
    }
    frames
}

#[tokio::test]
async fn delivery_order_matches_commit_order() {
    let storage = storage_with_conversation().await;
    let hub = ConnectionHub::new(64);
    let (id, mut rx) = hub.register_connection(USER).await;
    hub.subscribe(storage.as_ref(), id, CONV, None).await.unwrap();

    let messages = seed_messages(&storage, 5).await;
    for message in &messages {
        hub.broadcast_committed(message).await;
    }

    let received = drain_ready(&mut rx).await;
    let contents: Vec<String> = received.iter().map(message_content).collect();
    let expected: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn frozen_subscriber_is_disconnected_while_active_one_receives_everything() {
    let storage = storage_with_conversation().await;
    // Outbound queue bound of 8
    let hub = ConnectionHub::new(8);

    let (active_id, mut active_rx) = hub.register_connection(USER).await;
    // The frozen subscriber's receiver stays alive but is never drained
    let (frozen_id, frozen_rx) = hub.register_connection(USER).await;
    hub.subscribe(storage.as_ref(), active_id, CONV, None).await.unwrap();
    hub.subscribe(storage.as_ref(), frozen_id, CONV, None).await.unwrap();
    assert_eq!(hub.subscriber_count(CONV).await, 2);

    let messages = seed_messages(&storage, 9).await;

    // Drain the active side as we go so its queue never fills
    let mut received = Vec::new();
    for message in &messages {
        hub.broadcast_committed(message).await;
        while let Ok(frame) = active_rx.try_recv() {
            received.push(decode_frame(&frame));
        }
    }
    assert_eq!(received.len(), 9);
    let contents: Vec<String> = received.iter().map(message_content).collect();
    let expected: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents, expected);

    // After 9 broadcasts the frozen subscriber (bound 8) has been dropped
    assert_eq!(hub.subscriber_count(CONV).await, 1);
    assert_eq!(hub.connection_count().await, 1);
    drop(frozen_rx);
}

#[tokio::test]
async fn subscribe_with_cursor_replays_missed_messages_before_live() {
    let storage = storage_with_conversation().await;
    let hub = ConnectionHub::new(64);
    let messages = seed_messages(&storage, 5).await;

    let (id, mut rx) = hub.register_connection(USER).await;
    // The client saw sequence 2 before disconnecting
    let missed = hub
        .subscribe(storage.as_ref(), id, CONV, Some(2))
        .await
        .unwrap();
    assert_eq!(missed, 3);

    let replayed = drain_ready(&mut rx).await;
    let contents: Vec<String> = replayed.iter().map(message_content).collect();
    assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);

    // A duplicate of already-replayed history is suppressed at the cutover
    hub.broadcast_committed(&messages[4]).await;
    assert!(drain_ready(&mut rx).await.is_empty());

    // Genuinely new events flow live
    let new_message = storage
        .insert_message(NewMessage::committed(
            "msg_live".into(),
            CONV.into(),
            Some(messages[4].id.clone()),
            MessageRole::Assistant,
            "fresh".into(),
        ))
        .await
        .unwrap();
    hub.broadcast_committed(&new_message).await;
    let live = drain_ready(&mut rx).await;
    assert_eq!(live.len(), 1);
    assert_eq!(message_content(&live[0]), "fresh");
}

#[tokio::test]
async fn subscribe_requires_conversation_access() {
    let storage = storage_with_conversation().await;
    let hub = ConnectionHub::new(64);
    let (id, _rx) = hub.register_connection("intruder").await;
    let err = hub
        .subscribe(storage.as_ref(), id, CONV, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert_eq!(hub.subscriber_count(CONV).await, 0);
}

#[tokio::test]
async fn unsubscribe_and_connection_close_remove_registrations() {
    let storage = storage_with_conversation().await;
    let hub = ConnectionHub::new(64);
    let (a, _rx_a) = hub.register_connection(USER).await;
    let (b, _rx_b) = hub.register_connection(USER).await;
    hub.subscribe(storage.as_ref(), a, CONV, None).await.unwrap();
    hub.subscribe(storage.as_ref(), b, CONV, None).await.unwrap();

    hub.unsubscribe(a, CONV).await;
    assert_eq!(hub.subscriber_count(CONV).await, 1);

    // Connection close implicitly unsubscribes from everything it held
    hub.remove_connection(b).await;
    assert_eq!(hub.subscriber_count(CONV).await, 0);
}

#[tokio::test]
async fn events_without_sequence_reach_all_subscribers() {
    let storage = storage_with_conversation().await;
    let hub = ConnectionHub::new(64);
    let (id, mut rx) = hub.register_connection(USER).await;
    hub.subscribe(storage.as_ref(), id, CONV, None).await.unwrap();

    let envelope = Envelope::new(
        CONV,
        EventBody::VoiceStatus(colloquy_server::protocol::VoiceStatusBody {
            conversation_id: CONV.into(),
            status: "speaking".into(),
            queue_length: 1,
            error: None,
        }),
    );
    hub.broadcast(CONV, &envelope, None).await;

    let frames = drain_ready(&mut rx).await;
    assert_eq!(frames.len(), 1);
    assert!(matches!(frames[0].body, EventBody::VoiceStatus(_)));
}
