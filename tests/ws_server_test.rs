// ABOUTME: End-to-end WebSocket tests against a live server instance
// ABOUTME: Offline sync over the socket, ordered fan-out to subscribers, and cursor resubscribe
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy
#![allow(missing_docs)]

use colloquy_server::config::environment::{
    Environment, HttpConfig, ServerConfig, SyncConfig, WsConfig,
};
use colloquy_server::protocol::{
    AssistantMessageBody, Envelope, EventBody, SubscribeBody, SyncItemBody, SyncRequestBody,
    Timestamp, UnsubscribeBody, UserMessageBody, VoiceJoinBody, WireFormat,
};
use colloquy_server::resources::ServerResources;
use colloquy_server::routes;
use colloquy_server::storage::MemoryStorage;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const USER: &str = "user_a";

fn test_config() -> ServerConfig {
    ServerConfig {
        environment: Environment::Testing,
        http: HttpConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["*".into()],
        },
        ws: WsConfig {
            outbound_queue_capacity: 64,
            ping_interval: Duration::from_secs(30),
        },
        sync: SyncConfig {
            lock_timeout: Duration::from_secs(5),
            max_batch_size: 100,
        },
    }
}

async fn start_server() -> (SocketAddr, Arc<ServerResources>) {
    let resources = ServerResources::new(test_config(), Arc::new(MemoryStorage::new()));
    let router = routes::router(resources.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, resources)
}

async fn connect(addr: SocketAddr, user_id: &str) -> Socket {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-user-id", user_id.parse().unwrap());
    let (socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, envelope: &Envelope) {
    let frame = envelope.encode(WireFormat::MsgPack).unwrap();
    socket.send(Message::Binary(frame)).await.unwrap();
}

/// Next data frame decoded as an envelope; control frames are skipped
async fn recv(socket: &mut Socket) -> Envelope {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        match message {
            Message::Binary(data) => return Envelope::decode(WireFormat::MsgPack, &data).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn subscribe_envelope(conversation_id: &str, from_sequence: Option<u64>) -> Envelope {
    Envelope::new(
        conversation_id,
        EventBody::Subscribe(SubscribeBody {
            conversation_id: Some(conversation_id.to_owned()),
            from_sequence,
            agent_mode: false,
        }),
    )
}

fn sync_item(local_id: &str, previous_id: Option<&str>, contents: &str) -> SyncItemBody {
    SyncItemBody {
        local_id: local_id.into(),
        sequence_number: 0,
        previous_id: previous_id.map(Into::into),
        role: "user".into(),
        contents: contents.into(),
        branch: false,
        created_at: Timestamp::from_unix_millis(1_714_521_600_000).unwrap(),
        updated_at: None,
    }
}

#[tokio::test]
async fn offline_batch_syncs_and_fans_out_in_commit_order() {
    let (addr, resources) = start_server().await;
    let conversation = resources.conversations.create(USER, "offline test").await.unwrap();

    // A second device of the same user is already live and subscribed
    let mut watcher = connect(addr, USER).await;
    send(&mut watcher, &subscribe_envelope(&conversation.id, None)).await;
    let ack = recv(&mut watcher).await;
    match ack.body {
        EventBody::SubscribeAck(body) => assert!(body.success),
        other => panic!("expected subscribe ack, got {other:?}"),
    }

    // The offline device reconnects and pushes its queued chain
    let mut author = connect(addr, USER).await;
    let request = Envelope::new(
        conversation.id.clone(),
        EventBody::SyncRequest(SyncRequestBody {
            messages: vec![
                sync_item("L1", None, "written offline 1"),
                sync_item("L2", Some("L1"), "written offline 2"),
            ],
        }),
    );
    send(&mut author, &request).await;

    let response = recv(&mut author).await;
    let (s1, s2) = match response.body {
        EventBody::SyncResponse(body) => {
            assert_eq!(body.synced_messages.len(), 2);
            let m1 = body.synced_messages[0].message.clone().unwrap();
            let m2 = body.synced_messages[1].message.clone().unwrap();
            assert_eq!(m1.sequence_number, 1);
            assert_eq!(m2.sequence_number, 2);
            (m1, m2)
        }
        other => panic!("expected sync response, got {other:?}"),
    };

    // The live subscriber receives s1 then s2, in that order
    let first = recv(&mut watcher).await;
    let second = recv(&mut watcher).await;
    match (first.body, second.body) {
        (EventBody::UserMessage(a), EventBody::UserMessage(b)) => {
            assert_eq!(a.id, s1.id);
            assert_eq!(b.id, s2.id);
            assert_eq!(b.previous_id.as_deref(), Some(s1.id.as_str()));
        }
        other => panic!("expected two user messages, got {other:?}"),
    }
}

#[tokio::test]
async fn resubscribe_with_cursor_replays_missed_history() {
    let (addr, resources) = start_server().await;
    let conversation = resources.conversations.create(USER, "replay").await.unwrap();

    // Commit three messages before the client connects
    let mut author = connect(addr, USER).await;
    let request = Envelope::new(
        conversation.id.clone(),
        EventBody::SyncRequest(SyncRequestBody {
            messages: vec![
                sync_item("L1", None, "one"),
                sync_item("L2", Some("L1"), "two"),
                sync_item("L3", Some("L2"), "three"),
            ],
        }),
    );
    send(&mut author, &request).await;
    recv(&mut author).await;

    // The returning client saw sequence 1 before it lost the connection
    let mut returning = connect(addr, USER).await;
    send(&mut returning, &subscribe_envelope(&conversation.id, Some(1))).await;

    let mut got_ack = false;
    let mut replayed = Vec::new();
    for _ in 0..3 {
        let envelope = recv(&mut returning).await;
        match envelope.body {
            EventBody::SubscribeAck(body) => {
                assert!(body.success);
                assert_eq!(body.missed_messages, Some(2));
                got_ack = true;
            }
            EventBody::UserMessage(body) => replayed.push(body.content),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
    assert!(got_ack);
    assert_eq!(replayed, vec!["two", "three"]);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (addr, resources) = start_server().await;
    let conversation = resources.conversations.create(USER, "quiet").await.unwrap();

    let mut watcher = connect(addr, USER).await;
    send(&mut watcher, &subscribe_envelope(&conversation.id, None)).await;
    recv(&mut watcher).await; // ack

    send(
        &mut watcher,
        &Envelope::new(
            conversation.id.clone(),
            EventBody::Unsubscribe(UnsubscribeBody {
                conversation_id: conversation.id.clone(),
            }),
        ),
    )
    .await;
    let ack = recv(&mut watcher).await;
    match ack.body {
        EventBody::UnsubscribeAck(body) => assert!(body.success),
        other => panic!("expected unsubscribe ack, got {other:?}"),
    }

    // A commit after unsubscribing must not be delivered
    resources
        .conversations
        .handle_user_message(USER, &conversation.id, "nobody hears this".into(), Default::default())
        .await
        .unwrap();

    let silence =
        tokio::time::timeout(Duration::from_millis(200), recv(&mut watcher)).await;
    assert!(silence.is_err(), "received a frame after unsubscribing");
}

#[tokio::test]
async fn voice_join_and_leave_are_acknowledged() {
    let (addr, resources) = start_server().await;
    let conversation = resources.conversations.create(USER, "voice").await.unwrap();

    let mut participant = connect(addr, USER).await;
    send(
        &mut participant,
        &Envelope::new(
            conversation.id.clone(),
            EventBody::VoiceJoin(VoiceJoinBody {
                conversation_id: conversation.id.clone(),
                user_id: USER.into(),
            }),
        ),
    )
    .await;
    let ack = recv(&mut participant).await;
    match ack.body {
        EventBody::VoiceJoinAck(body) => {
            assert!(body.success);
            assert_eq!(body.conversation_id, conversation.id);
        }
        other => panic!("expected voice join ack, got {other:?}"),
    }

    // Joining a foreign conversation is refused in the same ack shape
    let mut intruder = connect(addr, "someone_else").await;
    send(
        &mut intruder,
        &Envelope::new(
            conversation.id.clone(),
            EventBody::VoiceJoin(VoiceJoinBody {
                conversation_id: conversation.id.clone(),
                user_id: "someone_else".into(),
            }),
        ),
    )
    .await;
    let refusal = recv(&mut intruder).await;
    match refusal.body {
        EventBody::VoiceJoinAck(body) => {
            assert!(!body.success);
            assert!(body.error.is_some());
        }
        other => panic!("expected refused voice join ack, got {other:?}"),
    }
}

#[tokio::test]
async fn user_message_routes_a_generation_request_to_the_agent() {
    let (addr, resources) = start_server().await;
    let conversation = resources.conversations.create(USER, "generation").await.unwrap();

    // The generation agent registers itself
    let mut agent = connect(addr, "agent_service").await;
    send(
        &mut agent,
        &Envelope::new(
            "",
            EventBody::Subscribe(SubscribeBody {
                conversation_id: None,
                from_sequence: None,
                agent_mode: true,
            }),
        ),
    )
    .await;
    let ack = recv(&mut agent).await;
    match ack.body {
        EventBody::SubscribeAck(body) => {
            assert!(body.success);
            assert!(body.agent_mode);
        }
        other => panic!("expected agent subscribe ack, got {other:?}"),
    }

    // Another device of the user watches the conversation
    let mut watcher = connect(addr, USER).await;
    send(&mut watcher, &subscribe_envelope(&conversation.id, None)).await;
    recv(&mut watcher).await; // ack

    // The user speaks
    let mut speaker = connect(addr, USER).await;
    send(
        &mut speaker,
        &Envelope::new(
            conversation.id.clone(),
            EventBody::UserMessage(UserMessageBody {
                id: String::new(),
                conversation_id: conversation.id.clone(),
                content: "what is the weather".into(),
                previous_id: None,
            }),
        ),
    )
    .await;

    // The watcher sees the committed user message
    let committed = recv(&mut watcher).await;
    let user_message_id = match committed.body {
        EventBody::UserMessage(body) => {
            assert_eq!(body.content, "what is the weather");
            body.id
        }
        other => panic!("expected user message, got {other:?}"),
    };

    // The agent receives the generation request for it
    let request = recv(&mut agent).await;
    match request.body {
        EventBody::GenerationRequest(body) => {
            assert_eq!(body.conversation_id, conversation.id);
            assert_eq!(body.message_id, user_message_id);
            assert_eq!(body.request_type, "send");
        }
        other => panic!("expected generation request, got {other:?}"),
    }

    // The agent answers; the answer is persisted, moves the tip, and fans out
    send(
        &mut agent,
        &Envelope::new(
            conversation.id.clone(),
            EventBody::AssistantMessage(AssistantMessageBody {
                id: "msg_answer".into(),
                conversation_id: conversation.id.clone(),
                content: "sunny".into(),
                previous_id: Some(user_message_id.clone()),
                reasoning: None,
                timestamp: None,
            }),
        ),
    )
    .await;

    let answer = recv(&mut watcher).await;
    match answer.body {
        EventBody::AssistantMessage(body) => {
            assert_eq!(body.content, "sunny");
            assert_eq!(body.previous_id.as_deref(), Some(user_message_id.as_str()));
        }
        other => panic!("expected assistant message, got {other:?}"),
    }

    let refreshed = resources.conversations.get(USER, &conversation.id).await.unwrap();
    assert_eq!(refreshed.tip_message_id.as_deref(), Some("msg_answer"));
}
