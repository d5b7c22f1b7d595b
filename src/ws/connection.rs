// ABOUTME: Per-connection WebSocket handling - inbound dispatch and the serialized writer task
// ABOUTME: Inbound frames decode as envelopes; outbound frames drain one bounded queue per socket
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use crate::lifecycle::ShutdownSignal;
use crate::resources::ServerResources;
use crate::ws::hub::ConnectionId;
use axum::extract::ws::{Message, WebSocket};
use colloquy_core::errors::ErrorCode;
use colloquy_core::protocol::{
    Envelope, ErrorBody, EventBody, SubscribeAckBody, SubscribeBody, UnsubscribeAckBody,
    VoiceJoinAckBody, VoiceLeaveAckBody, WireFormat,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Drive one client connection until it closes.
///
/// Binary frames carry MessagePack envelopes, text frames JSON ones; the
/// server always responds in the compact binary form. The read path runs
/// here; all writes to the socket are serialized through one writer task
/// draining the connection's bounded queue.
pub async fn handle_socket(socket: WebSocket, user_id: String, resources: Arc<ServerResources>) {
    let (sink, stream) = socket.split();
    let (connection_id, outbound) = resources.hub.register_connection(&user_id).await;

    let writer = tokio::spawn(write_pump(
        sink,
        outbound,
        resources.config.ws.ping_interval,
        resources.lifecycle.signal(),
    ));

    read_pump(stream, connection_id, &user_id, &resources).await;

    resources.hub.remove_connection(connection_id).await;
    writer.abort();
}

/// Single writer per socket: outbound frames, keepalive pings, shutdown close
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    ping_interval: Duration,
    shutdown: ShutdownSignal,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            () = shutdown.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    connection_id: ConnectionId,
    user_id: &str,
    resources: &Arc<ServerResources>,
) {
    while let Some(message) = stream.next().await {
        let decoded = match message {
            Ok(Message::Binary(data)) => Envelope::decode(WireFormat::MsgPack, &data),
            Ok(Message::Text(text)) => Envelope::decode(WireFormat::Json, text.as_bytes()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match decoded {
            Ok(envelope) => dispatch(resources, connection_id, user_id, envelope).await,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "undecodable frame");
                send_error(resources, connection_id, "", "invalid_envelope", "failed to decode envelope").await;
            }
        }
    }
}

async fn dispatch(
    resources: &Arc<ServerResources>,
    connection_id: ConnectionId,
    user_id: &str,
    envelope: Envelope,
) {
    let conversation_id = envelope.conversation_id.clone();
    let trace = envelope.trace.clone();

    match envelope.body {
        EventBody::Subscribe(body) => {
            handle_subscribe(resources, connection_id, conversation_id, body).await;
        }

        EventBody::Unsubscribe(body) => {
            resources
                .hub
                .unsubscribe(connection_id, &body.conversation_id)
                .await;
            let ack = Envelope::new(
                body.conversation_id.clone(),
                EventBody::UnsubscribeAck(UnsubscribeAckBody {
                    conversation_id: body.conversation_id,
                    success: true,
                }),
            );
            resources.hub.send_to_connection(connection_id, &ack).await;
        }

        EventBody::SyncRequest(body) => {
            match resources
                .sync
                .sync_batch(user_id, &conversation_id, body)
                .await
            {
                Ok(response) => {
                    let reply = Envelope::new(
                        conversation_id,
                        EventBody::SyncResponse(response),
                    );
                    resources.hub.send_to_connection(connection_id, &reply).await;
                }
                Err(e) => {
                    let code = if e.code == ErrorCode::Timeout {
                        "sync_timeout"
                    } else {
                        "sync_failed"
                    };
                    send_error(resources, connection_id, &conversation_id, code, &e.to_string()).await;
                }
            }
        }

        EventBody::UserMessage(body) => {
            let conversation_id = if conversation_id.is_empty() {
                body.conversation_id.clone()
            } else {
                conversation_id
            };
            if let Err(e) = resources
                .conversations
                .handle_user_message(user_id, &conversation_id, body.content, trace)
                .await
            {
                warn!(conversation_id = %conversation_id, error = %e, "user message rejected");
                send_error(resources, connection_id, &conversation_id, "message_rejected", &e.to_string()).await;
            }
        }

        body @ EventBody::GenerationRequest(_) => {
            // Clients may request regeneration explicitly; route to the agent
            if !resources.hub.is_agent(connection_id).await && !conversation_id.is_empty() {
                let forwarded = Envelope {
                    conversation_id,
                    body,
                    trace,
                };
                resources.hub.send_to_agent(&forwarded).await;
            }
        }

        EventBody::VoiceJoin(body) => {
            let allowed = resources
                .conversations
                .get(user_id, &body.conversation_id)
                .await
                .is_ok();
            if allowed {
                resources
                    .hub
                    .voice_join(connection_id, &body.conversation_id)
                    .await;
            }
            let ack = Envelope::new(
                body.conversation_id.clone(),
                EventBody::VoiceJoinAck(VoiceJoinAckBody {
                    conversation_id: body.conversation_id,
                    success: allowed,
                    error: (!allowed).then(|| "conversation not found".to_owned()),
                    sample_rate: None,
                }),
            );
            resources.hub.send_to_connection(connection_id, &ack).await;
        }

        EventBody::VoiceLeave(body) => {
            resources
                .hub
                .voice_leave(connection_id, &body.conversation_id)
                .await;
            let ack = Envelope::new(
                body.conversation_id.clone(),
                EventBody::VoiceLeaveAck(VoiceLeaveAckBody {
                    conversation_id: body.conversation_id,
                    success: true,
                    error: None,
                }),
            );
            resources.hub.send_to_connection(connection_id, &ack).await;
        }

        body @ (EventBody::VoiceSpeaking(_) | EventBody::VoiceStatus(_)) => {
            if resources
                .hub
                .is_voice_participant(connection_id, &conversation_id)
                .await
            {
                let rebroadcast = Envelope {
                    conversation_id: conversation_id.clone(),
                    body,
                    trace,
                };
                resources.hub.broadcast(&conversation_id, &rebroadcast, None).await;
            }
        }

        EventBody::AssistantMessage(body) => {
            if resources.hub.is_agent(connection_id).await && !conversation_id.is_empty() {
                match resources
                    .conversations
                    .record_assistant_message(
                        &conversation_id,
                        body.id.clone(),
                        body.previous_id.clone(),
                        body.content.clone(),
                    )
                    .await
                {
                    Ok(message) => resources.hub.broadcast_committed(&message).await,
                    Err(e) => {
                        warn!(conversation_id = %conversation_id, message_id = %body.id, error = %e, "failed to persist assistant message");
                    }
                }
            }
        }

        // Streaming and trace events from the agent fan out without
        // persistence; their lifecycle belongs to the generation pipeline
        body @ (EventBody::AssistantSentence(_)
        | EventBody::ReasoningStep(_)
        | EventBody::ToolUseRequest(_)
        | EventBody::ToolUseResult(_)
        | EventBody::MemoryTrace(_)
        | EventBody::ThinkingSummary(_)
        | EventBody::StartAnswer(_)
        | EventBody::TitleUpdate(_)
        | EventBody::GenerationComplete(_)
        | EventBody::Error(_)) => {
            if resources.hub.is_agent(connection_id).await && !conversation_id.is_empty() {
                let rebroadcast = Envelope {
                    conversation_id: conversation_id.clone(),
                    body,
                    trace,
                };
                resources.hub.broadcast(&conversation_id, &rebroadcast, None).await;
            }
        }

        EventBody::Ack
        | EventBody::SubscribeAck(_)
        | EventBody::UnsubscribeAck(_)
        | EventBody::SyncResponse(_)
        | EventBody::VoiceJoinAck(_)
        | EventBody::VoiceLeaveAck(_)
        | EventBody::BranchUpdate(_) => {
            // Server-to-client kinds; nothing to do inbound
        }

        EventBody::Unrecognized { kind, .. } => {
            debug!(connection_id = %connection_id, kind, "ignoring unrecognized envelope kind");
        }
    }
}

async fn handle_subscribe(
    resources: &Arc<ServerResources>,
    connection_id: ConnectionId,
    envelope_conversation: String,
    body: SubscribeBody,
) {
    if body.agent_mode {
        resources.hub.register_agent(connection_id).await;
        let ack = Envelope::new(
            "",
            EventBody::SubscribeAck(SubscribeAckBody {
                conversation_id: String::new(),
                success: true,
                error: None,
                missed_messages: None,
                agent_mode: true,
            }),
        );
        resources.hub.send_to_connection(connection_id, &ack).await;
        return;
    }

    let conversation_id = body
        .conversation_id
        .filter(|c| !c.is_empty())
        .unwrap_or(envelope_conversation);
    if conversation_id.is_empty() {
        let ack = Envelope::new(
            "",
            EventBody::SubscribeAck(SubscribeAckBody {
                conversation_id: String::new(),
                success: false,
                error: Some("conversation id required".into()),
                missed_messages: None,
                agent_mode: false,
            }),
        );
        resources.hub.send_to_connection(connection_id, &ack).await;
        return;
    }

    match resources
        .hub
        .subscribe(
            resources.storage.as_ref(),
            connection_id,
            &conversation_id,
            body.from_sequence,
        )
        .await
    {
        Ok(missed) => {
            let ack = Envelope::new(
                conversation_id.clone(),
                EventBody::SubscribeAck(SubscribeAckBody {
                    conversation_id,
                    success: true,
                    error: None,
                    missed_messages: body.from_sequence.map(|_| missed),
                    agent_mode: false,
                }),
            );
            resources.hub.send_to_connection(connection_id, &ack).await;
        }
        Err(e) if e.code == ErrorCode::CapacityExceeded => {
            // The connection is already gone; nothing left to ack
            warn!(connection_id = %connection_id, "connection dropped during replay");
        }
        Err(e) => {
            let ack = Envelope::new(
                conversation_id.clone(),
                EventBody::SubscribeAck(SubscribeAckBody {
                    conversation_id,
                    success: false,
                    error: Some(e.to_string()),
                    missed_messages: None,
                    agent_mode: false,
                }),
            );
            resources.hub.send_to_connection(connection_id, &ack).await;
        }
    }
}

async fn send_error(
    resources: &Arc<ServerResources>,
    connection_id: ConnectionId,
    conversation_id: &str,
    code: &str,
    message: &str,
) {
    let envelope = Envelope::new(
        conversation_id,
        EventBody::Error(ErrorBody {
            code: code.to_owned(),
            message: message.to_owned(),
            message_id: None,
            conversation_id: (!conversation_id.is_empty()).then(|| conversation_id.to_owned()),
        }),
    );
    resources.hub.send_to_connection(connection_id, &envelope).await;
}
