// ABOUTME: Round-trip tests for the envelope codec in both wire formats
// ABOUTME: Covers payload shapes, absent optionals, unknown kinds, and the four timestamp widths
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy
#![allow(missing_docs)]

use colloquy_server::protocol::{
    kind, AssistantMessageBody, AssistantSentenceBody, BranchUpdateBody, Envelope, ErrorBody,
    EventBody, MemoryTraceBody, SiblingInfo, SubscribeAckBody, SubscribeBody, SyncItemBody,
    SyncRequestBody, Timestamp, ToolUseRequestBody, TraceContext, UserMessageBody,
    VoiceSpeakingBody, WireFormat,
};
use serde_json::json;

const FORMATS: [WireFormat; 2] = [WireFormat::Json, WireFormat::MsgPack];

fn round_trip(envelope: &Envelope) {
    for format in FORMATS {
        let bytes = envelope.encode(format).unwrap();
        let decoded = Envelope::decode(format, &bytes).unwrap();
        assert_eq!(&decoded, envelope, "round trip mismatch in {format:?}");
    }
}

#[test]
fn scalar_and_optional_shapes_round_trip() {
    round_trip(&Envelope::new(
        "conv_1",
        EventBody::UserMessage(UserMessageBody {
            id: "msg_1".into(),
            conversation_id: "conv_1".into(),
            content: "hello there".into(),
            previous_id: None,
        }),
    ));

    round_trip(&Envelope::new(
        "conv_1",
        EventBody::AssistantMessage(AssistantMessageBody {
            id: "msg_2".into(),
            conversation_id: "conv_1".into(),
            content: "answer".into(),
            previous_id: Some("msg_1".into()),
            reasoning: Some("because".into()),
            timestamp: Some(1_714_521_600_123),
        }),
    ));
}

#[test]
fn absent_optionals_do_not_resurrect_as_present() {
    let envelope = Envelope::new(
        "conv_1",
        EventBody::AssistantMessage(AssistantMessageBody {
            id: "msg_2".into(),
            conversation_id: "conv_1".into(),
            content: "answer".into(),
            previous_id: None,
            reasoning: None,
            timestamp: None,
        }),
    );
    let bytes = envelope.encode(WireFormat::Json).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(!text.contains("previousId"));
    assert!(!text.contains("reasoning"));
    assert!(!text.contains("timestamp"));

    let decoded = Envelope::decode(WireFormat::Json, &bytes).unwrap();
    match decoded.body {
        EventBody::AssistantMessage(body) => {
            assert_eq!(body.previous_id, None);
            assert_eq!(body.reasoning, None);
            assert_eq!(body.timestamp, None);
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn sequence_and_map_shapes_round_trip() {
    round_trip(&Envelope::new(
        "conv_1",
        EventBody::BranchUpdate(BranchUpdateBody {
            conversation_id: "conv_1".into(),
            parent_message_id: "msg_p".into(),
            new_sibling: SiblingInfo {
                id: "msg_b".into(),
                content: "second take".into(),
                branch_index: 1,
                created_at: Timestamp::from_unix_millis(1_714_521_600_000).unwrap(),
            },
            all_siblings: vec![
                SiblingInfo {
                    id: "msg_a".into(),
                    content: "first take".into(),
                    branch_index: 0,
                    created_at: Timestamp::from_unix_millis(1_714_521_500_000).unwrap(),
                },
                SiblingInfo {
                    id: "msg_b".into(),
                    content: "second take".into(),
                    branch_index: 1,
                    created_at: Timestamp::from_unix_millis(1_714_521_600_000).unwrap(),
                },
            ],
            total_count: 2,
        }),
    ));

    round_trip(&Envelope::new(
        "conv_1",
        EventBody::ToolUseRequest(ToolUseRequestBody {
            id: "tool_1".into(),
            message_id: "msg_2".into(),
            conversation_id: "conv_1".into(),
            tool_name: "web_search".into(),
            arguments: json!({ "query": "rust msgpack", "limit": 3, "safe": true }),
            execution: Some("client".into()),
        }),
    ));
}

#[test]
fn streaming_and_voice_bodies_round_trip() {
    round_trip(&Envelope::new(
        "conv_1",
        EventBody::AssistantSentence(AssistantSentenceBody {
            id: Some("snt_1".into()),
            message_id: "msg_2".into(),
            previous_id: "msg_1".into(),
            conversation_id: "conv_1".into(),
            sequence: 4,
            text: "And furthermore,".into(),
            is_final: false,
        }),
    ));

    round_trip(&Envelope::new(
        "conv_1",
        EventBody::MemoryTrace(MemoryTraceBody {
            id: "trace_1".into(),
            memory_id: "mem_9".into(),
            message_id: "msg_2".into(),
            conversation_id: "conv_1".into(),
            content: "user prefers brief answers".into(),
            relevance: 0.75,
        }),
    ));

    round_trip(&Envelope::new(
        "conv_1",
        EventBody::VoiceSpeaking(VoiceSpeakingBody {
            conversation_id: "conv_1".into(),
            message_id: "msg_2".into(),
            speaking: true,
            sentence_seq: Some(4),
        }),
    ));
}

#[test]
fn subscribe_shapes_round_trip() {
    round_trip(&Envelope::new(
        "conv_1",
        EventBody::Subscribe(SubscribeBody {
            conversation_id: Some("conv_1".into()),
            from_sequence: Some(17),
            agent_mode: false,
        }),
    ));
    round_trip(&Envelope::new(
        "conv_1",
        EventBody::SubscribeAck(SubscribeAckBody {
            conversation_id: "conv_1".into(),
            success: true,
            error: None,
            missed_messages: Some(3),
            agent_mode: false,
        }),
    ));
}

#[test]
fn trace_context_round_trips() {
    let envelope = Envelope::new(
        "conv_1",
        EventBody::Error(ErrorBody {
            code: "sync_failed".into(),
            message: "storage unavailable".into(),
            message_id: None,
            conversation_id: Some("conv_1".into()),
        }),
    )
    .with_trace(TraceContext {
        trace_id: Some("0af7651916cd43dd8448eb211c80319c".into()),
        span_id: Some("b7ad6b7169203331".into()),
        trace_flags: Some(1),
        session_id: Some("session_4".into()),
        user_id: Some("user_7".into()),
    });
    round_trip(&envelope);
}

#[test]
fn unknown_kind_decodes_to_unrecognized_not_an_error() {
    let raw = json!({
        "conversationId": "conv_1",
        "type": 4242,
        "body": { "future": "field", "n": 7 }
    });
    let bytes = serde_json::to_vec(&raw).unwrap();
    let decoded = Envelope::decode(WireFormat::Json, &bytes).unwrap();
    match decoded.body {
        EventBody::Unrecognized { kind, .. } => assert_eq!(kind, 4242),
        other => panic!("expected unrecognized, got {other:?}"),
    }
}

#[test]
fn sync_request_round_trips_with_timestamps() {
    let envelope = Envelope::new(
        "conv_1",
        EventBody::SyncRequest(SyncRequestBody {
            messages: vec![SyncItemBody {
                local_id: "L1".into(),
                sequence_number: 1,
                previous_id: None,
                role: "user".into(),
                contents: "written on the train".into(),
                branch: false,
                created_at: Timestamp::from_unix_millis(1_714_521_600_000).unwrap(),
                updated_at: None,
            }],
        }),
    );
    assert_eq!(envelope.kind(), kind::SYNC_REQUEST);
    round_trip(&envelope);
}

/// The four historical timestamp representations must decode to the same
/// instant given equivalent inputs.
#[test]
fn all_four_timestamp_encodings_decode_to_the_same_instant() {
    let secs: u64 = 1_714_521_600; // 2024-05-01T00:00:00Z
    let expected = Timestamp::from_unix_millis(1_714_521_600_000).unwrap();

    // Plain integer milliseconds fallback
    let from_millis: Timestamp =
        rmp_serde::from_slice(&rmp_serde::to_vec(&(secs * 1000)).unwrap()).unwrap();
    assert_eq!(from_millis, expected);

    // 32-bit seconds-only extension
    let mut w32 = Vec::new();
    rmp::encode::write_ext_meta(&mut w32, 4, -1).unwrap();
    w32.extend_from_slice(&u32::try_from(secs).unwrap().to_be_bytes());
    let from_w32: Timestamp = rmp_serde::from_slice(&w32).unwrap();
    assert_eq!(from_w32, expected);

    // 64-bit packed seconds+nanoseconds extension
    let mut w64 = Vec::new();
    rmp::encode::write_ext_meta(&mut w64, 8, -1).unwrap();
    w64.extend_from_slice(&(secs & 0x3_ffff_ffff).to_be_bytes());
    let from_w64: Timestamp = rmp_serde::from_slice(&w64).unwrap();
    assert_eq!(from_w64, expected);

    // 96-bit nanoseconds-then-seconds extension
    let mut w96 = Vec::new();
    rmp::encode::write_ext_meta(&mut w96, 12, -1).unwrap();
    w96.extend_from_slice(&0u32.to_be_bytes());
    w96.extend_from_slice(&i64::try_from(secs).unwrap().to_be_bytes());
    let from_w96: Timestamp = rmp_serde::from_slice(&w96).unwrap();
    assert_eq!(from_w96, expected);
}

/// A timestamp extension must also decode directly into an integer
/// milliseconds field when the target field asks for one.
#[test]
fn extension_timestamp_decodes_into_integer_millis_field() {
    let secs: u64 = 1_714_521_600;

    // Hand-build a msgpack AssistantMessage whose timestamp is a 32-bit ext
    let mut buf = Vec::new();
    rmp::encode::write_map_len(&mut buf, 4).unwrap();
    rmp::encode::write_str(&mut buf, "id").unwrap();
    rmp::encode::write_str(&mut buf, "msg_1").unwrap();
    rmp::encode::write_str(&mut buf, "conversationId").unwrap();
    rmp::encode::write_str(&mut buf, "conv_1").unwrap();
    rmp::encode::write_str(&mut buf, "content").unwrap();
    rmp::encode::write_str(&mut buf, "hi").unwrap();
    rmp::encode::write_str(&mut buf, "timestamp").unwrap();
    rmp::encode::write_ext_meta(&mut buf, 4, -1).unwrap();
    buf.extend_from_slice(&u32::try_from(secs).unwrap().to_be_bytes());

    let body: AssistantMessageBody = rmp_serde::from_slice(&buf).unwrap();
    assert_eq!(body.timestamp, Some(i64::try_from(secs).unwrap() * 1000));
}
