// ABOUTME: Tagged envelope protocol multiplexed over a single connection per client
// ABOUTME: Integer kind discriminators dispatch into an exhaustive body sum type
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Wire Envelope Protocol
//!
//! Every frame on the multiplexed connection is an [`Envelope`]: a
//! conversation id, an integer kind discriminator, a kind-specific body, and
//! optional distributed-trace metadata. The discriminator fully determines
//! the body schema; kinds this build does not recognize decode into
//! [`EventBody::Unrecognized`] so newer peers keep working against older
//! servers.
//!
//! Two encodings of the same logical envelope exist; see
//! [`codec::WireFormat`].

pub mod bodies;
pub mod codec;
pub mod timestamp;

pub use bodies::*;
pub use codec::{WireFormat, CONTENT_TYPE_JSON, CONTENT_TYPE_MSGPACK};
pub use timestamp::Timestamp;

use crate::errors::AppResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope kind discriminators.
///
/// The numbering has gaps where retired kinds used to live; values are wire
/// contract and must never be reused for a different shape.
pub mod kind {
    pub const ERROR: u16 = 1;
    pub const USER_MESSAGE: u16 = 2;
    pub const ASSISTANT_MESSAGE: u16 = 3;
    pub const REASONING_STEP: u16 = 5;
    pub const TOOL_USE_REQUEST: u16 = 6;
    pub const TOOL_USE_RESULT: u16 = 7;
    pub const ACK: u16 = 8;
    pub const START_ANSWER: u16 = 13;
    pub const MEMORY_TRACE: u16 = 14;
    pub const ASSISTANT_SENTENCE: u16 = 16;
    pub const GENERATION_REQUEST: u16 = 33;
    pub const THINKING_SUMMARY: u16 = 34;
    pub const TITLE_UPDATE: u16 = 35;
    pub const SUBSCRIBE: u16 = 40;
    pub const UNSUBSCRIBE: u16 = 41;
    pub const SUBSCRIBE_ACK: u16 = 42;
    pub const UNSUBSCRIBE_ACK: u16 = 43;
    pub const SYNC_REQUEST: u16 = 44;
    pub const SYNC_RESPONSE: u16 = 45;
    pub const BRANCH_UPDATE: u16 = 50;
    pub const VOICE_JOIN: u16 = 51;
    pub const VOICE_JOIN_ACK: u16 = 52;
    pub const VOICE_LEAVE: u16 = 53;
    pub const VOICE_LEAVE_ACK: u16 = 54;
    pub const VOICE_STATUS: u16 = 55;
    pub const VOICE_SPEAKING: u16 = 56;
    pub const GENERATION_COMPLETE: u16 = 80;
}

/// W3C-style trace metadata plus session correlation fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 hex chars
    pub trace_id: Option<String>,
    /// 16 hex chars
    pub span_id: Option<String>,
    /// 0x01 = sampled
    pub trace_flags: Option<u8>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl TraceContext {
    #[must_use]
    pub fn has_trace(&self) -> bool {
        self.trace_id.is_some() && self.span_id.is_some()
    }

    /// W3C traceparent form: `00-{trace_id}-{span_id}-{flags}`
    #[must_use]
    pub fn traceparent(&self) -> Option<String> {
        match (&self.trace_id, &self.span_id) {
            (Some(trace_id), Some(span_id)) => Some(format!(
                "00-{trace_id}-{span_id}-{:02x}",
                self.trace_flags.unwrap_or(0)
            )),
            _ => None,
        }
    }
}

/// Exhaustive sum of every recognized envelope body
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Error(ErrorBody),
    UserMessage(UserMessageBody),
    AssistantMessage(AssistantMessageBody),
    ReasoningStep(ReasoningStepBody),
    ToolUseRequest(ToolUseRequestBody),
    ToolUseResult(ToolUseResultBody),
    Ack,
    StartAnswer(StartAnswerBody),
    MemoryTrace(MemoryTraceBody),
    AssistantSentence(AssistantSentenceBody),
    GenerationRequest(GenerationRequestBody),
    ThinkingSummary(ThinkingSummaryBody),
    TitleUpdate(TitleUpdateBody),
    Subscribe(SubscribeBody),
    Unsubscribe(UnsubscribeBody),
    SubscribeAck(SubscribeAckBody),
    UnsubscribeAck(UnsubscribeAckBody),
    SyncRequest(SyncRequestBody),
    SyncResponse(SyncResponseBody),
    BranchUpdate(BranchUpdateBody),
    VoiceJoin(VoiceJoinBody),
    VoiceJoinAck(VoiceJoinAckBody),
    VoiceLeave(VoiceLeaveBody),
    VoiceLeaveAck(VoiceLeaveAckBody),
    VoiceStatus(VoiceStatusBody),
    VoiceSpeaking(VoiceSpeakingBody),
    GenerationComplete(GenerationCompleteBody),
    /// Forward-compatibility fallback: an envelope whose discriminator this
    /// build does not know, body preserved verbatim
    Unrecognized { kind: u16, body: rmpv::Value },
}

impl EventBody {
    /// The wire discriminator of this body
    #[must_use]
    pub fn kind(&self) -> u16 {
        match self {
            Self::Error(_) => kind::ERROR,
            Self::UserMessage(_) => kind::USER_MESSAGE,
            Self::AssistantMessage(_) => kind::ASSISTANT_MESSAGE,
            Self::ReasoningStep(_) => kind::REASONING_STEP,
            Self::ToolUseRequest(_) => kind::TOOL_USE_REQUEST,
            Self::ToolUseResult(_) => kind::TOOL_USE_RESULT,
            Self::Ack => kind::ACK,
            Self::StartAnswer(_) => kind::START_ANSWER,
            Self::MemoryTrace(_) => kind::MEMORY_TRACE,
            Self::AssistantSentence(_) => kind::ASSISTANT_SENTENCE,
            Self::GenerationRequest(_) => kind::GENERATION_REQUEST,
            Self::ThinkingSummary(_) => kind::THINKING_SUMMARY,
            Self::TitleUpdate(_) => kind::TITLE_UPDATE,
            Self::Subscribe(_) => kind::SUBSCRIBE,
            Self::Unsubscribe(_) => kind::UNSUBSCRIBE,
            Self::SubscribeAck(_) => kind::SUBSCRIBE_ACK,
            Self::UnsubscribeAck(_) => kind::UNSUBSCRIBE_ACK,
            Self::SyncRequest(_) => kind::SYNC_REQUEST,
            Self::SyncResponse(_) => kind::SYNC_RESPONSE,
            Self::BranchUpdate(_) => kind::BRANCH_UPDATE,
            Self::VoiceJoin(_) => kind::VOICE_JOIN,
            Self::VoiceJoinAck(_) => kind::VOICE_JOIN_ACK,
            Self::VoiceLeave(_) => kind::VOICE_LEAVE,
            Self::VoiceLeaveAck(_) => kind::VOICE_LEAVE_ACK,
            Self::VoiceStatus(_) => kind::VOICE_STATUS,
            Self::VoiceSpeaking(_) => kind::VOICE_SPEAKING,
            Self::GenerationComplete(_) => kind::GENERATION_COMPLETE,
            Self::Unrecognized { kind, .. } => *kind,
        }
    }
}

/// Outer wire structure carrying a kind discriminator, a kind-specific body,
/// and trace metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Conversation the envelope belongs to; empty for connection-scoped
    /// envelopes (agent registration, acks without a conversation)
    pub conversation_id: String,
    pub body: EventBody,
    pub trace: TraceContext,
}

impl Envelope {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, body: EventBody) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            body,
            trace: TraceContext::default(),
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    /// The wire discriminator of the carried body
    #[must_use]
    pub fn kind(&self) -> u16 {
        self.body.kind()
    }

    /// Encode the envelope in the given wire format
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn encode(&self, format: WireFormat) -> AppResult<Vec<u8>> {
        match &self.body {
            EventBody::Error(b) => self.encode_with(format, kind::ERROR, b),
            EventBody::UserMessage(b) => self.encode_with(format, kind::USER_MESSAGE, b),
            EventBody::AssistantMessage(b) => self.encode_with(format, kind::ASSISTANT_MESSAGE, b),
            EventBody::ReasoningStep(b) => self.encode_with(format, kind::REASONING_STEP, b),
            EventBody::ToolUseRequest(b) => self.encode_with(format, kind::TOOL_USE_REQUEST, b),
            EventBody::ToolUseResult(b) => self.encode_with(format, kind::TOOL_USE_RESULT, b),
            EventBody::Ack => self.encode_with(format, kind::ACK, &EmptyBody {}),
            EventBody::StartAnswer(b) => self.encode_with(format, kind::START_ANSWER, b),
            EventBody::MemoryTrace(b) => self.encode_with(format, kind::MEMORY_TRACE, b),
            EventBody::AssistantSentence(b) => {
                self.encode_with(format, kind::ASSISTANT_SENTENCE, b)
            }
            EventBody::GenerationRequest(b) => {
                self.encode_with(format, kind::GENERATION_REQUEST, b)
            }
            EventBody::ThinkingSummary(b) => self.encode_with(format, kind::THINKING_SUMMARY, b),
            EventBody::TitleUpdate(b) => self.encode_with(format, kind::TITLE_UPDATE, b),
            EventBody::Subscribe(b) => self.encode_with(format, kind::SUBSCRIBE, b),
            EventBody::Unsubscribe(b) => self.encode_with(format, kind::UNSUBSCRIBE, b),
            EventBody::SubscribeAck(b) => self.encode_with(format, kind::SUBSCRIBE_ACK, b),
            EventBody::UnsubscribeAck(b) => self.encode_with(format, kind::UNSUBSCRIBE_ACK, b),
            EventBody::SyncRequest(b) => self.encode_with(format, kind::SYNC_REQUEST, b),
            EventBody::SyncResponse(b) => self.encode_with(format, kind::SYNC_RESPONSE, b),
            EventBody::BranchUpdate(b) => self.encode_with(format, kind::BRANCH_UPDATE, b),
            EventBody::VoiceJoin(b) => self.encode_with(format, kind::VOICE_JOIN, b),
            EventBody::VoiceJoinAck(b) => self.encode_with(format, kind::VOICE_JOIN_ACK, b),
            EventBody::VoiceLeave(b) => self.encode_with(format, kind::VOICE_LEAVE, b),
            EventBody::VoiceLeaveAck(b) => self.encode_with(format, kind::VOICE_LEAVE_ACK, b),
            EventBody::VoiceStatus(b) => self.encode_with(format, kind::VOICE_STATUS, b),
            EventBody::VoiceSpeaking(b) => self.encode_with(format, kind::VOICE_SPEAKING, b),
            EventBody::GenerationComplete(b) => {
                self.encode_with(format, kind::GENERATION_COMPLETE, b)
            }
            EventBody::Unrecognized { kind, body } => self.encode_with(format, *kind, body),
        }
    }

    /// Decode an envelope from the given wire format.
    ///
    /// Unknown discriminators succeed and yield [`EventBody::Unrecognized`];
    /// a malformed outer structure or a body that does not match its
    /// discriminator's schema is a serialization error.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if decoding fails.
    pub fn decode(format: WireFormat, bytes: &[u8]) -> AppResult<Self> {
        let head: WireHead = format.from_slice(bytes)?;
        match head.kind {
            kind::ERROR => decode_typed(format, bytes, EventBody::Error),
            kind::USER_MESSAGE => decode_typed(format, bytes, EventBody::UserMessage),
            kind::ASSISTANT_MESSAGE => decode_typed(format, bytes, EventBody::AssistantMessage),
            kind::REASONING_STEP => decode_typed(format, bytes, EventBody::ReasoningStep),
            kind::TOOL_USE_REQUEST => decode_typed(format, bytes, EventBody::ToolUseRequest),
            kind::TOOL_USE_RESULT => decode_typed(format, bytes, EventBody::ToolUseResult),
            kind::ACK => decode_raw(format, bytes, |_| EventBody::Ack),
            kind::START_ANSWER => decode_typed(format, bytes, EventBody::StartAnswer),
            kind::MEMORY_TRACE => decode_typed(format, bytes, EventBody::MemoryTrace),
            kind::ASSISTANT_SENTENCE => decode_typed(format, bytes, EventBody::AssistantSentence),
            kind::GENERATION_REQUEST => decode_typed(format, bytes, EventBody::GenerationRequest),
            kind::THINKING_SUMMARY => decode_typed(format, bytes, EventBody::ThinkingSummary),
            kind::TITLE_UPDATE => decode_typed(format, bytes, EventBody::TitleUpdate),
            kind::SUBSCRIBE => decode_typed(format, bytes, EventBody::Subscribe),
            kind::UNSUBSCRIBE => decode_typed(format, bytes, EventBody::Unsubscribe),
            kind::SUBSCRIBE_ACK => decode_typed(format, bytes, EventBody::SubscribeAck),
            kind::UNSUBSCRIBE_ACK => decode_typed(format, bytes, EventBody::UnsubscribeAck),
            kind::SYNC_REQUEST => decode_typed(format, bytes, EventBody::SyncRequest),
            kind::SYNC_RESPONSE => decode_typed(format, bytes, EventBody::SyncResponse),
            kind::BRANCH_UPDATE => decode_typed(format, bytes, EventBody::BranchUpdate),
            kind::VOICE_JOIN => decode_typed(format, bytes, EventBody::VoiceJoin),
            kind::VOICE_JOIN_ACK => decode_typed(format, bytes, EventBody::VoiceJoinAck),
            kind::VOICE_LEAVE => decode_typed(format, bytes, EventBody::VoiceLeave),
            kind::VOICE_LEAVE_ACK => decode_typed(format, bytes, EventBody::VoiceLeaveAck),
            kind::VOICE_STATUS => decode_typed(format, bytes, EventBody::VoiceStatus),
            kind::VOICE_SPEAKING => decode_typed(format, bytes, EventBody::VoiceSpeaking),
            kind::GENERATION_COMPLETE => {
                decode_typed(format, bytes, EventBody::GenerationComplete)
            }
            unknown => decode_raw(format, bytes, move |body| EventBody::Unrecognized {
                kind: unknown,
                body,
            }),
        }
    }

    fn encode_with<T: Serialize>(&self, format: WireFormat, kind: u16, body: &T) -> AppResult<Vec<u8>> {
        format.to_vec(&WireOut {
            conversation_id: if self.conversation_id.is_empty() {
                None
            } else {
                Some(&self.conversation_id)
            },
            kind,
            body,
            trace_id: self.trace.trace_id.as_deref(),
            span_id: self.trace.span_id.as_deref(),
            trace_flags: self.trace.trace_flags,
            session_id: self.trace.session_id.as_deref(),
            user_id: self.trace.user_id.as_deref(),
        })
    }
}

/// Serialized outer shape of an envelope
#[derive(Serialize)]
struct WireOut<'a, T> {
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    #[serde(rename = "type")]
    kind: u16,
    body: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_flags: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Serialize)]
struct EmptyBody {}

/// First pass: read only the discriminator
#[derive(Deserialize)]
struct WireHead {
    #[serde(rename = "type")]
    kind: u16,
}

/// Second pass: full outer shape with a typed body
#[derive(Deserialize)]
struct WireIn<T> {
    #[serde(rename = "conversationId", default)]
    conversation_id: String,
    #[serde(rename = "type")]
    _kind: u16,
    body: T,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
    #[serde(default)]
    trace_flags: Option<u8>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Second pass for bodiless or unrecognized kinds: the body is captured as a
/// raw value (and may be absent entirely)
#[derive(Deserialize)]
struct WireInRaw {
    #[serde(rename = "conversationId", default)]
    conversation_id: String,
    #[serde(rename = "type")]
    _kind: u16,
    #[serde(default = "nil_value")]
    body: rmpv::Value,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
    #[serde(default)]
    trace_flags: Option<u8>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

fn nil_value() -> rmpv::Value {
    rmpv::Value::Nil
}

fn decode_typed<T: DeserializeOwned>(
    format: WireFormat,
    bytes: &[u8],
    wrap: fn(T) -> EventBody,
) -> AppResult<Envelope> {
    let wire: WireIn<T> = format.from_slice(bytes)?;
    Ok(Envelope {
        conversation_id: wire.conversation_id,
        body: wrap(wire.body),
        trace: TraceContext {
            trace_id: wire.trace_id,
            span_id: wire.span_id,
            trace_flags: wire.trace_flags,
            session_id: wire.session_id,
            user_id: wire.user_id,
        },
    })
}

fn decode_raw(
    format: WireFormat,
    bytes: &[u8],
    wrap: impl FnOnce(rmpv::Value) -> EventBody,
) -> AppResult<Envelope> {
    let wire: WireInRaw = format.from_slice(bytes)?;
    Ok(Envelope {
        conversation_id: wire.conversation_id,
        body: wrap(wire.body),
        trace: TraceContext {
            trace_id: wire.trace_id,
            span_id: wire.span_id,
            trace_flags: wire.trace_flags,
            session_id: wire.session_id,
            user_id: wire.user_id,
        },
    })
}
