// ABOUTME: Body payloads for every recognized envelope kind on the wire
// ABOUTME: Field names and shapes follow the client-facing camelCase protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::timestamp::{self, Timestamp};
use crate::models::Message;
use serde::{Deserialize, Serialize};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Structured error delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// A user-authored message, inbound from a client or fanned out after commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessageBody {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
}

/// A completed assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageBody {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Client clocks send this in whichever timestamp shape they use;
    /// decoded directly into unix milliseconds
    #[serde(
        default,
        with = "timestamp::opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

/// One streamed sentence fragment of an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSentenceBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message_id: String,
    pub previous_id: String,
    pub conversation_id: String,
    pub sequence: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_final: bool,
}

/// A single reasoning step emitted during generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStepBody {
    pub id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub sequence: u32,
    pub content: String,
}

/// Generation has started for a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnswerBody {
    pub message_id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
}

/// The agent requests execution of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseRequestBody {
    pub id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// "client" routes the request to the client device for execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseResultBody {
    pub id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub conversation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A memory retrieval trace attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTraceBody {
    pub id: String,
    pub memory_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub content: String,
    pub relevance: f32,
}

/// Progress summary of an in-flight thinking phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingSummaryBody {
    pub id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(
        default,
        with = "timestamp::opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

/// Conversation title changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleUpdateBody {
    pub conversation_id: String,
    pub title: String,
}

/// Request routed to the generation agent after a user message commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequestBody {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    pub request_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    pub enable_tools: bool,
    pub enable_reasoning: bool,
    pub enable_streaming: bool,
}

/// Subscribe this connection to a conversation's events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Replay committed messages with `sequence_number` greater than this
    /// before the subscription goes live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_sequence: Option<u64>,
    /// The generation agent registers itself with this flag
    #[serde(default, skip_serializing_if = "is_false")]
    pub agent_mode: bool,
}

/// Remove one conversation registration from this connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeBody {
    pub conversation_id: String,
}

/// Acknowledgement of a subscribe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeAckBody {
    #[serde(default)]
    pub conversation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of messages replayed for a `from_sequence` cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missed_messages: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub agent_mode: bool,
}

/// Acknowledgement of an unsubscribe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeAckBody {
    pub conversation_id: String,
    pub success: bool,
}

/// One client-queued message inside a sync batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemBody {
    pub local_id: String,
    pub sequence_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    pub role: String,
    pub contents: String,
    /// Explicit declaration that this item intentionally opens a new branch,
    /// suppressing the concurrent-extension conflict check
    #[serde(default, skip_serializing_if = "is_false")]
    pub branch: bool,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

/// An ordered batch of offline-authored messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestBody {
    pub messages: Vec<SyncItemBody>,
}

/// Outcome of reconciling one sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncResultStatus {
    Synced,
    Conflict,
    Error,
}

/// Detail attached to a conflicted sync result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetailBody {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_message: Option<Message>,
    /// Resolution policy the caller must apply; always "manual" today
    pub resolution: String,
}

/// Per-item result of a sync batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedMessageBody {
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub status: SyncResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetailBody>,
}

/// Response to a sync batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponseBody {
    pub synced_messages: Vec<SyncedMessageBody>,
    pub synced_at: Timestamp,
}

/// Per-conversation sync bookkeeping counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusBody {
    pub conversation_id: String,
    pub pending_count: u64,
    pub synced_count: u64,
    pub conflict_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<Timestamp>,
}

/// Compact sibling descriptor inside a branch update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingInfo {
    pub id: String,
    pub content: String,
    pub branch_index: u32,
    pub created_at: Timestamp,
}

/// A parent message gained a new sibling branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchUpdateBody {
    pub conversation_id: String,
    pub parent_message_id: String,
    pub new_sibling: SiblingInfo,
    pub all_siblings: Vec<SiblingInfo>,
    pub total_count: u32,
}

/// Join the voice session of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoinBody {
    pub conversation_id: String,
    pub user_id: String,
}

/// Acknowledgement of a voice join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoinAckBody {
    pub conversation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

/// Leave the voice session of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceLeaveBody {
    pub conversation_id: String,
}

/// Acknowledgement of a voice leave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceLeaveAckBody {
    pub conversation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Voice pipeline status for a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatusBody {
    pub conversation_id: String,
    /// "queue_full", "queue_ok", "speaking", or "idle"
    pub status: String,
    pub queue_length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Speaking-state change broadcast to voice participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSpeakingBody {
    pub conversation_id: String,
    pub message_id: String,
    pub speaking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_seq: Option<u32>,
}

/// Terminal event of a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCompleteBody {
    pub message_id: String,
    pub conversation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
