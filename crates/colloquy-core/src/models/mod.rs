// ABOUTME: Domain models shared by the server and protocol layers
// ABOUTME: Conversations with archive state and branching messages with sync tracking
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationStatus};
pub use message::{Message, MessageRole, MessageStatus, SyncState};
