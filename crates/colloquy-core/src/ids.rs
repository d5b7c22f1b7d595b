// ABOUTME: Prefixed identifier generation for conversations, messages, and connections
// ABOUTME: Server-assigned ids are opaque strings with a type prefix for log readability
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use uuid::Uuid;

/// Generate a new conversation id (`conv_` prefix)
#[must_use]
pub fn conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}

/// Generate a new canonical message id (`msg_` prefix)
#[must_use]
pub fn message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Generate a new sentence-fragment id (`snt_` prefix)
#[must_use]
pub fn sentence_id() -> String {
    format!("snt_{}", Uuid::new_v4().simple())
}
