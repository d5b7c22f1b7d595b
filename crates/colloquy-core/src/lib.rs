// ABOUTME: Core types for the Colloquy conversation sync platform
// ABOUTME: Foundation crate with domain models, error taxonomy, and the wire protocol codec
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

#![deny(unsafe_code)]

//! # Colloquy Core
//!
//! Foundation crate shared by the Colloquy sync server and its tooling:
//!
//! - **Models**: conversations with soft archive state and branching
//!   messages with offline sync tracking
//! - **Errors**: the unified [`errors::AppError`] taxonomy with HTTP status
//!   mapping and retryability classification
//! - **Protocol**: the tagged [`protocol::Envelope`] wire structure, its
//!   JSON/MessagePack codec, and cross-runtime timestamp decoding
//! - **Ids**: prefixed identifier generation for domain objects

pub mod errors;
pub mod ids;
pub mod models;
pub mod protocol;
