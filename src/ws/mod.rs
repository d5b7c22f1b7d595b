// ABOUTME: Multiplexed WebSocket transport - hub registry and per-connection handling
// ABOUTME: One socket per client carries envelopes for any number of conversations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Multiplexed Connection Broadcaster
//!
//! Each client holds a single WebSocket; envelopes on it are multiplexed
//! across conversations. The [`hub::ConnectionHub`] owns the fan-out table
//! and per-connection bounded outbound queues; [`connection`] runs the
//! inbound read path and the single writer task per socket.

pub mod connection;
pub mod hub;

pub use hub::{ConnectionHub, ConnectionId};
