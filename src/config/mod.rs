// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-driven configuration for transport, sync, and resilience knobs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! Configuration module for the Colloquy sync server
//!
//! All configuration is environment-driven (no config files), mirroring the
//! deployment model of the rest of the platform:
//!
//! - **Environment**: server bind address, CORS origins, runtime environment
//! - **Ws**: outbound queue bounds and keepalive cadence
//! - **Sync**: per-conversation lock wait and batch limits

/// Environment and server configuration
pub mod environment;

pub use environment::ServerConfig;
