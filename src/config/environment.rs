// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses environment variables into typed sub-configs with sane defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! Environment-based configuration management for production deployment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Environment type for logging and safety defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Per-connection WebSocket tuning
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Bound of each connection's outbound event queue; a connection whose
    /// queue would overflow is disconnected rather than allowed to stall
    /// delivery to other subscribers
    pub outbound_queue_capacity: usize,
    /// Keepalive ping cadence
    pub ping_interval: Duration,
}

/// Offline sync reconciliation tuning
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bounded wait for a conversation's reconciliation lock; expiry
    /// surfaces as a retryable timeout instead of holding callers hostage
    pub lock_timeout: Duration,
    /// Maximum items accepted in one sync batch
    pub max_batch_size: usize,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub environment: Environment,
    pub http: HttpConfig,
    pub ws: WsConfig,
    pub sync: SyncConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_default(),
        );

        let http = HttpConfig {
            host: env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: parse_env("HTTP_PORT", 8081)?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let ws = WsConfig {
            outbound_queue_capacity: parse_env("WS_OUTBOUND_QUEUE_CAPACITY", 64)?,
            ping_interval: Duration::from_secs(parse_env("WS_PING_INTERVAL_SECS", 30)?),
        };

        let sync = SyncConfig {
            lock_timeout: Duration::from_secs(parse_env("SYNC_LOCK_TIMEOUT_SECS", 10)?),
            max_batch_size: parse_env("SYNC_MAX_BATCH_SIZE", 500)?,
        };

        Ok(Self {
            environment,
            http,
            ws,
            sync,
        })
    }

    /// Socket address string for the HTTP listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}
