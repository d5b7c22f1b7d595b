// ABOUTME: Server binary - config, logging, resource wiring, and graceful shutdown
// ABOUTME: Serves the REST surface and the multiplexed WebSocket endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use anyhow::{Context, Result};
use colloquy_server::config::ServerConfig;
use colloquy_server::logging::LoggingConfig;
use colloquy_server::resources::ServerResources;
use colloquy_server::routes;
use colloquy_server::storage::MemoryStorage;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    LoggingConfig::from_env().init()?;

    let config = ServerConfig::from_env().context("load configuration")?;
    let bind = config.bind_address();
    info!(environment = %config.environment, bind = %bind, "starting colloquy-server");

    let resources = ServerResources::new(config, Arc::new(MemoryStorage::new()));
    let router = routes::router(resources.clone());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown_resources = resources.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
            }
            shutdown_resources.lifecycle.shutdown();
        })
        .await
        .context("serve")?;

    info!("server stopped");
    Ok(())
}
