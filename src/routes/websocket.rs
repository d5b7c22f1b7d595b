// ABOUTME: WebSocket upgrade route handing sockets to the connection handler
// ABOUTME: Caller identity is read before upgrade; the socket then speaks envelopes only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::caller_identity;
use crate::resources::ServerResources;
use crate::ws::connection;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::info;

/// `GET /ws`: upgrade to the multiplexed envelope connection
pub async fn upgrade(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match caller_identity(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    info!(user_id = %user_id, "websocket upgrade");
    ws.on_upgrade(move |socket| connection::handle_socket(socket, user_id, resources))
}
