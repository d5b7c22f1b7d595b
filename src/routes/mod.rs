// ABOUTME: HTTP route definitions - REST surface, WebSocket upgrade, and health check
// ABOUTME: Content negotiation picks JSON or MessagePack per Accept preference
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! HTTP routing for the sync server.
//!
//! The REST surface serves conversation CRUD, branch operations, and the
//! sync endpoints; `/ws` upgrades to the multiplexed envelope connection.
//! Caller identity arrives pre-validated in the `x-user-id` header; this
//! core consumes it for access checks and never validates it.

pub mod conversations;
pub mod sync;
pub mod websocket;

use crate::resources::ServerResources;
use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::protocol::WireFormat;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the opaque pre-validated caller identity
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build the full router for one server instance
pub fn router(resources: Arc<ServerResources>) -> Router {
    let cors = if resources.config.http.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<header::HeaderValue> = resources
            .config
            .http
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api = Router::new()
        .route(
            "/conversations",
            post(conversations::create).get(conversations::list),
        )
        .route(
            "/conversations/:id",
            get(conversations::get).patch(conversations::update),
        )
        .route("/conversations/:id/messages", get(conversations::messages).post(conversations::append))
        .route("/conversations/:id/switch-branch", post(conversations::switch_branch))
        .route("/messages/:id/siblings", get(conversations::siblings))
        .route("/conversations/:id/sync", post(sync::sync_messages))
        .route("/conversations/:id/sync/status", get(sync::sync_status))
        .with_state(resources.clone());

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::upgrade))
        .with_state(resources)
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "colloquy-server" }))
}

/// Extract the pre-validated caller identity
///
/// # Errors
///
/// `PermissionDenied` when the identity header is missing or malformed.
pub fn caller_identity(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::permission_denied("missing caller identity"))
}

/// Wire format requested by the caller's `Accept` preference
#[must_use]
pub fn response_format(headers: &HeaderMap) -> WireFormat {
    WireFormat::negotiate(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
}

/// Wire format of a request body, from its `Content-Type`
#[must_use]
pub fn request_format(headers: &HeaderMap) -> WireFormat {
    WireFormat::negotiate(headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()))
}

/// Serialize a response in the negotiated wire format
///
/// # Errors
///
/// Propagates serialization failures as `AppError`.
pub fn negotiated<T: Serialize>(
    headers: &HeaderMap,
    status: StatusCode,
    value: &T,
) -> AppResult<Response> {
    let format = response_format(headers);
    let bytes = format.to_vec(value)?;
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, format.content_type())
        .body(Body::from(bytes))
        .map_err(|e| AppError::internal("build response").with_source(e))
}
