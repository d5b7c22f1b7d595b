// ABOUTME: REST handlers for offline sync batches and sync status
// ABOUTME: Request and response bodies honor MessagePack/JSON content negotiation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::{caller_identity, negotiated, request_format};
use crate::resources::ServerResources;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use colloquy_core::errors::AppResult;
use colloquy_core::protocol::SyncRequestBody;
use std::sync::Arc;

/// `POST /api/v1/conversations/:id/sync`
///
/// Applies an ordered batch of client-queued messages; replaying an
/// already-applied batch returns the same mappings without re-applying.
pub async fn sync_messages(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let request: SyncRequestBody = request_format(&headers).from_slice(&body)?;
    let response = resources.sync.sync_batch(&user_id, &id, request).await?;
    negotiated(&headers, StatusCode::OK, &response)
}

/// `GET /api/v1/conversations/:id/sync/status`
pub async fn sync_status(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let status = resources.sync.sync_status(&user_id, &id).await?;
    negotiated(&headers, StatusCode::OK, &status)
}
