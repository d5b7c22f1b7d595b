// ABOUTME: REST handlers for conversations, message listing, and branch operations
// ABOUTME: Archived conversations stay addressable but are excluded from default listings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use super::{caller_identity, negotiated};
use crate::resources::ServerResources;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use colloquy_core::errors::{AppError, AppResult};
use colloquy_core::models::MessageRole;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
    /// Only the "archived" transition is accepted here
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    #[serde(default)]
    pub previous_id: Option<String>,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchBranchRequest {
    pub message_id: String,
}

/// `POST /api/v1/conversations`
pub async fn create(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    body: axum::extract::Json<CreateConversationRequest>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let title = if body.title.is_empty() {
        "New conversation".to_owned()
    } else {
        body.title.clone()
    };
    let conversation = resources.conversations.create(&user_id, &title).await?;
    negotiated(&headers, StatusCode::CREATED, &conversation)
}

/// `GET /api/v1/conversations`
pub async fn list(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let conversations = resources
        .conversations
        .list(&user_id, query.include_archived)
        .await?;
    negotiated(&headers, StatusCode::OK, &conversations)
}

/// `GET /api/v1/conversations/:id`
pub async fn get(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let conversation = resources.conversations.get(&user_id, &id).await?;
    negotiated(&headers, StatusCode::OK, &conversation)
}

/// `PATCH /api/v1/conversations/:id`: rename and/or archive
pub async fn update(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: axum::extract::Json<UpdateConversationRequest>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;

    let mut conversation = resources.conversations.get(&user_id, &id).await?;
    if let Some(title) = &body.title {
        conversation = resources.conversations.rename(&user_id, &id, title).await?;
    }
    match body.status.as_deref() {
        None => {}
        Some("archived") => {
            conversation = resources.conversations.archive(&user_id, &id).await?;
        }
        Some(other) => {
            return Err(AppError::validation(format!(
                "unsupported status transition: {other}"
            )));
        }
    }
    negotiated(&headers, StatusCode::OK, &conversation)
}

/// `GET /api/v1/conversations/:id/messages`
pub async fn messages(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let messages = resources.conversations.messages(&user_id, &id).await?;
    negotiated(&headers, StatusCode::OK, &messages)
}

/// `POST /api/v1/conversations/:id/messages`
pub async fn append(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: axum::extract::Json<AppendMessageRequest>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let role = MessageRole::parse(&body.role)
        .ok_or_else(|| AppError::validation(format!("unknown message role: {}", body.role)))?;
    if body.content.is_empty() {
        return Err(AppError::validation("message content is required"));
    }
    let message = resources
        .conversations
        .append(&user_id, &id, body.previous_id.clone(), role, body.content.clone())
        .await?;
    negotiated(&headers, StatusCode::CREATED, &message)
}

/// `GET /api/v1/messages/:id/siblings`: alternatives sharing the parent,
/// ordered by branch index
pub async fn siblings(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let siblings = resources.conversations.siblings(&user_id, &id).await?;
    negotiated(&headers, StatusCode::OK, &siblings)
}

/// `POST /api/v1/conversations/:id/switch-branch`
pub async fn switch_branch(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: axum::extract::Json<SwitchBranchRequest>,
) -> AppResult<Response> {
    let user_id = caller_identity(&headers)?;
    let conversation = resources
        .conversations
        .switch_branch(&user_id, &id, &body.message_id)
        .await?;
    negotiated(&headers, StatusCode::OK, &conversation)
}
