// ABOUTME: Unified error taxonomy for the Colloquy conversation sync server
// ABOUTME: Error codes, HTTP status mapping, retryability classification, and response formatting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! # Unified Error Handling System
//!
//! Central error types shared by the server and its protocol layer. Every
//! failure is an [`AppError`] carrying an [`ErrorCode`]; sync conflicts are
//! deliberately *not* represented here: a conflict is an ordinary result
//! variant on the sync response, never a fault.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation (1000-1999)
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 1000,
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField = 1001,
    #[serde(rename = "INVALID_FORMAT")]
    InvalidFormat = 1002,

    // Resource access (2000-2999)
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 2000,
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied = 2001,

    // Delivery & flow control (3000-3999)
    #[serde(rename = "TRANSIENT_NETWORK")]
    TransientNetwork = 3000,
    #[serde(rename = "TIMEOUT")]
    Timeout = 3001,
    #[serde(rename = "CAPACITY_EXCEEDED")]
    CapacityExceeded = 3002,
    #[serde(rename = "CIRCUIT_OPEN")]
    CircuitOpen = 3003,
    #[serde(rename = "RETRY_EXHAUSTED")]
    RetryExhausted = 3004,

    // Internal (9000-9999)
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    #[serde(rename = "STORAGE_ERROR")]
    StorageError = 9001,
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9002,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidInput | Self::MissingRequiredField | Self::InvalidFormat => 400,

            // 403 Forbidden
            Self::PermissionDenied => 403,

            // 404 Not Found
            Self::ResourceNotFound => 404,

            // 408 Request Timeout
            Self::Timeout => 408,

            // 503 Service Unavailable
            Self::TransientNetwork
            | Self::CapacityExceeded
            | Self::CircuitOpen
            | Self::RetryExhausted => 503,

            // 500 Internal Server Error
            Self::InternalError | Self::StorageError | Self::SerializationError => 500,
        }
    }

    /// Whether an operation failing with this code may succeed on retry
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetwork | Self::Timeout)
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::InvalidFormat => "The data format is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::TransientNetwork => "A transient network failure occurred",
            Self::Timeout => "The operation timed out",
            Self::CapacityExceeded => "A delivery queue overflowed",
            Self::CircuitOpen => "The protected dependency is unavailable",
            Self::RetryExhausted => "The operation failed after all retry attempts",
            Self::InternalError => "An internal server error occurred",
            Self::StorageError => "Storage operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// Caller identity if available
    pub user_id: Option<String>,
    /// Resource ID if applicable
    pub resource_id: Option<String>,
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Malformed request or envelope
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Unknown or inaccessible conversation/message
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    /// Caller identity has no access to the resource
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Retryable delivery failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransientNetwork, message)
    }

    /// Bounded wait expired; surfaced as retryable
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Connection dropped for outbound-queue overflow
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CapacityExceeded, message)
    }

    /// Internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Storage backend failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Encode/decode failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Add a request ID to the error context
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context.request_id = Some(request_id.into());
        self
    }

    /// Add a caller identity to the error context
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    /// Add a resource ID to the error context
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.context.resource_id = Some(resource_id.into());
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Whether the failure may succeed on retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorResponseDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: err.code,
                message: err.message.clone(),
                request_id: err.context.request_id.clone(),
            },
        }
    }
}

#[cfg(feature = "http-response")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = http::StatusCode::from_u16(self.http_status())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::Json(ErrorResponse::from(&self));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert_eq!(ErrorCode::InvalidInput.http_status(), 400);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::Timeout.http_status(), 408);
        assert_eq!(ErrorCode::CircuitOpen.http_status(), 503);
        assert_eq!(ErrorCode::StorageError.http_status(), 500);
    }

    #[test]
    fn retryability_follows_classification() {
        assert!(ErrorCode::TransientNetwork.is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::PermissionDenied.is_retryable());
        assert!(!ErrorCode::InvalidInput.is_retryable());
        assert!(!ErrorCode::CircuitOpen.is_retryable());
    }

    #[test]
    fn error_context_builders_attach_fields() {
        let err = AppError::not_found("no such conversation")
            .with_resource_id("conv_123")
            .with_user_id("user_1");
        assert_eq!(err.context.resource_id.as_deref(), Some("conv_123"));
        assert_eq!(err.context.user_id.as_deref(), Some("user_1"));
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
    }
}
