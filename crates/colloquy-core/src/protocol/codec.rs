// ABOUTME: Wire format selection and serialization for the envelope protocol
// ABOUTME: Self-describing JSON text form and compact MessagePack binary form
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Content type selecting the compact binary encoding
pub const CONTENT_TYPE_MSGPACK: &str = "application/msgpack";
/// Content type of the default text encoding
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// The two supported encodings of the logical envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Self-describing text form; the default and the debuggable one
    #[default]
    Json,
    /// Compact binary form, selected by explicit content negotiation
    MsgPack,
}

impl WireFormat {
    /// Negotiate the wire format from an `Accept` preference.
    ///
    /// Only an explicit `application/msgpack` preference selects the binary
    /// form; absence or a wildcard keeps the text default.
    #[must_use]
    pub fn negotiate(accept: Option<&str>) -> Self {
        match accept {
            Some(value) if value.contains(CONTENT_TYPE_MSGPACK) => Self::MsgPack,
            _ => Self::Json,
        }
    }

    /// The content type this format is served as
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::MsgPack => CONTENT_TYPE_MSGPACK,
        }
    }

    /// Serialize a value in this format.
    ///
    /// The binary form writes field names (maps, not tuples) so heterogeneous
    /// clients can evolve independently of field order.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the value cannot be encoded.
    pub fn to_vec<T: Serialize>(self, value: &T) -> AppResult<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec(value)
                .map_err(|e| AppError::serialization("encode json").with_source(e)),
            Self::MsgPack => rmp_serde::to_vec_named(value)
                .map_err(|e| AppError::serialization("encode msgpack").with_source(e)),
        }
    }

    /// Deserialize a value in this format
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the bytes are not a valid encoding of
    /// the expected shape.
    pub fn from_slice<T: DeserializeOwned>(self, bytes: &[u8]) -> AppResult<T> {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| AppError::serialization("decode json").with_source(e)),
            Self::MsgPack => rmp_serde::from_slice(bytes)
                .map_err(|e| AppError::serialization("decode msgpack").with_source(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_defaults_to_json() {
        assert_eq!(WireFormat::negotiate(None), WireFormat::Json);
        assert_eq!(WireFormat::negotiate(Some("*/*")), WireFormat::Json);
        assert_eq!(
            WireFormat::negotiate(Some("application/json")),
            WireFormat::Json
        );
    }

    #[test]
    fn explicit_preference_selects_binary() {
        assert_eq!(
            WireFormat::negotiate(Some("application/msgpack")),
            WireFormat::MsgPack
        );
        assert_eq!(
            WireFormat::negotiate(Some("application/msgpack, application/json;q=0.5")),
            WireFormat::MsgPack
        );
    }
}
