// ABOUTME: Wire timestamp type tolerating the timestamp encodings of heterogeneous clients
// ABOUTME: Decodes 32/64/96-bit msgpack timestamp extensions, integer millis, and RFC 3339 text
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy

//! Cross-runtime timestamp decoding.
//!
//! Clients on different platforms have historically encoded points in time in
//! four shapes: the msgpack timestamp extension in its 32-bit (seconds), 64-bit
//! (packed seconds+nanoseconds), and 96-bit (nanoseconds then seconds) layouts,
//! plus a plain integer-milliseconds fallback. [`Timestamp`] decodes all of
//! them; encoding always emits integer milliseconds in the binary form and
//! RFC 3339 text in the JSON form, so round trips are stable per format.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in time carried on the wire, millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current instant, truncated to millisecond precision
    #[must_use]
    pub fn now() -> Self {
        Self::from_unix_millis(Utc::now().timestamp_millis()).unwrap_or(Self(DateTime::UNIX_EPOCH))
    }

    /// Build from unix milliseconds
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Unix milliseconds representation
    #[must_use]
    pub fn unix_millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    /// The underlying instant
    #[must_use]
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        // Truncate to millisecond precision so wire round trips compare equal
        Self::from_unix_millis(dt.timestamp_millis()).unwrap_or(Self(dt))
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
        } else {
            serializer.serialize_i64(self.unix_millis())
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let millis = deserializer.deserialize_any(MillisVisitor)?;
        match millis {
            Some(ms) => Timestamp::from_unix_millis(ms)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {ms}ms"))),
            None => Err(de::Error::custom("timestamp must not be nil")),
        }
    }
}

/// Decode a msgpack timestamp extension payload, keyed by byte length
///
/// Returns unix milliseconds, truncating sub-millisecond precision.
fn decode_ext_payload(data: &[u8]) -> Option<i64> {
    match data.len() {
        4 => {
            // 32-bit layout: big-endian seconds
            let secs = i64::from(u32::from_be_bytes(data.try_into().ok()?));
            Some(secs * 1000)
        }
        8 => {
            // 64-bit layout: nanoseconds in the upper 30 bits, seconds in the lower 34
            let val = u64::from_be_bytes(data.try_into().ok()?);
            let nanos = val >> 34;
            let secs = i64::try_from(val & 0x3_ffff_ffff).ok()?;
            Some(secs * 1000 + i64::try_from(nanos / 1_000_000).ok()?)
        }
        12 => {
            // 96-bit layout: 4 bytes nanoseconds, then 8 bytes seconds
            let nanos = u32::from_be_bytes(data[..4].try_into().ok()?);
            let secs = i64::from_be_bytes(data[4..].try_into().ok()?);
            Some(secs * 1000 + i64::from(nanos / 1_000_000))
        }
        _ => None,
    }
}

/// Byte payload of a msgpack extension value
struct ExtBytes(Vec<u8>);

impl<'de> Deserialize<'de> for ExtBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = ExtBytes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("extension byte payload")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(ExtBytes(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(ExtBytes(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    buf.push(byte);
                }
                Ok(ExtBytes(buf))
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}

/// `(tag, payload)` pair carried inside a msgpack extension value
struct ExtPayload(#[allow(dead_code)] i8, ExtBytes);

impl<'de> Deserialize<'de> for ExtPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairVisitor;

        impl<'de> Visitor<'de> for PairVisitor {
            type Value = ExtPayload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a (tag, bytes) extension pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: i8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let bytes: ExtBytes = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(ExtPayload(tag, bytes))
            }
        }

        deserializer.deserialize_tuple(2, PairVisitor)
    }
}

/// Visitor decoding any supported timestamp shape into unix milliseconds
///
/// `None` is produced only for explicit nil, so optional fields can share it.
struct MillisVisitor;

impl<'de> Visitor<'de> for MillisVisitor {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a timestamp (integer millis, RFC 3339 string, or msgpack timestamp extension)")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(Some)
            .map_err(|_| de::Error::custom("timestamp overflows i64 milliseconds"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        // Fractional timestamps are seconds-based by convention
        #[allow(clippy::cast_possible_truncation)]
        let millis = (v * 1000.0) as i64;
        Ok(Some(millis))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DateTime::parse_from_rfc3339(v)
            .map(|dt| Some(dt.with_timezone(&Utc).timestamp_millis()))
            .map_err(|e| de::Error::custom(format!("invalid RFC 3339 timestamp: {e}")))
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        let ExtPayload(_tag, ExtBytes(data)) = ExtPayload::deserialize(d)?;
        decode_ext_payload(&data)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unsupported timestamp extension length {}", data.len())))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(MillisVisitor)
    }
}

/// Serde helper for fields that want a timestamp decoded directly into
/// `Option<i64>` unix milliseconds, whatever shape the peer sent.
pub mod opt_millis {
    use super::{Deserializer, MillisVisitor, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ms) => serializer.serialize_i64(*ms),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        deserializer.deserialize_any(MillisVisitor)
    }
}
