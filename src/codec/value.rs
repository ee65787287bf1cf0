//! Opaque wire values shared by all codec families.
//!
//! The dispatch path is format-agnostic: envelope fields (`params`, `id`,
//! `result`) travel through it as [`WireValue`]s tagged with their
//! serialization family, and only the typed trampolines and the per-format
//! envelope structs look inside.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, WirecallError};

/// Identifies one of the supported byte serializers.
///
/// Carries the per-format metadata that distinguishes the three envelope
/// variants: content type and protocol version string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WireKind {
    /// JSON-RPC 2.0 over `application/json`.
    Json,
    /// BSON envelope over `application/bson`.
    Bson,
    /// MessagePack envelope over `application/msgpack`.
    MsgPack,
}

impl WireKind {
    /// The `Content-Type` this format is dispatched on.
    pub const fn content_type(self) -> &'static str {
        match self {
            WireKind::Json => "application/json",
            WireKind::Bson => "application/bson",
            WireKind::MsgPack => "application/msgpack",
        }
    }

    /// `Content-Type` with charset suffix, as written on responses.
    pub(crate) const fn content_type_charset(self) -> &'static str {
        match self {
            WireKind::Json => "application/json; charset=utf-8",
            WireKind::Bson => "application/bson; charset=utf-8",
            WireKind::MsgPack => "application/msgpack; charset=utf-8",
        }
    }

    /// Protocol version tag written into response envelopes.
    pub const fn version(self) -> &'static str {
        match self {
            WireKind::Json => "2.0",
            WireKind::Bson | WireKind::MsgPack => "1.0",
        }
    }

    /// Marshal a value to bytes in this format.
    ///
    /// MessagePack uses `to_vec_named` so structs are encoded as maps with
    /// field names rather than positional arrays.
    pub fn marshal<T: Serialize>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireKind::Json => Ok(serde_json::to_vec(value)?),
            WireKind::Bson => Ok(bson::to_vec(value)?),
            WireKind::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    /// Unmarshal bytes in this format into a value.
    pub fn unmarshal<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            WireKind::Json => Ok(serde_json::from_slice(bytes)?),
            WireKind::Bson => Ok(bson::from_slice(bytes)?),
            WireKind::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

/// An opaque envelope field value, tagged with its serialization family.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Json(serde_json::Value),
    Bson(bson::Bson),
    MsgPack(rmpv::Value),
}

impl WireValue {
    /// The format this value belongs to.
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::Json(_) => WireKind::Json,
            WireValue::Bson(_) => WireKind::Bson,
            WireValue::MsgPack(_) => WireKind::MsgPack,
        }
    }

    /// The null value of the given format.
    pub fn null(kind: WireKind) -> Self {
        match kind {
            WireKind::Json => WireValue::Json(serde_json::Value::Null),
            WireKind::Bson => WireValue::Bson(bson::Bson::Null),
            WireKind::MsgPack => WireValue::MsgPack(rmpv::Value::Nil),
        }
    }

    /// True if this is the format's explicit null.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            WireValue::Json(serde_json::Value::Null)
                | WireValue::Bson(bson::Bson::Null)
                | WireValue::MsgPack(rmpv::Value::Nil)
        )
    }

    /// Convert a serializable value into this format's value space.
    pub fn encode<T: Serialize>(kind: WireKind, value: &T) -> Result<Self> {
        match kind {
            WireKind::Json => Ok(WireValue::Json(serde_json::to_value(value)?)),
            WireKind::Bson => Ok(WireValue::Bson(bson::to_bson(value)?)),
            WireKind::MsgPack => rmpv::ext::to_value(value)
                .map(WireValue::MsgPack)
                .map_err(|e| WirecallError::MsgPackValue(e.to_string())),
        }
    }

    /// Decode this value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            WireValue::Json(v) => Ok(serde_json::from_value(v.clone())?),
            WireValue::Bson(v) => Ok(bson::from_bson(v.clone())?),
            WireValue::MsgPack(v) => rmpv::ext::from_value(v.clone())
                .map_err(|e| WirecallError::MsgPackValue(e.to_string())),
        }
    }

    /// Extract the JSON value, failing if the value belongs to another family.
    pub(crate) fn as_json(&self) -> Result<&serde_json::Value> {
        match self {
            WireValue::Json(v) => Ok(v),
            other => Err(WirecallError::Codec(format!(
                "expected a JSON value, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Extract the BSON value, failing if the value belongs to another family.
    pub(crate) fn as_bson(&self) -> Result<&bson::Bson> {
        match self {
            WireValue::Bson(v) => Ok(v),
            other => Err(WirecallError::Codec(format!(
                "expected a BSON value, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Extract the MessagePack value, failing if the value belongs to another family.
    pub(crate) fn as_msgpack(&self) -> Result<&rmpv::Value> {
        match self {
            WireValue::MsgPack(v) => Ok(v),
            other => Err(WirecallError::Codec(format!(
                "expected a MessagePack value, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Best-effort conversion to JSON, used for error diagnostics.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        match self {
            WireValue::Json(v) => v.clone(),
            WireValue::Bson(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
            WireValue::MsgPack(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
        }
    }
}
