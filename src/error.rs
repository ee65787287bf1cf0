//! Error types for wirecall.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// BSON serialization error.
    #[error("BSON encode error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("BSON decode error: {0}")]
    BsonDecode(#[from] bson::de::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// MsgPack value-level conversion error (`rmpv`).
    #[error("MsgPack value error: {0}")]
    MsgPackValue(String),

    /// Codec invariant violation (value from the wrong serialization family).
    #[error("codec error: {0}")]
    Codec(String),

    /// A service with this name is already registered.
    #[error("rpc: service already defined: {0:?}")]
    DuplicateService(String),

    /// The service exposes no methods at all.
    #[error("rpc: {0:?} has no methods of suitable type")]
    NoMethods(String),

    /// Registration was attempted without a usable service name.
    #[error("rpc: no service name given")]
    EmptyServiceName,

    /// No service registered under the requested name.
    #[error("rpc: can't find service {0:?}")]
    ServiceNotFound(String),

    /// The service exists but has no method of the requested name.
    #[error("rpc: can't find method {0:?}")]
    MethodNotFound(String),

    /// The method name is neither `Service.Method` nor a known bare name.
    #[error("rpc: service/method request ill-formed: {0:?}")]
    IllFormedMethod(String),

    /// HTTP transport failure on the client side.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an RPC error envelope.
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(ErrorObject),
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;

/// JSON-RPC style error codes, shared by all wire formats.
pub mod code {
    /// Invalid payload; the envelope could not be parsed.
    pub const PARSE: i64 = -32700;
    /// The envelope is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal RPC error.
    pub const INTERNAL: i64 = -32603;
    /// Generic server-side error; default for bare handler errors.
    pub const SERVER: i64 = -32000;
}

/// Structured RPC error object: `{code, message, data?}`.
///
/// This is the wire shape shared by all three codec families, and the
/// error type surfaced to RPC clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorObject {
    /// Create an error with an explicit code.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a SERVER-class error (the default for unclassified failures).
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(code::SERVER, message)
    }

    /// Create a PARSE-class error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(code::PARSE, message)
    }

    /// Attach an opaque data payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorObject {}
