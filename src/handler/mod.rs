//! Handler types: errors, call context, and the trampoline contract.
//!
//! Handlers are plain synchronous closures over typed argument and reply
//! values. At registration time each handler is wrapped in a trampoline
//! that owns the typed work - parameter decoding (with the positional
//! fallback), zero-value reply allocation, and reply encoding - so the
//! dispatcher only ever deals with opaque [`WireValue`]s.

mod registry;
mod service;

pub use registry::{MethodStats, ServiceRegistry};
pub use service::Service;
pub(crate) use service::MethodEntry;

use serde::Serialize;

use crate::codec::{WireKind, WireValue};
use crate::error::{code, ErrorObject};
use crate::server::ResponseSink;

/// Error reported by a handler.
///
/// The three constructors mirror the three recognized return shapes:
/// a bare error (SERVER-class code), a code/error pair, and a
/// code/error/data triple.
#[derive(Clone, Debug)]
pub struct HandlerError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl HandlerError {
    /// A bare error; the code defaults to SERVER (-32000).
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(code::SERVER, message)
    }

    /// An error with an explicit code.
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// An error with an explicit code and an opaque data payload.
    ///
    /// The payload is captured as JSON and transcoded into whichever wire
    /// format serves the request. A payload that fails to serialize is
    /// dropped, leaving `data` absent.
    pub fn with_data<T: Serialize + ?Sized>(code: i64, message: impl Into<String>, data: &T) -> Self {
        Self {
            code,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<HandlerError> for ErrorObject {
    fn from(err: HandlerError) -> Self {
        ErrorObject {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Result type returned by method handlers.
pub type MethodResult = std::result::Result<(), HandlerError>;

/// Per-call state handed to a trampoline.
pub struct CallContext<'a> {
    /// Wire format of the request being served.
    pub(crate) kind: WireKind,
    /// Opaque parameters from the request envelope.
    pub(crate) params: Option<&'a WireValue>,
    /// The HTTP request head, for handlers with the request capability.
    pub(crate) request: &'a http::request::Parts,
    /// The response under construction, for handlers with the response
    /// capability.
    pub(crate) response: &'a mut ResponseSink,
}

/// Failure from a trampoline, split by dispatch stage.
///
/// Parameter binding failures and handler-reported errors travel through
/// different HTTP status codes, so the dispatcher must tell them apart.
pub(crate) enum TrampolineError {
    /// Both the direct and the positional parameter decode failed.
    InvalidParams(ErrorObject),
    /// The handler ran and reported an error (or its reply failed to encode).
    Handler(ErrorObject),
}

/// Type-erased handler invocation: decode params, run, encode reply.
pub(crate) type Trampoline =
    Box<dyn Fn(&mut CallContext<'_>) -> std::result::Result<WireValue, TrampolineError> + Send + Sync>;
