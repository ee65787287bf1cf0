//! Codec module - the shared envelope contract and its three wire formats.
//!
//! A [`Codec`] knows how to parse one envelope variant out of a request body
//! and how to encode response envelopes back to bytes. Everything else -
//! deferred parse errors, the positional parameter fallback, notification
//! suppression, response headers - is implemented once in [`CodecRequest`]
//! and [`decode_params`], so the per-format modules contain nothing but
//! their serde envelope structs and version metadata.
//!
//! # Formats
//!
//! - [`JsonCodec`] - JSON-RPC 2.0 (`application/json`)
//! - [`BsonCodec`] - BSON envelope (`application/bson`)
//! - [`MsgPackCodec`] - MessagePack envelope (`application/msgpack`)
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{Codec, JsonCodec};
//!
//! let parsed = JsonCodec::new()
//!     .parse(br#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1},"id":1}"#)
//!     .unwrap();
//! assert_eq!(parsed.method, "Calc.Add");
//! ```

mod bson;
mod json;
mod msgpack;
mod value;

pub use bson::BsonCodec;
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use value::{WireKind, WireValue};

use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::error::{code, ErrorObject, Result};
use crate::server::ResponseSink;

pub(crate) use bson::{
    decode_client_response as bson_decode_client_response,
    encode_client_request as bson_encode_client_request,
};
pub(crate) use json::{
    decode_client_response as json_decode_client_response,
    encode_client_request as json_encode_client_request,
};
pub(crate) use msgpack::{
    decode_client_response as msgpack_decode_client_response,
    encode_client_request as msgpack_encode_client_request,
};

/// A request envelope normalized across wire formats.
///
/// Explicit nulls in `params` and `id` are folded into `None` during
/// parsing, so an absent id and a null id are indistinguishable downstream
/// (both mark a fire-and-forget notification).
#[derive(Debug)]
pub struct ParsedRequest {
    /// Method name, possibly dotted `Service.Method`. Empty if the envelope
    /// carried none.
    pub method: String,
    /// Opaque parameters value.
    pub params: Option<WireValue>,
    /// Request id, echoed back on responses.
    pub id: Option<WireValue>,
}

/// An outbound response envelope. `result` and `error` are mutually
/// exclusive by construction of the two write paths in [`CodecRequest`].
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub result: Option<WireValue>,
    pub error: Option<ErrorObject>,
    pub id: WireValue,
}

/// One wire format: envelope parsing plus response encoding.
///
/// Implementations differ only in their serde field tags, version string,
/// and byte serializer; the dispatch control flow never varies per format.
pub trait Codec: Send + Sync + 'static {
    /// The serialization family of this codec.
    fn kind(&self) -> WireKind;

    /// The content type this codec is registered under by default.
    fn content_type(&self) -> &'static str {
        self.kind().content_type()
    }

    /// Parse a request body into the normalized envelope.
    fn parse(&self, body: &[u8]) -> Result<ParsedRequest>;

    /// Encode a response envelope to bytes.
    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<Vec<u8>>;
}

/// Per-request codec state: the parse outcome plus the response writer.
///
/// A parse failure is not surfaced immediately; it is captured and returned
/// from [`method`](Self::method), so the dispatcher observes it at the point
/// where it first needs the envelope (mirroring the deferred-error contract
/// of the envelope protocol).
pub struct CodecRequest {
    codec: Arc<dyn Codec>,
    state: std::result::Result<ParsedRequest, ErrorObject>,
}

impl CodecRequest {
    /// Parse `body` with `codec`, deferring any parse error.
    pub fn new(codec: Arc<dyn Codec>, body: &[u8]) -> Self {
        let state = codec.parse(body).map_err(|e| {
            debug!("envelope parse failed: {e}");
            ErrorObject::parse(e.to_string())
        });
        Self { codec, state }
    }

    /// The serialization family of the underlying codec.
    pub fn kind(&self) -> WireKind {
        self.codec.kind()
    }

    /// The method name, or the deferred parse error.
    pub fn method(&self) -> std::result::Result<&str, ErrorObject> {
        match &self.state {
            Ok(parsed) => Ok(&parsed.method),
            Err(err) => Err(err.clone()),
        }
    }

    /// The opaque parameters value, if the envelope carried one.
    pub fn params(&self) -> Option<&WireValue> {
        self.state.as_ref().ok().and_then(|p| p.params.as_ref())
    }

    /// The request id, if the envelope carried one.
    pub fn id(&self) -> Option<&WireValue> {
        self.state.as_ref().ok().and_then(|p| p.id.as_ref())
    }

    /// Write a success envelope carrying `result` into the sink.
    pub fn write_response(&self, sink: &mut ResponseSink, result: WireValue) {
        self.write_envelope(sink, StatusCode::OK, Some(result), None);
    }

    /// Write an error envelope into the sink.
    ///
    /// `status` distinguishes framework-stage failures (400) from
    /// handler-reported RPC errors (200); the envelope shape is identical.
    pub fn write_error_response(&self, sink: &mut ResponseSink, status: StatusCode, err: ErrorObject) {
        self.write_envelope(sink, status, None, Some(err));
    }

    fn write_envelope(
        &self,
        sink: &mut ResponseSink,
        status: StatusCode,
        result: Option<WireValue>,
        error: Option<ErrorObject>,
    ) {
        sink.set_status(status);
        // Fire-and-forget notification: no id means no response body.
        let Some(id) = self.id().cloned() else {
            return;
        };
        let envelope = ResponseEnvelope { result, error, id };
        match self.codec.encode_response(&envelope) {
            Ok(bytes) => {
                sink.set_content_type(self.kind().content_type_charset());
                sink.write(&bytes);
            }
            Err(e) => {
                error!("failed to encode {} response: {e}", self.codec.content_type());
                sink.plain_error(StatusCode::BAD_REQUEST, &format!("rpc: {e}"));
            }
        }
    }
}

/// Decode an envelope's parameters into the declared argument type.
///
/// Shared across all wire formats:
/// 1. absent params produce the argument type's zero value;
/// 2. direct (named-field) decoding is attempted first;
/// 3. on failure the value is retried as a one-element sequence, supporting
///    JSON-RPC positional parameters where `params: [args]`;
/// 4. if both fail, an INVALID_PARAMS error is returned carrying the raw
///    parameters for diagnostics.
pub fn decode_params<T>(params: Option<&WireValue>) -> std::result::Result<T, ErrorObject>
where
    T: DeserializeOwned + Default,
{
    let Some(value) = params else {
        return Ok(T::default());
    };
    match value.decode::<T>() {
        Ok(args) => Ok(args),
        Err(direct_err) => match value.decode::<(T,)>() {
            Ok((args,)) => Ok(args),
            Err(_) => Err(ErrorObject::new(code::INVALID_PARAMS, direct_err.to_string())
                .with_data(value.to_json_lossy())),
        },
    }
}
