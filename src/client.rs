//! RPC client: typed calls over HTTP.
//!
//! [`Client`] speaks any of the three wire formats against a dispatcher
//! endpoint. Requests carry a random 63-bit id and the arguments directly
//! as `params`, binding by field name on the server; the server's
//! positional one-element-array fallback exists for third-party callers.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use wirecall::Client;
//!
//! #[derive(Serialize)]
//! struct AddArgs { a: i64, b: i64 }
//!
//! #[derive(Deserialize)]
//! struct AddReply { sum: i64 }
//!
//! # async fn run() -> wirecall::Result<()> {
//! let client = Client::new("http://127.0.0.1:4545/rpc");
//! let reply: AddReply = client.call("Calc.Add", &AddArgs { a: 20, b: 22 }).await?;
//! assert_eq!(reply.sum, 42);
//! # Ok(())
//! # }
//! ```

use http::StatusCode;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec::{
    bson_decode_client_response, bson_encode_client_request, json_decode_client_response,
    json_encode_client_request, msgpack_decode_client_response, msgpack_encode_client_request,
    WireKind, WireValue,
};
use crate::error::{code, ErrorObject, Result, WirecallError};

/// The error a client observes when the server's result field is null or
/// absent on a success envelope.
pub fn null_result() -> ErrorObject {
    ErrorObject::new(code::INVALID_PARAMS, "result is null")
}

/// Fold any client-side failure into the wire error shape: RPC errors pass
/// through, everything else becomes a SERVER-class error carrying the
/// failure's message.
pub fn convert_error(err: &WirecallError) -> ErrorObject {
    match err {
        WirecallError::Rpc(obj) => obj.clone(),
        other => ErrorObject::server(other.to_string()),
    }
}

fn encode_request<Args>(kind: WireKind, method: &str, args: &Args, id: u64) -> Result<Vec<u8>>
where
    Args: Serialize + ?Sized,
{
    match kind {
        WireKind::Json => json_encode_client_request(method, args, id),
        WireKind::Bson => bson_encode_client_request(method, args, id),
        WireKind::MsgPack => msgpack_encode_client_request(method, args, id),
    }
}

fn decode_response(kind: WireKind, bytes: &[u8]) -> Result<(Option<WireValue>, Option<WireValue>)> {
    match kind {
        WireKind::Json => json_decode_client_response(bytes),
        WireKind::Bson => bson_decode_client_response(bytes),
        WireKind::MsgPack => msgpack_decode_client_response(bytes),
    }
}

/// An RPC client bound to one endpoint URL and one wire format.
///
/// Cheap to clone; the underlying HTTP client pools connections.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    url: String,
    kind: WireKind,
}

impl Client {
    /// Create a JSON-RPC 2.0 client for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            kind: WireKind::Json,
        }
    }

    /// Switch the wire format.
    pub fn with_kind(mut self, kind: WireKind) -> Self {
        self.kind = kind;
        self
    }

    /// Supply a preconfigured HTTP client (timeouts, proxies, TLS).
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The wire format this client speaks.
    pub fn kind(&self) -> WireKind {
        self.kind
    }

    /// Call `method` with `args` and decode the result into `Reply`.
    ///
    /// Server-reported errors come back as [`WirecallError::Rpc`]; a success
    /// envelope with a null result as `Rpc(null_result())`.
    pub async fn call<Args, Reply>(&self, method: &str, args: &Args) -> Result<Reply>
    where
        Args: Serialize + ?Sized,
        Reply: DeserializeOwned,
    {
        let id = rand::rng().random::<u64>() >> 1;
        let body = encode_request(self.kind, method, args, id)?;
        debug!(method, id, url = %self.url, "calling");

        let response = self
            .http
            .post(&self.url)
            .header(http::header::CONTENT_TYPE, self.kind.content_type())
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let (result, error) = match decode_response(self.kind, &bytes) {
            Ok(pair) => pair,
            // A body that is not an envelope at all: surface the transport
            // status (405/415 and body-read failures are plain text).
            Err(_) if status != StatusCode::OK && status != StatusCode::BAD_REQUEST => {
                return Err(WirecallError::Codec(format!(
                    "rpc: HTTP {status}: {}",
                    String::from_utf8_lossy(&bytes).trim()
                )));
            }
            Err(e) => return Err(e),
        };
        if let Some(error) = error {
            // An error value that is not a structured error object still has
            // to reach the caller; report it raw as a parse failure.
            let object = error
                .decode::<ErrorObject>()
                .unwrap_or_else(|_| ErrorObject::parse(error.to_json_lossy().to_string()));
            return Err(WirecallError::Rpc(object));
        }
        let Some(result) = result else {
            return Err(WirecallError::Rpc(null_result()));
        };
        result
            .decode::<Reply>()
            .map_err(|e| WirecallError::Rpc(ErrorObject::parse(e.to_string())))
    }
}

/// One-shot call with a throwaway JSON client.
pub async fn call<Args, Reply>(url: &str, method: &str, args: &Args) -> Result<Reply>
where
    Args: Serialize + ?Sized,
    Reply: DeserializeOwned,
{
    Client::new(url).call(method, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, JsonCodec};
    use serde_json::json;

    #[test]
    fn test_request_params_are_sent_unwrapped() {
        let body = encode_request(WireKind::Json, "Calc.Add", &json!({"a": 1, "b": 2}), 7).unwrap();
        let parsed = JsonCodec::new().parse(&body).unwrap();
        assert_eq!(parsed.method, "Calc.Add");
        // Arguments travel as-is, so the server binds by field name without
        // taking the positional fallback.
        assert_eq!(parsed.params, Some(WireValue::Json(json!({"a": 1, "b": 2}))));
        assert_eq!(parsed.id, Some(WireValue::Json(json!(7))));
    }

    #[test]
    fn test_null_result_shape() {
        let err = null_result();
        assert_eq!(err.code, code::INVALID_PARAMS);
        assert_eq!(err.message, "result is null");
    }

    #[test]
    fn test_convert_error_passes_rpc_through() {
        let rpc = WirecallError::Rpc(ErrorObject::new(1001, "refused"));
        assert_eq!(convert_error(&rpc), ErrorObject::new(1001, "refused"));
    }

    #[test]
    fn test_convert_error_wraps_other_failures() {
        let err = WirecallError::Codec("family mismatch".to_string());
        let object = convert_error(&err);
        assert_eq!(object.code, code::SERVER);
        assert_eq!(object.message, "codec error: family mismatch");
    }
}
