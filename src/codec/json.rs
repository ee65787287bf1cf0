//! JSON-RPC 2.0 codec using `serde_json`.
//!
//! Envelope fields follow the JSON-RPC 2.0 spec: the version tag is
//! `"jsonrpc": "2.0"`. The version field is written on responses but not
//! validated on reads, matching the other codec families.

use serde::{Deserialize, Serialize};

use crate::codec::value::{WireKind, WireValue};
use crate::codec::{Codec, ParsedRequest, ResponseEnvelope};
use crate::error::{ErrorObject, Result};

/// JSON-RPC 2.0 codec. Registered under `application/json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }
}

#[derive(Deserialize)]
struct ServerRequest {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ServerResponse<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
    id: &'a serde_json::Value,
}

impl Codec for JsonCodec {
    fn kind(&self) -> WireKind {
        WireKind::Json
    }

    fn parse(&self, body: &[u8]) -> Result<ParsedRequest> {
        let req: ServerRequest = serde_json::from_slice(body)?;
        Ok(ParsedRequest {
            method: req.method,
            params: req.params.filter(|v| !v.is_null()).map(WireValue::Json),
            id: req.id.filter(|v| !v.is_null()).map(WireValue::Json),
        })
    }

    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
        let result = envelope.result.as_ref().map(WireValue::as_json).transpose()?;
        let res = ServerResponse {
            jsonrpc: WireKind::Json.version(),
            result,
            error: envelope.error.as_ref(),
            id: envelope.id.as_json()?,
        };
        Ok(serde_json::to_vec(&res)?)
    }
}

// ----------------------------------------------------------------------------
// Client-side envelope helpers
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct ClientRequest<'a, T: Serialize + ?Sized> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a T,
    id: u64,
}

#[derive(Deserialize)]
struct ClientResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub(crate) fn encode_client_request<T: Serialize + ?Sized>(
    method: &str,
    params: &T,
    id: u64,
) -> Result<Vec<u8>> {
    let req = ClientRequest {
        jsonrpc: WireKind::Json.version(),
        method,
        params,
        id,
    };
    Ok(serde_json::to_vec(&req)?)
}

/// Returns `(result, error)`; explicit nulls are normalized to `None`.
pub(crate) fn decode_client_response(bytes: &[u8]) -> Result<(Option<WireValue>, Option<WireValue>)> {
    let res: ClientResponse = serde_json::from_slice(bytes)?;
    Ok((
        res.result.filter(|v| !v.is_null()).map(WireValue::Json),
        res.error.filter(|v| !v.is_null()).map(WireValue::Json),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_named_params() {
        let body = br#"{"jsonrpc":"2.0","method":"Calc.Multiply","params":{"a":4,"b":2},"id":1}"#;
        let parsed = JsonCodec.parse(body).unwrap();
        assert_eq!(parsed.method, "Calc.Multiply");
        assert_eq!(parsed.params, Some(WireValue::Json(json!({"a": 4, "b": 2}))));
        assert_eq!(parsed.id, Some(WireValue::Json(json!(1))));
    }

    #[test]
    fn test_parse_normalizes_null_id_and_params() {
        let body = br#"{"jsonrpc":"2.0","method":"M","params":null,"id":null}"#;
        let parsed = JsonCodec.parse(body).unwrap();
        assert!(parsed.params.is_none());
        assert!(parsed.id.is_none());
    }

    #[test]
    fn test_parse_missing_method_yields_empty_name() {
        let body = br#"{"jsonrpc":"2.0","id":7}"#;
        let parsed = JsonCodec.parse(body).unwrap();
        assert_eq!(parsed.method, "");
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(JsonCodec.parse(b"{not json").is_err());
    }

    #[test]
    fn test_encode_success_response() {
        let envelope = ResponseEnvelope {
            result: Some(WireValue::Json(json!({"value": 8}))),
            error: None,
            id: WireValue::Json(json!(3)),
        };
        let bytes = JsonCodec.encode_response(&envelope).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["result"]["value"], 8);
        assert_eq!(v["id"], 3);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_encode_error_response() {
        let envelope = ResponseEnvelope {
            result: None,
            error: Some(ErrorObject::server("boom")),
            id: WireValue::Json(json!(5)),
        };
        let bytes = JsonCodec.encode_response(&envelope).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["code"], -32000);
        assert_eq!(v["error"]["message"], "boom");
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_client_round_trip() {
        let bytes = encode_client_request("Calc.Multiply", &json!({"a": 4, "b": 2}), 42).unwrap();
        let parsed = JsonCodec.parse(&bytes).unwrap();
        assert_eq!(parsed.method, "Calc.Multiply");
        assert_eq!(parsed.params, Some(WireValue::Json(json!({"a": 4, "b": 2}))));
        assert_eq!(parsed.id, Some(WireValue::Json(json!(42))));
    }

    #[test]
    fn test_client_decode_null_result_is_absent() {
        let (result, error) =
            decode_client_response(br#"{"jsonrpc":"2.0","id":12345,"result":null}"#).unwrap();
        assert!(result.is_none());
        assert!(error.is_none());
    }
}
