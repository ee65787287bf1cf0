//! MessagePack codec using `rmp-serde` and `rmpv`.
//!
//! Always encodes with `to_vec_named` so structs travel as maps with field
//! names rather than positional arrays, the layout other MessagePack-RPC
//! implementations expect. The version tag is written under
//! the `msgpackrpc` key with value `"1.0"`, written on responses and
//! ignored on reads.

use serde::{Deserialize, Serialize};

use crate::codec::value::{WireKind, WireValue};
use crate::codec::{Codec, ParsedRequest, ResponseEnvelope};
use crate::error::{ErrorObject, Result};

/// MessagePack codec. Registered under `application/msgpack`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    pub fn new() -> Self {
        MsgPackCodec
    }
}

#[derive(Deserialize)]
struct ServerRequest {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Option<rmpv::Value>,
    #[serde(default)]
    id: Option<rmpv::Value>,
}

#[derive(Serialize)]
struct ServerResponse<'a> {
    #[serde(rename = "msgpackrpc")]
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a rmpv::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
    id: &'a rmpv::Value,
}

impl Codec for MsgPackCodec {
    fn kind(&self) -> WireKind {
        WireKind::MsgPack
    }

    fn parse(&self, body: &[u8]) -> Result<ParsedRequest> {
        let req: ServerRequest = rmp_serde::from_slice(body)?;
        Ok(ParsedRequest {
            method: req.method,
            params: req.params.filter(|v| !v.is_nil()).map(WireValue::MsgPack),
            id: req.id.filter(|v| !v.is_nil()).map(WireValue::MsgPack),
        })
    }

    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
        let result = envelope.result.as_ref().map(WireValue::as_msgpack).transpose()?;
        let res = ServerResponse {
            version: WireKind::MsgPack.version(),
            result,
            error: envelope.error.as_ref(),
            id: envelope.id.as_msgpack()?,
        };
        Ok(rmp_serde::to_vec_named(&res)?)
    }
}

// ----------------------------------------------------------------------------
// Client-side envelope helpers
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct ClientRequest<'a, T: Serialize + ?Sized> {
    #[serde(rename = "msgpackrpc")]
    version: &'static str,
    method: &'a str,
    params: &'a T,
    id: u64,
}

#[derive(Deserialize)]
struct ClientResponse {
    #[serde(default)]
    result: Option<rmpv::Value>,
    #[serde(default)]
    error: Option<rmpv::Value>,
}

pub(crate) fn encode_client_request<T: Serialize + ?Sized>(
    method: &str,
    params: &T,
    id: u64,
) -> Result<Vec<u8>> {
    let req = ClientRequest {
        version: WireKind::MsgPack.version(),
        method,
        params,
        id,
    };
    Ok(rmp_serde::to_vec_named(&req)?)
}

/// Returns `(result, error)`; explicit nils are normalized to `None`.
pub(crate) fn decode_client_response(bytes: &[u8]) -> Result<(Option<WireValue>, Option<WireValue>)> {
    let res: ClientResponse = rmp_serde::from_slice(bytes)?;
    Ok((
        res.result.filter(|v| !v.is_nil()).map(WireValue::MsgPack),
        res.error.filter(|v| !v.is_nil()).map(WireValue::MsgPack),
    ))
}
