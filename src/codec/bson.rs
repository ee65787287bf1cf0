//! BSON codec using the `bson` crate.
//!
//! The envelope mirrors the JSON-RPC shape but is serialized as a BSON
//! document. The version tag is written under the `msgpackrpc` key with
//! value `"1.0"`, which is the historical wire format of this envelope
//! family; it is written on responses and ignored on reads.

use serde::{Deserialize, Serialize};

use crate::codec::value::{WireKind, WireValue};
use crate::codec::{Codec, ParsedRequest, ResponseEnvelope};
use crate::error::{ErrorObject, Result};

/// BSON codec. Registered under `application/bson`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BsonCodec;

impl BsonCodec {
    pub fn new() -> Self {
        BsonCodec
    }
}

#[derive(Deserialize)]
struct ServerRequest {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Option<bson::Bson>,
    #[serde(default)]
    id: Option<bson::Bson>,
}

#[derive(Serialize)]
struct ServerResponse<'a> {
    #[serde(rename = "msgpackrpc")]
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a bson::Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
    id: &'a bson::Bson,
}

impl Codec for BsonCodec {
    fn kind(&self) -> WireKind {
        WireKind::Bson
    }

    fn parse(&self, body: &[u8]) -> Result<ParsedRequest> {
        let req: ServerRequest = bson::from_slice(body)?;
        Ok(ParsedRequest {
            method: req.method,
            params: req.params.filter(|v| *v != bson::Bson::Null).map(WireValue::Bson),
            id: req.id.filter(|v| *v != bson::Bson::Null).map(WireValue::Bson),
        })
    }

    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
        let result = envelope.result.as_ref().map(WireValue::as_bson).transpose()?;
        let res = ServerResponse {
            version: WireKind::Bson.version(),
            result,
            error: envelope.error.as_ref(),
            id: envelope.id.as_bson()?,
        };
        Ok(bson::to_vec(&res)?)
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
    result: Option<bson::Bson>,
    #[serde(default)]
    error: Option<bson::Bson>,
}

pub(crate) fn encode_client_request<T: Serialize + ?Sized>(
    method: &str,
    params: &T,
    id: u64,
) -> Result<Vec<u8>> {
    let req = ClientRequest {
        version: WireKind::Bson.version(),
        method,
        params,
        id,
    };
    Ok(bson::to_vec(&req)?)
}

/// Returns `(result, error)`; explicit nulls are normalized to `None`.
pub(crate) fn decode_client_response(bytes: &[u8]) -> Result<(Option<WireValue>, Option<WireValue>)> {
    let res: ClientResponse = bson::from_slice(bytes)?;
    Ok((
        res.result.filter(|v| *v != bson::Bson::Null).map(WireValue::Bson),
        res.error.filter(|v| *v != bson::Bson::Null).map(WireValue::Bson),
    ))
}
