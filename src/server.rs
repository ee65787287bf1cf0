//! HTTP dispatcher: codec negotiation, method resolution, and serving.
//!
//! [`Server`] owns the codec table and the service registry and drives the
//! whole request lifecycle: method filtering, Content-Type negotiation,
//! envelope parsing, name resolution, trampoline invocation, and response
//! assembly. It is transport-frontend agnostic via [`Server::handle`], which
//! maps one `http::Request` to one `http::Response`; [`Server::serve`] wires
//! that into a hyper HTTP/1.1 accept loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use wirecall::{JsonCodec, Server, Service};
//!
//! #[derive(Deserialize, Default)]
//! struct AddArgs { a: i64, b: i64 }
//!
//! #[derive(Serialize, Default)]
//! struct AddReply { sum: i64 }
//!
//! # async fn run() -> wirecall::Result<()> {
//! let addr: std::net::SocketAddr = "127.0.0.1:4545".parse().unwrap();
//! let mut server = Server::new();
//! server.register_codec(JsonCodec::new());
//! server.register_service(Service::new("Calc").method(
//!     "Add",
//!     |args: &AddArgs, reply: &mut AddReply| {
//!         reply.sum = args.a + args.b;
//!         Ok(())
//!     },
//! ))?;
//! Arc::new(server).serve(addr).await
//! # }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::codec::{Codec, CodecRequest};
use crate::error::{code, ErrorObject, Result, WirecallError};
use crate::handler::{CallContext, MethodStats, Service, ServiceRegistry, TrampolineError};

/// A response under construction.
///
/// Handlers with the response capability receive this to adjust headers (or
/// the status) before the envelope is written; the dispatcher then appends
/// the envelope body and converts the sink into an `http::Response`.
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseSink {
    pub(crate) fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Current response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Override the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers accumulated so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn set_content_type(&mut self, value: &'static str) {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Replace the response with a plain-text error outside any envelope.
    pub(crate) fn plain_error(&mut self, status: StatusCode, message: &str) {
        self.status = status;
        self.set_content_type("text/plain; charset=utf-8");
        self.body.clear();
        self.body.extend_from_slice(message.as_bytes());
    }

    pub(crate) fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The RPC dispatcher: codec table plus service registry.
///
/// Configure it mutably (codecs, services, flags), then share it behind an
/// `Arc` and serve. Dispatch itself takes `&self` throughout.
pub struct Server {
    codecs: HashMap<String, Arc<dyn Codec>>,
    services: ServiceRegistry,
    post_only: bool,
}

impl Server {
    /// Create a dispatcher with no codecs and no services. Only POST is
    /// accepted until [`set_post_only`](Self::set_post_only) says otherwise.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
            services: ServiceRegistry::new(),
            post_only: true,
        }
    }

    /// Register a codec under its canonical content type.
    pub fn register_codec(&mut self, codec: impl Codec) {
        let content_type = codec.content_type().to_string();
        self.register_codec_as(codec, content_type);
    }

    /// Register a codec under an explicit content type, aliasing or
    /// overriding the canonical one. Keys are matched case-insensitively.
    pub fn register_codec_as(&mut self, codec: impl Codec, content_type: impl Into<String>) {
        self.codecs
            .insert(content_type.into().to_lowercase(), Arc::new(codec));
    }

    /// Require POST (the default) or accept any HTTP method.
    pub fn set_post_only(&mut self, post_only: bool) {
        self.post_only = post_only;
    }

    /// Resolve method names case-insensitively. Configure before
    /// registering services.
    pub fn set_method_ignore_case(&mut self, ignore_case: bool) {
        self.services.set_ignore_case(ignore_case);
    }

    /// Register a service's method table. See [`ServiceRegistry::register`]
    /// for the failure modes.
    pub fn register_service(&mut self, service: Service) -> Result<()> {
        self.services.register(service)
    }

    /// True if `method` (dotted or bare) resolves to a registered handler.
    pub fn has_method(&self, method: &str) -> bool {
        self.services.has_method(method)
    }

    /// Fully qualified names of every registered method.
    pub fn method_names(&self) -> Vec<String> {
        self.services.method_names()
    }

    /// Per-method call counters.
    pub fn method_stats(&self) -> Vec<MethodStats> {
        self.services.method_stats()
    }

    /// Render a plain-text listing of registered methods and their call
    /// counts, one `Service.Method(calls:N)` line each, for mounting on a
    /// diagnostics route.
    pub fn method_page(&self) -> String {
        let mut page = String::from("Method:\n");
        for stats in self.method_stats() {
            let _ = writeln!(page, "{}(calls:{})", stats.name, stats.calls);
        }
        page
    }

    /// Serve one request.
    ///
    /// The response always carries `x-content-type-options: nosniff` and
    /// permissive CORS headers. Failures before the envelope can be parsed
    /// are reported as plain text (405, 415, or 400 on a body read error);
    /// parse, resolution, and parameter-binding failures as a 400 error
    /// envelope; handler-reported errors as a 200 error envelope.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = request.into_parts();
        let mut sink = ResponseSink::new();
        sink.headers_mut().insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        if self.post_only && parts.method != Method::POST {
            sink.plain_error(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("rpc: POST method required, received {}", parts.method),
            );
            return finish(sink);
        }

        // Media type only; parameters like charset do not affect codec choice.
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        let codec = if content_type.is_empty() && self.codecs.len() == 1 {
            self.codecs.values().next()
        } else {
            self.codecs.get(&content_type.to_lowercase())
        };
        let Some(codec) = codec.cloned() else {
            sink.plain_error(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                &format!("rpc: unrecognized Content-Type: {content_type}"),
            );
            return finish(sink);
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                sink.plain_error(
                    StatusCode::BAD_REQUEST,
                    &format!("rpc: failed to read request body: {e}"),
                );
                return finish(sink);
            }
        };

        let codec_request = CodecRequest::new(codec, &body);
        let method = match codec_request.method() {
            Ok(method) => method.to_string(),
            Err(err) => {
                codec_request.write_error_response(&mut sink, StatusCode::BAD_REQUEST, err);
                return finish(sink);
            }
        };
        let descriptor = match self.services.resolve(&method) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                codec_request.write_error_response(
                    &mut sink,
                    StatusCode::BAD_REQUEST,
                    resolution_error(e),
                );
                return finish(sink);
            }
        };

        descriptor.calls.fetch_add(1, Ordering::Relaxed);
        debug!(method = %descriptor.name, content_type, "dispatching");

        let outcome = {
            let mut ctx = CallContext {
                kind: codec_request.kind(),
                params: codec_request.params(),
                request: &parts,
                response: &mut sink,
            };
            std::panic::catch_unwind(AssertUnwindSafe(|| (descriptor.trampoline)(&mut ctx)))
        };
        match outcome {
            Ok(Ok(result)) => codec_request.write_response(&mut sink, result),
            Ok(Err(TrampolineError::InvalidParams(err))) => {
                codec_request.write_error_response(&mut sink, StatusCode::BAD_REQUEST, err)
            }
            Ok(Err(TrampolineError::Handler(err))) => {
                codec_request.write_error_response(&mut sink, StatusCode::OK, err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(method = %descriptor.name, "handler panicked: {message}");
                codec_request.write_error_response(
                    &mut sink,
                    StatusCode::OK,
                    ErrorObject::server(format!("rpc: handler panic: {message}")),
                );
            }
        }
        finish(sink)
    }

    /// Bind `addr` and serve until the task is cancelled or accept fails.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(WirecallError::Io)?;
        info!(addr = %listener.local_addr().map_err(WirecallError::Io)?, "listening");
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await.map_err(WirecallError::Io)?;
            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |request| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(request).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, "connection error: {e}");
                }
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a resolution failure to its RPC error class: unknown names are
/// METHOD_NOT_FOUND, malformed names INVALID_REQUEST.
fn resolution_error(err: WirecallError) -> ErrorObject {
    let class = match &err {
        WirecallError::ServiceNotFound(_) | WirecallError::MethodNotFound(_) => {
            code::METHOD_NOT_FOUND
        }
        WirecallError::IllFormedMethod(_) => code::INVALID_REQUEST,
        _ => code::INTERNAL,
    };
    ErrorObject::new(class, err.to_string())
}

/// Apply the always-on cross-origin headers and seal the sink.
fn finish(mut sink: ResponseSink) -> Response<Full<Bytes>> {
    let headers = sink.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    sink.into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BsonCodec, JsonCodec, MsgPackCodec};
    use crate::handler::{HandlerError, MethodResult};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Deserialize, Default)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[derive(Serialize, Default)]
    struct AddReply {
        sum: i64,
    }

    fn add(args: &AddArgs, reply: &mut AddReply) -> MethodResult {
        reply.sum = args.a + args.b;
        Ok(())
    }

    fn fail(_: &AddArgs, _: &mut AddReply) -> MethodResult {
        Err(HandlerError::with_code(1001, "arithmetic refused"))
    }

    fn explode(_: &AddArgs, _: &mut AddReply) -> MethodResult {
        panic!("overflow in handler")
    }

    fn test_server() -> Server {
        let mut server = Server::new();
        server.register_codec(JsonCodec::new());
        server
            .register_service(
                Service::new("Calc")
                    .method("Add", add)
                    .method("Fail", fail)
                    .method("Explode", explode),
            )
            .unwrap();
        server
    }

    fn request(method: Method, content_type: &str, body: &str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri("/rpc");
        if !content_type.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_only_rejects_get() {
        let server = test_server();
        let response = server.handle(request(Method::GET, "application/json", "")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"rpc: POST method required, received GET");
    }

    #[tokio::test]
    async fn test_post_only_disabled_allows_get() {
        let mut server = test_server();
        server.set_post_only(false);
        let response = server
            .handle(request(
                Method::GET,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1,"b":2},"id":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unrecognized_content_type_is_415() {
        let server = test_server();
        let response = server.handle(request(Method::POST, "text/xml", "<a/>")).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"rpc: unrecognized Content-Type: text/xml");
    }

    #[tokio::test]
    async fn test_empty_content_type_defaults_to_sole_codec() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":2,"b":3},"id":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let v = body_json(response).await;
        assert_eq!(v["result"]["sum"], 5);
    }

    #[tokio::test]
    async fn test_empty_content_type_ambiguous_is_415() {
        let mut server = test_server();
        server.register_codec(MsgPackCodec::new());
        let response = server.handle(request(Method::POST, "", "{}")).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_content_type_parameters_are_stripped() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json; charset=utf-8",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":2,"b":3},"id":7}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let v = body_json(response).await;
        assert_eq!(v["result"]["sum"], 5);
        assert_eq!(v["id"], 7);
    }

    #[tokio::test]
    async fn test_registered_alias_content_type() {
        let mut server = test_server();
        server.register_codec_as(JsonCodec::new(), "application/json-rpc");
        let response = server
            .handle(request(
                Method::POST,
                "application/json-rpc",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1,"b":1},"id":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_parse_error_is_400_envelope() {
        let server = test_server();
        let response = server
            .handle(request(Method::POST, "application/json", "{broken"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // Parse failures leave no id, so the envelope body is suppressed.
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_method_not_found_is_400_envelope() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Nope","id":4}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let v = body_json(response).await;
        assert_eq!(v["error"]["code"], code::METHOD_NOT_FOUND);
        assert_eq!(v["id"], 4);
    }

    #[tokio::test]
    async fn test_ill_formed_method_is_invalid_request() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"A.B.C","id":4}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let v = body_json(response).await;
        assert_eq!(v["error"]["code"], code::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_params_is_400_envelope() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":"scalar","id":2}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let v = body_json(response).await;
        assert_eq!(v["error"]["code"], code::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handler_error_is_200_envelope() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Fail","params":{"a":1,"b":2},"id":5}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let v = body_json(response).await;
        assert_eq!(v["error"]["code"], 1001);
        assert_eq!(v["error"]["message"], "arithmetic refused");
        assert_eq!(v["id"], 5);
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_server_error() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Explode","params":{"a":1,"b":2},"id":6}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let v = body_json(response).await;
        assert_eq!(v["error"]["code"], code::SERVER);
        assert_eq!(v["error"]["message"], "rpc: handler panic: overflow in handler");
    }

    #[tokio::test]
    async fn test_notification_suppresses_body_but_runs_handler() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1,"b":2}}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
        let stats = server.method_stats();
        let add = stats.iter().find(|s| s.name == "Calc.Add").unwrap();
        assert_eq!(add.calls, 1);
    }

    #[tokio::test]
    async fn test_security_and_cors_headers_on_every_response() {
        let server = test_server();
        for (method, content_type) in [
            (Method::GET, "application/json"),
            (Method::POST, "text/xml"),
            (Method::POST, "application/json"),
        ] {
            let response = server
                .handle(request(
                    method,
                    content_type,
                    r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1,"b":2},"id":1}"#,
                ))
                .await;
            let headers = response.headers();
            assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
            assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
            assert_eq!(
                headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
                "Content-Type"
            );
        }
    }

    #[tokio::test]
    async fn test_bson_round_trip_through_dispatch() {
        let mut server = test_server();
        server.register_codec(BsonCodec::new());
        let envelope = bson::doc! {
            "msgpackrpc": "1.0",
            "method": "Calc.Add",
            "params": { "a": 20, "b": 22 },
            "id": 1,
        };
        let body = bson::to_vec(&envelope).unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/rpc")
            .header(header::CONTENT_TYPE, "application/bson")
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let response = server.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/bson; charset=utf-8"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let doc: bson::Document = bson::from_slice(&bytes).unwrap();
        let result = doc.get_document("result").unwrap();
        assert_eq!(result.get_i64("sum").unwrap(), 42);
    }

    #[tokio::test]
    async fn test_response_capability_headers_survive() {
        let mut server = Server::new();
        server.register_codec(JsonCodec::new());
        server
            .register_service(Service::new("Meta").method_with_response(
                "Tag",
                |_request: &http::request::Parts,
                 response: &mut ResponseSink,
                 _args: &AddArgs,
                 reply: &mut AddReply| {
                    response
                        .headers_mut()
                        .insert("x-handler", HeaderValue::from_static("seen"));
                    reply.sum = 1;
                    Ok(())
                },
            ))
            .unwrap();

        let response = server
            .handle(request(
                Method::POST,
                "application/json",
                r#"{"jsonrpc":"2.0","method":"Meta.Tag","id":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-handler").unwrap(), "seen");
    }

    #[test]
    fn test_method_page_lists_methods() {
        let server = test_server();
        let page = server.method_page();
        assert!(page.starts_with("Method:\n"));
        assert!(page.contains("Calc.Add(calls:0)"));
        assert!(page.contains("Calc.Fail(calls:0)"));
    }

    #[tokio::test]
    async fn test_content_type_lookup_is_case_insensitive() {
        let server = test_server();
        let response = server
            .handle(request(
                Method::POST,
                "Application/JSON",
                r#"{"jsonrpc":"2.0","method":"Calc.Add","params":{"a":1,"b":1},"id":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
