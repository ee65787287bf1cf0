//! Service builder: an explicit method registration table.
//!
//! Methods are registered under one of three shapes, distinguished by the
//! capabilities they need:
//!
//! 1. `(args, reply)` - pure RPC method
//! 2. `(request, args, reply)` - also sees the HTTP request head
//! 3. `(request, response, args, reply)` - also mutates the HTTP response
//!
//! Argument types must implement `Deserialize + Default` (absent params
//! bind the zero value), reply types `Serialize + Default` (a fresh
//! zero-valued reply is allocated per call and filled in by the handler).
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use wirecall::{MethodResult, Service};
//!
//! #[derive(Deserialize, Default)]
//! struct MultiplyArgs { a: i64, b: i64 }
//!
//! #[derive(Serialize, Default)]
//! struct MultiplyReply { result: i64 }
//!
//! let service = Service::new("Calc").method(
//!     "Multiply",
//!     |args: &MultiplyArgs, reply: &mut MultiplyReply| {
//!         reply.result = args.a * args.b;
//!         Ok(())
//!     },
//! );
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{self, WireValue};
use crate::error::{code, ErrorObject};
use crate::server::ResponseSink;

use super::{CallContext, MethodResult, Trampoline, TrampolineError};

/// One registered method: its trampoline plus capability flags.
pub(crate) struct MethodEntry {
    pub(crate) trampoline: Trampoline,
    pub(crate) needs_request: bool,
    pub(crate) needs_response: bool,
}

/// A named method table, built fluently and handed to the registry.
pub struct Service {
    pub(crate) name: String,
    pub(crate) methods: BTreeMap<String, MethodEntry>,
}

impl Service {
    /// Create an empty service. The name must be non-empty at registration
    /// time; there is no receiver type to derive a default from.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Register a plain `(args, reply)` method.
    pub fn method<Args, Reply, F>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Default + Send + Sync + 'static,
        Reply: Serialize + Default + Send + Sync + 'static,
        F: Fn(&Args, &mut Reply) -> MethodResult + Send + Sync + 'static,
    {
        let trampoline = make_trampoline(
            move |_ctx: &mut CallContext<'_>, args: &Args, reply: &mut Reply| handler(args, reply),
        );
        self.insert(name, trampoline, false, false);
        self
    }

    /// Register a `(request, args, reply)` method that also receives the
    /// HTTP request head.
    pub fn method_with_request<Args, Reply, F>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Default + Send + Sync + 'static,
        Reply: Serialize + Default + Send + Sync + 'static,
        F: Fn(&http::request::Parts, &Args, &mut Reply) -> MethodResult + Send + Sync + 'static,
    {
        let trampoline = make_trampoline(
            move |ctx: &mut CallContext<'_>, args: &Args, reply: &mut Reply| {
                handler(ctx.request, args, reply)
            },
        );
        self.insert(name, trampoline, true, false);
        self
    }

    /// Register a `(request, response, args, reply)` method that may also
    /// mutate the HTTP response (headers) while it runs.
    pub fn method_with_response<Args, Reply, F>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Default + Send + Sync + 'static,
        Reply: Serialize + Default + Send + Sync + 'static,
        F: Fn(&http::request::Parts, &mut ResponseSink, &Args, &mut Reply) -> MethodResult
            + Send
            + Sync
            + 'static,
    {
        let trampoline = make_trampoline(
            move |ctx: &mut CallContext<'_>, args: &Args, reply: &mut Reply| {
                let request = ctx.request;
                let response = &mut *ctx.response;
                handler(request, response, args, reply)
            },
        );
        self.insert(name, trampoline, true, true);
        self
    }

    fn insert(&mut self, name: &str, trampoline: Trampoline, needs_request: bool, needs_response: bool) {
        self.methods.insert(
            name.to_string(),
            MethodEntry {
                trampoline,
                needs_request,
                needs_response,
            },
        );
    }
}

/// Wrap a uniform typed closure in the type-erased trampoline: decode the
/// parameters, allocate a zero-valued reply, run the handler, encode the
/// reply in the request's wire format.
fn make_trampoline<Args, Reply, F>(handler: F) -> Trampoline
where
    Args: DeserializeOwned + Default + Send + Sync + 'static,
    Reply: Serialize + Default + Send + Sync + 'static,
    F: Fn(&mut CallContext<'_>, &Args, &mut Reply) -> MethodResult + Send + Sync + 'static,
{
    Box::new(move |ctx: &mut CallContext<'_>| {
        let args: Args = codec::decode_params(ctx.params).map_err(TrampolineError::InvalidParams)?;
        let mut reply = Reply::default();
        handler(ctx, &args, &mut reply).map_err(|e| TrampolineError::Handler(e.into()))?;
        WireValue::encode(ctx.kind, &reply)
            .map_err(|e| TrampolineError::Handler(ErrorObject::new(code::INTERNAL, e.to_string())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireKind;
    use crate::handler::HandlerError;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Default)]
    struct Args {
        a: i64,
        b: i64,
    }

    #[derive(Serialize, Default)]
    struct Reply {
        result: i64,
    }

    fn http_parts() -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::POST)
            .uri("http://localhost/rpc")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn run(service: &Service, name: &str, params: Option<WireValue>) -> Result<WireValue, TrampolineError> {
        let parts = http_parts();
        let mut sink = ResponseSink::new();
        let mut ctx = CallContext {
            kind: WireKind::Json,
            params: params.as_ref(),
            request: &parts,
            response: &mut sink,
        };
        (service.methods[name].trampoline)(&mut ctx)
    }

    #[test]
    fn test_plain_method_binds_and_replies() {
        let service = Service::new("Calc").method("Multiply", |args: &Args, reply: &mut Reply| {
            reply.result = args.a * args.b;
            Ok(())
        });
        let out = run(&service, "Multiply", Some(WireValue::Json(json!({"a": 4, "b": 2}))));
        let reply = out.ok().unwrap();
        assert_eq!(reply, WireValue::Json(json!({"result": 8})));
    }

    #[test]
    fn test_absent_params_bind_zero_value() {
        let service = Service::new("Calc").method("Multiply", |args: &Args, reply: &mut Reply| {
            reply.result = args.a * args.b;
            Ok(())
        });
        let reply = run(&service, "Multiply", None).ok().unwrap();
        assert_eq!(reply, WireValue::Json(json!({"result": 0})));
    }

    #[test]
    fn test_handler_error_is_passed_through() {
        let service = Service::new("Calc").method("Fail", |_: &Args, _: &mut Reply| {
            Err(HandlerError::with_code(1001, "nope"))
        });
        match run(&service, "Fail", None) {
            Err(TrampolineError::Handler(err)) => {
                assert_eq!(err.code, 1001);
                assert_eq!(err.message, "nope");
            }
            _ => panic!("expected handler error"),
        }
    }

    #[test]
    fn test_binding_failure_is_invalid_params() {
        let service = Service::new("Calc").method("Multiply", |_: &Args, _: &mut Reply| Ok(()));
        match run(&service, "Multiply", Some(WireValue::Json(json!("junk")))) {
            Err(TrampolineError::InvalidParams(err)) => {
                assert_eq!(err.code, code::INVALID_PARAMS);
            }
            _ => panic!("expected invalid params"),
        }
    }

    #[test]
    fn test_capability_flags() {
        let service = Service::new("S")
            .method("Plain", |_: &Args, _: &mut Reply| Ok(()))
            .method_with_request(
                "WithReq",
                |_req: &http::request::Parts, _: &Args, _: &mut Reply| Ok(()),
            )
            .method_with_response(
                "WithRes",
                |_req: &http::request::Parts, _res: &mut ResponseSink, _: &Args, _: &mut Reply| {
                    Ok(())
                },
            );

        assert!(!service.methods["Plain"].needs_request);
        assert!(service.methods["WithReq"].needs_request);
        assert!(!service.methods["WithReq"].needs_response);
        assert!(service.methods["WithRes"].needs_request);
        assert!(service.methods["WithRes"].needs_response);
    }

    #[test]
    fn test_response_capability_can_set_headers() {
        let service = Service::new("S").method_with_response(
            "Tag",
            |_req: &http::request::Parts, res: &mut ResponseSink, _: &Args, _: &mut Reply| {
                res.headers_mut().insert(
                    http::header::HeaderName::from_static("x-handled-by"),
                    http::header::HeaderValue::from_static("tag"),
                );
                Ok(())
            },
        );
        let parts = http_parts();
        let mut sink = ResponseSink::new();
        let mut ctx = CallContext {
            kind: WireKind::Json,
            params: None,
            request: &parts,
            response: &mut sink,
        };
        (service.methods["Tag"].trampoline)(&mut ctx).ok().unwrap();
        assert_eq!(sink.headers().get("x-handled-by").unwrap(), "tag");
    }
}
