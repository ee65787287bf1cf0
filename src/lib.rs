//! # wirecall
//!
//! An RPC-over-HTTP framework with pluggable wire formats.
//!
//! One POST endpoint serves every method. Each request carries a single
//! envelope (method name, parameters, optional id); the `Content-Type`
//! header selects the codec, the method name selects the handler, and the
//! response comes back as a matching envelope in the same format.
//!
//! ## Features
//!
//! - **Explicit registration**: services are method tables built with
//!   [`Service`], not types discovered by reflection, so what is callable
//!   is exactly what was registered.
//! - **Pluggable codecs**: JSON-RPC 2.0, BSON, and MessagePack envelopes
//!   ship in the [`codec`] module; the [`codec::Codec`] trait admits more.
//! - **Typed handlers**: plain closures over `Deserialize` argument and
//!   `Serialize` reply types, with optional access to the HTTP request head
//!   and response headers.
//! - **Typed client**: [`Client`] speaks any of the wire formats, with
//!   random request ids and positional parameter encoding.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use wirecall::{JsonCodec, Server, Service};
//!
//! #[derive(Deserialize, Default)]
//! struct MultiplyArgs { a: i64, b: i64 }
//!
//! #[derive(Serialize, Default)]
//! struct MultiplyReply { result: i64 }
//!
//! #[tokio::main]
//! async fn main() -> wirecall::Result<()> {
//!     let mut server = Server::new();
//!     server.register_codec(JsonCodec::new());
//!     server.register_service(Service::new("Calc").method(
//!         "Multiply",
//!         |args: &MultiplyArgs, reply: &mut MultiplyReply| {
//!             reply.result = args.a * args.b;
//!             Ok(())
//!         },
//!     ))?;
//!
//!     let addr: std::net::SocketAddr = "127.0.0.1:4545".parse().unwrap();
//!     Arc::new(server).serve(addr).await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod server;

pub use client::{call, convert_error, null_result, Client};
pub use codec::{BsonCodec, Codec, JsonCodec, MsgPackCodec, WireKind, WireValue};
pub use error::{code, ErrorObject, Result, WirecallError};
pub use handler::{HandlerError, MethodResult, MethodStats, Service, ServiceRegistry};
pub use server::{ResponseSink, Server};
