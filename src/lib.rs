//! # declarest
//!
//! **declarest** turns typed Rust handlers into HTTP endpoints. An endpoint is
//! declared once (its method, path pattern, input type, output type and any
//! overrides) and compiled against an [`Engine`] into a handler that a
//! transport calls concurrently.
//!
//! ## Overview
//!
//! Every request walks the same state machine:
//!
//! ```text
//! Start → ContextEnrich → Bind → InputHooks → Authorize → Handle
//!       → OutputHooks → Render → Done
//! ```
//!
//! - **Bind** fills the input struct from path parameters, query, headers,
//!   cookies and the body, following a plan compiled by `#[derive(Bind)]`.
//!   Every field failure is collected into one [`binder::BindError`].
//! - **Render** negotiates a content type against `Accept` and writes the
//!   output through the endpoint's [`RenderRegistry`].
//! - Any failure is translated by the [`ErrorMapper`] into a catalog entry
//!   (stable id, status, public message) and rendered the same way. Panics
//!   are caught and become `internal_error`.
//!
//! ## Architecture
//!
//! - **[`binder`]** - declarative value binding and bounded body reads
//! - **[`render`]** - content negotiation and renderers
//! - **[`errors`]** - the error catalog and mapper
//! - **[`hooks`]** - enrichers, input/output hooks and policies
//! - **[`endpoint`]** / **[`engine`]** - declaration, defaults and compilation
//! - **[`pipeline`]** - the per-request state machine
//! - **[`router`]** - radix-tree transport for compiled endpoints
//! - **[`server`]** - HTTP server built on `may_minihttp`
//! - **[`config`]** / **[`telemetry`]** - YAML/env settings and logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use declarest::{Bind, Endpoint, Engine, RequestContext, Router};
//! use http::Method;
//!
//! #[derive(Default, Bind)]
//! struct Hello {
//!     #[bind(path = "id", required)]
//!     id: String,
//! }
//!
//! #[derive(serde::Serialize)]
//! struct Greeting {
//!     message: String,
//! }
//!
//! let engine = Engine::default();
//! let mut router = Router::new();
//! engine.mount(
//!     &mut router,
//!     Endpoint::new(Method::GET, "/hello/{id}", |_ctx: &RequestContext, input: Hello| {
//!         Ok(Greeting { message: format!("hello {}", input.id) })
//!     }),
//! )?;
//! ```

extern crate self as declarest;

pub mod access;
pub mod binder;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod hooks;
pub mod ids;
pub mod pipeline;
pub mod render;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod telemetry;

pub use anyhow;
pub use declarest_macros::Bind;

pub use access::{AccessEntry, AccessLogger, TracingAccessLogger};
pub use binder::{BindError, Bindable, Binder, ValueBinder};
pub use config::{ConfigError, EngineConfig, RuntimeConfig};
pub use context::{CancelHandle, ContextError, RequestContext};
pub use endpoint::{CompiledEndpoint, CompiledHandler, Endpoint, Handler};
pub use engine::Engine;
pub use errors::{ids as error_ids, Describe, ErrorCatalog, ErrorMapper, ErrorPayload, Problem};
pub use render::{RenderRegistry, Renderer};
pub use request::Request;
pub use response::{BufferedResponse, ResponseWriter};
pub use router::{Router, Transport};
