//! # Router Module
//!
//! Path matching for compiled endpoints.
//!
//! ## Overview
//!
//! [`Transport`] is the seam between the engine and whatever receives
//! requests: [`Engine::mount`](crate::Engine::mount) compiles an endpoint and
//! hands its method, pattern and handler to a transport. [`Router`] is the
//! built-in transport, a radix tree that the HTTP server and in-process tests
//! dispatch through.
//!
//! Patterns use `{name}` segments for path parameters:
//!
//! ```rust,ignore
//! let mut router = Router::new();
//! engine.mount(&mut router, Endpoint::new(Method::GET, "/pets/{id}", get_pet))?;
//!
//! if let Some(m) = router.route(&Method::GET, "/pets/123") {
//!     assert_eq!(m.path_param("id"), Some("123"));
//! }
//! ```
//!
//! ## Performance
//!
//! Matching is O(k) in the number of path segments. Static segments win over
//! parameters at the same depth.

mod core;
mod radix;

pub use core::{RouteMatch, Router};
pub use radix::RouteEntry;

use crate::endpoint::CompiledHandler;
use http::Method;

/// Anything that can accept compiled endpoints.
pub trait Transport {
    /// Registers `handler` for `method` requests whose path matches `pattern`.
    fn handle(&mut self, method: Method, pattern: &str, handler: CompiledHandler);
}
