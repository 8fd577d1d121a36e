//! Router core module - hot path for request routing.

use crate::context::RequestContext;
use crate::endpoint::CompiledHandler;
use crate::request::{ParamVec, Request};
use crate::response::ResponseWriter;
use http::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::radix::{RadixRouter, RouteEntry};
use super::Transport;

/// Result of successfully matching a request path to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteEntry>,
    /// Path parameters extracted from the URL, in pattern order.
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name
    ///
    /// Uses "last write wins" semantics: if duplicate parameter names exist
    /// at different path depths (e.g., `/org/{id}/team/{team_id}/user/{id}`),
    /// returns the last occurrence.
    #[inline]
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// In-process transport: a radix tree of compiled endpoints.
///
/// [`Engine::mount`](crate::Engine::mount) registers endpoints here; the
/// HTTP server (or a test) calls [`Router::dispatch`] per request.
#[derive(Clone, Default)]
pub struct Router {
    radix_router: RadixRouter,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered (method, pattern) pairs.
    pub fn len(&self) -> usize {
        self.radix_router.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radix_router.is_empty()
    }

    /// Match an HTTP request to a route.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let match_start = Instant::now();
        let result = self.radix_router.route(method, path);
        let match_duration = match_start.elapsed();

        match result {
            Some((route, path_params)) => {
                if match_duration > Duration::from_millis(1) {
                    warn!(
                        method = %method,
                        path = %path,
                        route_pattern = %route.pattern,
                        duration_us = match_duration.as_micros(),
                        "Slow route matching detected"
                    );
                } else {
                    debug!(
                        method = %method,
                        path = %path,
                        route_pattern = %route.pattern,
                        path_params = ?path_params,
                        "Route matched"
                    );
                }
                Some(RouteMatch { route, path_params })
            }
            None => {
                debug!(method = %method, path = %path, "No route matched");
                None
            }
        }
    }

    /// True when any method is registered for `path`.
    pub fn knows_path(&self, path: &str) -> bool {
        self.radix_router.matches_path(path)
    }

    /// Routes `req` and runs the matched endpoint, filling its path
    /// parameters first. Returns `false` (and writes nothing) when no route
    /// matches.
    pub fn dispatch(&self, ctx: RequestContext, mut req: Request, w: &mut dyn ResponseWriter) -> bool {
        let Some(matched) = self.route(&req.method, &req.path) else {
            return false;
        };
        req.path_params = matched.path_params;
        (matched.route.handler)(ctx, req, w);
        true
    }
}

impl Transport for Router {
    fn handle(&mut self, method: Method, pattern: &str, handler: CompiledHandler) {
        let replaced = self.radix_router.insert(RouteEntry {
            method: method.clone(),
            pattern: pattern.to_string(),
            handler,
        });
        if replaced.is_some() {
            warn!(method = %method, pattern = %pattern, "route replaced");
        } else {
            info!(
                method = %method,
                pattern = %pattern,
                routes_count = self.radix_router.len(),
                "route registered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::BufferedResponse;
    use http::StatusCode;

    fn echo_params() -> CompiledHandler {
        Arc::new(|_ctx, req: Request, w: &mut dyn ResponseWriter| {
            let joined: Vec<String> = req
                .path_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            w.write_status(StatusCode::OK);
            let _ = w.write_body(joined.join(",").as_bytes());
        })
    }

    #[test]
    fn dispatch_fills_path_params() {
        let mut router = Router::new();
        router.handle(Method::GET, "/orgs/{org}/users/{id}", echo_params());

        let mut w = BufferedResponse::new();
        let req = Request::new(Method::GET, "/orgs/acme/users/7?x=1");
        assert!(router.dispatch(RequestContext::background(), req, &mut w));
        assert_eq!(w.status(), Some(StatusCode::OK));
        assert_eq!(w.body_str(), "org=acme,id=7");
    }

    #[test]
    fn unmatched_request_writes_nothing() {
        let mut router = Router::new();
        router.handle(Method::GET, "/a", echo_params());

        let mut w = BufferedResponse::new();
        let req = Request::new(Method::GET, "/b");
        assert!(!router.dispatch(RequestContext::background(), req, &mut w));
        assert_eq!(w.status(), None);
        assert!(router.knows_path("/a"));
        assert!(!router.knows_path("/b"));
    }

    #[test]
    fn route_match_param_lookup_is_last_wins() {
        let mut router = Router::new();
        router.handle(Method::GET, "/org/{id}/user/{id}", echo_params());
        let matched = router.route(&Method::GET, "/org/1/user/2").unwrap();
        assert_eq!(matched.path_param("id"), Some("2"));
        assert_eq!(router.len(), 1);
    }
}
