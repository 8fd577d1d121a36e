use super::request::convert_request;
use super::response::{write_json, write_response};
use crate::context::RequestContext;
use crate::engine::Engine;
use crate::errors::{ErrorMapper, Problem};
use crate::response::BufferedResponse;
use crate::router::Router;
use http::{Method, StatusCode};
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// `may_minihttp` service that dispatches through a [`Router`].
///
/// `GET /health` is answered directly. Requests that match no route get the
/// mapper's `not_found` payload.
#[derive(Clone)]
pub struct AppService {
    pub router: Arc<Router>,
    pub mapper: Arc<ErrorMapper>,
    /// Upper bound on buffered request bodies; normally the engine's limit.
    pub max_body_bytes: u64,
}

impl AppService {
    pub fn new(router: Router, engine: &Engine) -> Self {
        Self {
            router: Arc::new(router),
            mapper: Arc::clone(engine.mapper()),
            max_body_bytes: engine.config().max_body_bytes,
        }
    }

    fn write_problem(&self, res: &mut Response, problem: Problem) {
        let mapped = self.mapper.map(problem.into());
        match serde_json::to_value(mapped.to_payload(None)) {
            Ok(body) => write_json(res, mapped.status(), &body),
            Err(err) => {
                warn!(error = %err, "failed to encode error payload");
                write_json(res, mapped.status(), &serde_json::Value::Null);
            }
        }
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    write_json(res, StatusCode::OK, &serde_json::json!({ "status": "ok" }));
    Ok(())
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let req = match convert_request(req, self.max_body_bytes) {
            Ok(req) => req,
            Err(err) => {
                debug!(error = %err, "malformed request");
                self.write_problem(res, Problem::invalid(err.to_string()));
                return Ok(());
            }
        };

        if req.method == Method::GET && req.path == "/health" {
            return health_endpoint(res);
        }

        let (method, path) = (req.method.clone(), req.path.clone());
        let mut buffered = BufferedResponse::new();
        if self
            .router
            .dispatch(RequestContext::background(), req, &mut buffered)
        {
            write_response(res, buffered);
        } else {
            debug!(method = %method, path = %path, "no route");
            self.write_problem(res, Problem::not_found());
        }
        Ok(())
    }
}
