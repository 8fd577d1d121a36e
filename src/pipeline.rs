//! The per-request state machine.
//!
//! ```text
//! Start → ContextEnrich → Bind → InputHooks → Authorize → Handle
//!       → OutputHooks → Render → Done
//! ```
//!
//! Any stage may abort. A cancellation-class abort ends the request without
//! writing anything; every other abort is mapped to a catalog entry and
//! rendered. A panic anywhere in the stages is caught once, at the runner,
//! and treated as a handler failure. Rendering the error is guarded the same
//! way: a renderer that panics again gets a plain JSON body instead, and the
//! access log is written either way.

use crate::access::{AccessEntry, AccessLogger};
use crate::binder::{Bindable, Binder};
use crate::context::{is_cancellation, RequestContext};
use crate::endpoint::Handler;
use crate::errors::ErrorMapper;
use crate::hooks::{Enricher, Hook, Policy};
use crate::ids::CorrelationId;
use crate::render::RenderRegistry;
use crate::request::Request;
use crate::response::ResponseWriter;
use http::{Method, StatusCode};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ContextEnrich,
    Bind,
    InputHooks,
    Authorize,
    Handle,
    OutputHooks,
    Render,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::ContextEnrich => "context_enrich",
            Stage::Bind => "bind",
            Stage::InputHooks => "input_hooks",
            Stage::Authorize => "authorize",
            Stage::Handle => "handle",
            Stage::OutputHooks => "output_hooks",
            Stage::Render => "render",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A panic caught while running a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panic during {stage}: {message}")]
pub struct PanicError {
    pub stage: Stage,
    pub message: String,
}

impl PanicError {
    fn from_payload(stage: Stage, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { stage, message }
    }
}

struct Abort {
    stage: Stage,
    error: anyhow::Error,
}

fn at(stage: Stage) -> impl Fn(anyhow::Error) -> Abort {
    move |error| Abort { stage, error }
}

/// Request-scoped settings the engine resolves before compilation.
#[derive(Debug, Clone)]
pub(crate) struct RequestSettings {
    pub request_id_header: String,
    pub generate_request_ids: bool,
    pub request_timeout: Option<Duration>,
}

/// Everything one compiled endpoint needs, frozen.
pub(crate) struct Pipeline<I, O> {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub handler: Arc<dyn Handler<I, O>>,
    pub binder: Arc<dyn Binder>,
    pub mapper: Arc<ErrorMapper>,
    pub renderers: RenderRegistry,
    pub enrichers: Vec<Arc<dyn Enricher>>,
    pub input_hooks: Vec<Arc<dyn Hook<I>>>,
    pub output_hooks: Vec<Arc<dyn Hook<O>>>,
    pub policies: Vec<Arc<dyn Policy<I>>>,
    pub access_loggers: Vec<Arc<dyn AccessLogger>>,
    pub settings: RequestSettings,
}

impl<I, O> Pipeline<I, O>
where
    I: Bindable + Default + Send + 'static,
    O: Serialize + Send + 'static,
{
    /// Runs one request to completion and emits its access-log entry.
    pub fn serve(&self, ctx: RequestContext, mut req: Request, w: &mut dyn ResponseWriter) {
        let started = Instant::now();
        let header_value = req.header(&self.settings.request_id_header);
        let correlation_id = if self.settings.generate_request_ids {
            Some(CorrelationId::from_header_or_new(header_value))
        } else {
            CorrelationId::from_header(header_value)
        };

        let mut ctx = ctx;
        if let Some(id) = &correlation_id {
            ctx = ctx.with_correlation_id(id.clone());
            w.set_header(&self.settings.request_id_header, id.as_str());
        }
        if let Some(timeout) = self.settings.request_timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let mut stage = Stage::Start;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(ctx.clone(), &mut req, w, &mut stage)
        }));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(abort)) => Some(abort),
            Err(payload) => {
                let panic = PanicError::from_payload(stage, payload);
                warn!(
                    request_id = correlation_id.as_ref().map(CorrelationId::as_str).unwrap_or(""),
                    method = %self.method,
                    path = %self.path,
                    stage = %stage,
                    panic_message = %panic.message,
                    "handler panicked; responding with mapped error"
                );
                Some(Abort {
                    stage,
                    error: panic.into(),
                })
            }
        };
        let terminal = failure.map(|abort| {
            let stage = abort.stage;
            match panic::catch_unwind(AssertUnwindSafe(|| self.abort(&ctx, &req, w, abort))) {
                Ok(terminal) => terminal,
                Err(payload) => {
                    let panic = PanicError::from_payload(stage, payload);
                    error!(
                        request_id = correlation_id.as_ref().map(CorrelationId::as_str).unwrap_or(""),
                        stage = %stage,
                        panic_message = %panic.message,
                        "error handling panicked; writing fallback"
                    );
                    let entry = self.mapper.default_entry();
                    let payload = serde_json::json!({ "id": entry.id, "message": entry.message });
                    write_fallback(w, entry.status, &payload);
                    panic.into()
                }
            }
        });

        let entry = AccessEntry {
            method: req.method.to_string(),
            path: req.path.clone(),
            status: w.status().map(|s| s.as_u16()),
            duration: started.elapsed(),
            bytes: w.bytes_written(),
            request_id: correlation_id.map(|id| id.as_str().to_string()),
            remote_addr: req.remote_addr.map(|a| a.to_string()),
            user_agent: req.user_agent().map(str::to_string),
            error: terminal.map(|e| format!("{e:#}")),
        };
        for logger in &self.access_loggers {
            if panic::catch_unwind(AssertUnwindSafe(|| logger.log(&entry))).is_err() {
                warn!(path = %entry.path, "access logger panicked");
            }
        }
    }

    fn run_stages(
        &self,
        ctx: RequestContext,
        req: &mut Request,
        w: &mut dyn ResponseWriter,
        stage: &mut Stage,
    ) -> Result<(), Abort> {
        let mut ctx = ctx;

        *stage = Stage::ContextEnrich;
        for enricher in &self.enrichers {
            ctx = enricher.enrich(ctx, req).map_err(at(Stage::ContextEnrich))?;
        }

        *stage = Stage::Bind;
        let mut input = I::default();
        self.binder
            .bind(&ctx, req, &mut input)
            .map_err(at(Stage::Bind))?;

        *stage = Stage::InputHooks;
        for hook in &self.input_hooks {
            hook.process(&ctx, &mut input).map_err(at(Stage::InputHooks))?;
        }

        *stage = Stage::Authorize;
        for policy in &self.policies {
            policy
                .authorize(&ctx, req, &input)
                .map_err(at(Stage::Authorize))?;
        }

        *stage = Stage::Handle;
        debug!(method = %self.method, path = %self.path, "invoking handler");
        let mut output = self.handler.handle(&ctx, input).map_err(at(Stage::Handle))?;

        *stage = Stage::OutputHooks;
        for hook in &self.output_hooks {
            hook.process(&ctx, &mut output).map_err(at(Stage::OutputHooks))?;
        }

        *stage = Stage::Render;
        let payload = serde_json::to_value(&output).map_err(|e| Abort {
            stage: Stage::Render,
            error: e.into(),
        })?;
        self.renderers
            .render(&ctx, w, req, self.status, &payload)
            .map_err(|e| Abort {
                stage: Stage::Render,
                error: e.into(),
            })?;

        *stage = Stage::Done;
        Ok(())
    }

    /// Handles an aborted request; returns the terminal error for the access log.
    fn abort(
        &self,
        ctx: &RequestContext,
        req: &Request,
        w: &mut dyn ResponseWriter,
        abort: Abort,
    ) -> anyhow::Error {
        let Abort { stage, error } = abort;
        let request_id = ctx.correlation_id().map(CorrelationId::as_str);

        if is_cancellation(&error) || ctx.is_done() {
            debug!(
                request_id = request_id.unwrap_or(""),
                stage = %stage,
                error = %error,
                "request abandoned"
            );
            return error;
        }
        if w.status().is_some() {
            warn!(
                request_id = request_id.unwrap_or(""),
                stage = %stage,
                error = %format!("{error:#}"),
                "response already committed; error not rendered"
            );
            return error;
        }

        let mapped = self.mapper.map(error);
        if mapped.status().is_server_error() {
            error!(
                request_id = request_id.unwrap_or(""),
                stage = %stage,
                catalog_id = %mapped.id(),
                status = mapped.status().as_u16(),
                error = %mapped.cause.as_ref().map(|e| format!("{e:#}")).unwrap_or_default(),
                "request failed"
            );
        } else {
            debug!(
                request_id = request_id.unwrap_or(""),
                stage = %stage,
                catalog_id = %mapped.id(),
                status = mapped.status().as_u16(),
                "request rejected"
            );
        }

        let payload = mapped.to_payload(request_id);
        match serde_json::to_value(&payload) {
            Ok(value) => {
                let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.renderers.render(ctx, w, req, mapped.status(), &value)
                }));
                match rendered {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(
                            request_id = request_id.unwrap_or(""),
                            error = %err,
                            "error renderer failed; writing JSON fallback"
                        );
                        write_fallback(w, mapped.status(), &value);
                    }
                    Err(payload) => {
                        let panic = PanicError::from_payload(Stage::Render, payload);
                        warn!(
                            request_id = request_id.unwrap_or(""),
                            panic_message = %panic.message,
                            "error renderer panicked; writing JSON fallback"
                        );
                        write_fallback(w, mapped.status(), &value);
                    }
                }
            }
            Err(err) => error!(error = %err, "failed to encode error payload"),
        }

        mapped
            .cause
            .unwrap_or_else(|| anyhow::anyhow!("request failed in {stage}"))
    }
}

fn write_fallback(w: &mut dyn ResponseWriter, status: StatusCode, payload: &serde_json::Value) {
    if w.status().is_some() {
        return;
    }
    w.set_header("content-type", crate::render::APPLICATION_JSON);
    w.write_status(status);
    if let Err(err) = w.write_body(payload.to_string().as_bytes()) {
        error!(error = %err, "failed to write error response");
    }
}
