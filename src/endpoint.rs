//! Declarative endpoints.
//!
//! An [`Endpoint`] pairs a method and path pattern with a typed handler and
//! any per-endpoint overrides. [`Endpoint::compile`] merges it with an
//! [`Engine`]'s defaults into a frozen [`CompiledEndpoint`] that a transport
//! can call concurrently.
//!
//! ```rust,ignore
//! let hello = Endpoint::new(Method::GET, "/hello/{id}", |_ctx: &RequestContext, input: Hello| {
//!     Ok(Greeting { message: format!("hello {}", input.id) })
//! })
//! .renderer("text/plain", text_renderer(plain_text));
//! engine.mount(&mut router, hello)?;
//! ```

use crate::binder::{Bindable, Binder};
use crate::config::ConfigError;
use crate::context::RequestContext;
use crate::engine::Engine;
use crate::errors::ErrorMapper;
use crate::hooks::{Enricher, ErasedHook, ErasedPolicy, Hook, Policy};
use crate::pipeline::Pipeline;
use crate::render::Renderer;
use crate::request::Request;
use crate::response::ResponseWriter;
use http::{Method, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Business logic of an endpoint: typed input in, typed output out.
pub trait Handler<I, O>: Send + Sync + 'static {
    fn handle(&self, ctx: &RequestContext, input: I) -> anyhow::Result<O>;
}

impl<I, O, F> Handler<I, O> for F
where
    F: Fn(&RequestContext, I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &RequestContext, input: I) -> anyhow::Result<O> {
        self(ctx, input)
    }
}

/// Transport-facing entry point of a compiled endpoint.
pub type CompiledHandler =
    Arc<dyn Fn(RequestContext, Request, &mut dyn ResponseWriter) + Send + Sync>;

/// An endpoint frozen against an engine's defaults.
#[derive(Clone)]
pub struct CompiledEndpoint {
    pub method: Method,
    pub path: String,
    pub handler: CompiledHandler,
}

impl CompiledEndpoint {
    /// Runs the endpoint for one request.
    pub fn call(&self, ctx: RequestContext, req: Request, w: &mut dyn ResponseWriter) {
        (self.handler)(ctx, req, w)
    }
}

impl fmt::Debug for CompiledEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledEndpoint")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Success status used when an endpoint does not set one.
pub fn default_status(method: &Method) -> StatusCode {
    match *method {
        Method::POST => StatusCode::CREATED,
        Method::DELETE => StatusCode::NO_CONTENT,
        _ => StatusCode::OK,
    }
}

/// Declaration of one endpoint.
pub struct Endpoint<I, O> {
    method: Method,
    path: String,
    handler: Arc<dyn Handler<I, O>>,
    status: Option<StatusCode>,
    binder: Option<Arc<dyn Binder>>,
    mapper: Option<Arc<ErrorMapper>>,
    renderers: Vec<(String, Renderer)>,
    default_content_type: Option<String>,
    enrichers: Vec<Arc<dyn Enricher>>,
    input_hooks: Vec<Arc<dyn Hook<I>>>,
    output_hooks: Vec<Arc<dyn Hook<O>>>,
    policies: Vec<Arc<dyn Policy<I>>>,
}

impl<I, O> Endpoint<I, O>
where
    I: Bindable + Default + Send + 'static,
    O: Serialize + Send + 'static,
{
    /// An endpoint whose handler is a closure.
    pub fn new<F>(method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(&RequestContext, I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self::with_handler(method, path, handler)
    }

    /// An endpoint whose handler is any [`Handler`] implementation.
    pub fn with_handler(method: Method, path: &str, handler: impl Handler<I, O>) -> Self {
        Self {
            method,
            path: path.to_string(),
            handler: Arc::new(handler),
            status: None,
            binder: None,
            mapper: None,
            renderers: Vec::new(),
            default_content_type: None,
            enrichers: Vec::new(),
            input_hooks: Vec::new(),
            output_hooks: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Success status; defaults to 201 for POST, 204 for DELETE, else 200.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn binder(mut self, binder: impl Binder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    pub fn mapper(mut self, mapper: Arc<ErrorMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Adds a renderer for this endpoint only.
    pub fn renderer(mut self, content_type: &str, renderer: Renderer) -> Self {
        self.renderers.push((content_type.to_string(), renderer));
        self
    }

    pub fn default_content_type(mut self, content_type: &str) -> Self {
        self.default_content_type = Some(content_type.to_string());
        self
    }

    pub fn enricher<F>(self, enricher: F) -> Self
    where
        F: Fn(RequestContext, &Request) -> anyhow::Result<RequestContext> + Send + Sync + 'static,
    {
        self.enricher_with(Arc::new(enricher))
    }

    pub fn enricher_with(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    pub fn input_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&RequestContext, &mut I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.input_hook_with(Arc::new(hook))
    }

    pub fn input_hook_with(mut self, hook: Arc<dyn Hook<I>>) -> Self {
        self.input_hooks.push(hook);
        self
    }

    pub fn output_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&RequestContext, &mut O) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.output_hook_with(Arc::new(hook))
    }

    pub fn output_hook_with(mut self, hook: Arc<dyn Hook<O>>) -> Self {
        self.output_hooks.push(hook);
        self
    }

    pub fn policy<F>(self, policy: F) -> Self
    where
        F: Fn(&RequestContext, &Request, &I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.policy_with(Arc::new(policy))
    }

    pub fn policy_with(mut self, policy: Arc<dyn Policy<I>>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Freezes this endpoint against `engine`'s current defaults.
    ///
    /// Engine renderers, hooks and loggers registered after this call do not
    /// affect the result. Fails if the effective default content type has no
    /// renderer.
    pub fn compile(self, engine: &Engine) -> Result<CompiledEndpoint, ConfigError> {
        let config_error = |reason: String| ConfigError::Endpoint {
            method: self.method.to_string(),
            path: self.path.clone(),
            reason,
        };

        let mut renderers = engine.renderers().clone();
        for (content_type, renderer) in self.renderers {
            renderers.register(&content_type, renderer);
        }
        if let Some(content_type) = &self.default_content_type {
            renderers
                .set_default(content_type)
                .map_err(|e| config_error(e.to_string()))?;
        }

        let mut enrichers = engine.enrichers().to_vec();
        enrichers.extend(self.enrichers);

        let mut input_hooks: Vec<Arc<dyn Hook<I>>> = engine
            .input_hooks()
            .iter()
            .map(|h| Arc::new(ErasedHook(Arc::clone(h))) as Arc<dyn Hook<I>>)
            .collect();
        input_hooks.extend(self.input_hooks);

        let mut output_hooks: Vec<Arc<dyn Hook<O>>> = engine
            .output_hooks()
            .iter()
            .map(|h| Arc::new(ErasedHook(Arc::clone(h))) as Arc<dyn Hook<O>>)
            .collect();
        output_hooks.extend(self.output_hooks);

        let mut policies: Vec<Arc<dyn Policy<I>>> = engine
            .policies()
            .iter()
            .map(|p| Arc::new(ErasedPolicy(Arc::clone(p))) as Arc<dyn Policy<I>>)
            .collect();
        policies.extend(self.policies);

        let pipeline = Arc::new(Pipeline {
            status: self.status.unwrap_or_else(|| default_status(&self.method)),
            method: self.method.clone(),
            path: self.path.clone(),
            handler: self.handler,
            binder: self.binder.unwrap_or_else(|| Arc::clone(engine.binder())),
            mapper: self.mapper.unwrap_or_else(|| Arc::clone(engine.mapper())),
            renderers,
            enrichers,
            input_hooks,
            output_hooks,
            policies,
            access_loggers: engine.access_loggers().to_vec(),
            settings: engine.request_settings(),
        });

        let handler: CompiledHandler = Arc::new(
            move |ctx: RequestContext, req: Request, w: &mut dyn ResponseWriter| {
                pipeline.serve(ctx, req, w)
            },
        );
        Ok(CompiledEndpoint {
            method: self.method,
            path: self.path,
            handler,
        })
    }
}
