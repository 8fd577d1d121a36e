//! Engine-wide defaults shared by every endpoint.
//!
//! The engine owns the default binder, render registry, error mapper,
//! engine-level hooks and access loggers. It is configured once at startup;
//! endpoints compiled from it take a snapshot of those defaults.

use crate::access::{AccessLogger, TracingAccessLogger};
use crate::binder::{Bindable, Binder, JsonDecoder, ValueBinder};
use crate::config::{ConfigError, EngineConfig};
use crate::context::RequestContext;
use crate::endpoint::{CompiledEndpoint, Endpoint};
use crate::errors::ErrorMapper;
use crate::hooks::{AnyValue, Enricher, Hook, Policy};
use crate::pipeline::RequestSettings;
use crate::render::RenderRegistry;
use crate::request::Request;
use crate::router::Transport;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Engine {
    config: EngineConfig,
    binder: Arc<dyn Binder>,
    mapper: Arc<ErrorMapper>,
    renderers: RenderRegistry,
    enrichers: Vec<Arc<dyn Enricher>>,
    input_hooks: Vec<Arc<dyn Hook<AnyValue>>>,
    output_hooks: Vec<Arc<dyn Hook<AnyValue>>>,
    policies: Vec<Arc<dyn Policy<AnyValue>>>,
    access_loggers: Vec<Arc<dyn AccessLogger>>,
}

impl Engine {
    /// An engine with the standard defaults: a [`ValueBinder`] built from
    /// `config`, a JSON render registry, [`ErrorMapper::standard`] and a
    /// [`TracingAccessLogger`].
    pub fn new(config: EngineConfig) -> Self {
        let decoder = if config.strict_json {
            JsonDecoder::strict()
        } else {
            JsonDecoder::new()
        };
        let binder = ValueBinder::new()
            .with_max_body_bytes(config.max_body_bytes)
            .with_read_timeout(config.body_read_timeout())
            .with_decoder(decoder);

        let mut renderers = RenderRegistry::json();
        if let Err(err) = renderers.set_default(&config.default_content_type) {
            warn!(
                content_type = %config.default_content_type,
                error = %err,
                "default content type has no renderer yet; keeping application/json"
            );
        }

        Self {
            config,
            binder: Arc::new(binder),
            mapper: Arc::new(ErrorMapper::standard()),
            renderers,
            enrichers: Vec::new(),
            input_hooks: Vec::new(),
            output_hooks: Vec::new(),
            policies: Vec::new(),
            access_loggers: vec![Arc::new(TracingAccessLogger)],
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_binder(&mut self, binder: impl Binder + 'static) {
        self.binder = Arc::new(binder);
    }

    pub fn set_mapper(&mut self, mapper: Arc<ErrorMapper>) {
        self.mapper = mapper;
    }

    pub fn binder(&self) -> &Arc<dyn Binder> {
        &self.binder
    }

    pub fn mapper(&self) -> &Arc<ErrorMapper> {
        &self.mapper
    }

    pub fn renderers(&self) -> &RenderRegistry {
        &self.renderers
    }

    /// Engine-wide renderers; changes reach endpoints compiled afterwards.
    ///
    /// If the configured default content type could not be set at
    /// construction, it is retried when a renderer for it is registered here
    /// through [`Engine::register_renderer`].
    pub fn renderers_mut(&mut self) -> &mut RenderRegistry {
        &mut self.renderers
    }

    /// Registers an engine-wide renderer, promoting it to default when it
    /// matches the configured default content type.
    pub fn register_renderer(&mut self, content_type: &str, renderer: crate::render::Renderer) {
        self.renderers.register(content_type, renderer);
        let wanted = crate::render::normalize_content_type(&self.config.default_content_type);
        if self.renderers.default_type() != wanted && self.renderers.contains(&wanted) {
            // Registered just above, so this cannot fail.
            drop(self.renderers.set_default(&wanted));
        }
    }

    pub fn add_enricher<F>(&mut self, enricher: F)
    where
        F: Fn(RequestContext, &Request) -> anyhow::Result<RequestContext> + Send + Sync + 'static,
    {
        self.enrichers.push(Arc::new(enricher));
    }

    pub fn add_enricher_with(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    /// Input hook run for every endpoint; it sees the input as `dyn Any`.
    pub fn add_input_hook<F>(&mut self, hook: F)
    where
        F: Fn(&RequestContext, &mut AnyValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.input_hooks.push(Arc::new(hook));
    }

    pub fn add_input_hook_with(&mut self, hook: Arc<dyn Hook<AnyValue>>) {
        self.input_hooks.push(hook);
    }

    pub fn add_output_hook<F>(&mut self, hook: F)
    where
        F: Fn(&RequestContext, &mut AnyValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.output_hooks.push(Arc::new(hook));
    }

    pub fn add_output_hook_with(&mut self, hook: Arc<dyn Hook<AnyValue>>) {
        self.output_hooks.push(hook);
    }

    pub fn add_policy<F>(&mut self, policy: F)
    where
        F: Fn(&RequestContext, &Request, &AnyValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.policies.push(Arc::new(policy));
    }

    pub fn add_policy_with(&mut self, policy: Arc<dyn Policy<AnyValue>>) {
        self.policies.push(policy);
    }

    pub fn add_access_logger(&mut self, logger: impl AccessLogger + 'static) {
        self.access_loggers.push(Arc::new(logger));
    }

    pub fn clear_access_loggers(&mut self) {
        self.access_loggers.clear();
    }

    pub(crate) fn enrichers(&self) -> &[Arc<dyn Enricher>] {
        &self.enrichers
    }

    pub(crate) fn input_hooks(&self) -> &[Arc<dyn Hook<AnyValue>>] {
        &self.input_hooks
    }

    pub(crate) fn output_hooks(&self) -> &[Arc<dyn Hook<AnyValue>>] {
        &self.output_hooks
    }

    pub(crate) fn policies(&self) -> &[Arc<dyn Policy<AnyValue>>] {
        &self.policies
    }

    pub(crate) fn access_loggers(&self) -> &[Arc<dyn AccessLogger>] {
        &self.access_loggers
    }

    pub(crate) fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            request_id_header: self.config.request_id_header.to_ascii_lowercase(),
            generate_request_ids: self.config.generate_request_ids,
            request_timeout: self.config.request_timeout(),
        }
    }

    /// Compiles `endpoint` and registers it with `transport`.
    pub fn mount<T, I, O>(&self, transport: &mut T, endpoint: Endpoint<I, O>) -> Result<(), ConfigError>
    where
        T: Transport + ?Sized,
        I: Bindable + Default + Send + 'static,
        O: Serialize + Send + 'static,
    {
        let compiled: CompiledEndpoint = endpoint.compile(self)?;
        info!(method = %compiled.method, path = %compiled.path, "mounting endpoint");
        transport.handle(compiled.method, &compiled.path, compiled.handler);
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
