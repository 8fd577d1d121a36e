//! # Binder Module
//!
//! Populates a typed input from one request.
//!
//! ## Overview
//!
//! An input type declares, per field, where its value comes from: a path
//! parameter, a query parameter, a header, a cookie or the decoded body.
//! `#[derive(Bind)]` turns those declarations into a static field plan;
//! [`ValueBinder`] replays the plan against a [`Snapshot`] of the request.
//!
//! ```rust,ignore
//! use declarest::Bind;
//!
//! #[derive(Default, Bind)]
//! struct ListPets {
//!     #[bind(query = "tag")]
//!     tags: Vec<String>,
//!     #[bind(query)]
//!     limit: Option<u32>,
//!     #[bind(header = "X-Tenant", required)]
//!     tenant: String,
//! }
//! ```
//!
//! ## Failure model
//!
//! - Missing required values and failed conversions are collected and
//!   returned together as one [`BindError`].
//! - Body size, read timeout, decode errors and context cancellation are
//!   fatal: binding stops and that error is returned as-is.
//! - A context that is already done when binding starts fails before any
//!   field is written.

mod body;
mod cursor;
mod decode;
mod error;
mod plan;
mod snapshot;

pub use body::{read_body, BodyLimits};
pub use cursor::{BindCursor, BodySlot};
pub use decode::{
    struct_fields, BodyDecoder, DecodeError, DecodeErrorKind, DecodeTarget, FieldTarget,
    JsonDecoder, OptionalTarget,
};
pub use error::{BindError, BodyError, FieldError};
pub use plan::{Bindable, FieldSpec, Shape, Source};
pub use snapshot::Snapshot;

use crate::context::RequestContext;
use crate::request::Request;
use std::sync::Arc;
use std::time::Duration;

/// Fills a destination from a request.
pub trait Binder: Send + Sync {
    fn bind(
        &self,
        ctx: &RequestContext,
        req: &mut Request,
        dest: &mut dyn Bindable,
    ) -> anyhow::Result<()>;
}

/// The standard [`Binder`]: declared sources, bounded body, pluggable decoder.
#[derive(Clone)]
pub struct ValueBinder {
    limits: BodyLimits,
    decoder: Arc<dyn BodyDecoder>,
}

impl ValueBinder {
    pub fn new() -> Self {
        Self {
            limits: BodyLimits::default(),
            decoder: Arc::new(JsonDecoder::new()),
        }
    }

    pub fn with_max_body_bytes(mut self, max_bytes: u64) -> Self {
        self.limits.max_bytes = max_bytes;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.limits.read_timeout = timeout;
        self
    }

    pub fn with_decoder(mut self, decoder: impl BodyDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn limits(&self) -> &BodyLimits {
        &self.limits
    }
}

impl Default for ValueBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueBinder")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Binder for ValueBinder {
    fn bind(
        &self,
        ctx: &RequestContext,
        req: &mut Request,
        dest: &mut dyn Bindable,
    ) -> anyhow::Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let snapshot = Snapshot::capture(req);
        let body = BodySlot::new(
            req.take_body(),
            req.content_length(),
            &self.limits,
            self.decoder.as_ref(),
        );
        let mut cursor = BindCursor::new(ctx, &snapshot, body);
        dest.bind_fields(&mut cursor)?;
        cursor.finish()
    }
}
