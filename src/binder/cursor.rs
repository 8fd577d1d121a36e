use super::body::{read_body, BodyLimits};
use super::decode::{BodyDecoder, FieldTarget, OptionalTarget};
use super::error::{BindError, FieldError};
use super::plan::{Bindable, FieldSpec, Source};
use super::snapshot::Snapshot;
use crate::context::RequestContext;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;

const MISSING: &str = "missing required value";

/// The request body as seen by one bind: read lazily, at most once.
pub struct BodySlot<'a> {
    state: BodyState,
    content_length: Option<u64>,
    limits: &'a BodyLimits,
    decoder: &'a dyn BodyDecoder,
}

enum BodyState {
    Unread(Option<Box<dyn Read + Send>>),
    Loaded(Vec<u8>),
}

impl<'a> BodySlot<'a> {
    pub fn new(
        reader: Option<Box<dyn Read + Send>>,
        content_length: Option<u64>,
        limits: &'a BodyLimits,
        decoder: &'a dyn BodyDecoder,
    ) -> Self {
        Self {
            state: BodyState::Unread(reader),
            content_length,
            limits,
            decoder,
        }
    }

    fn load(&mut self, ctx: &RequestContext) -> anyhow::Result<&[u8]> {
        if let BodyState::Unread(reader) = &mut self.state {
            let bytes = match reader.take() {
                Some(reader) => read_body(ctx, reader, self.content_length, self.limits)?,
                None => Vec::new(),
            };
            self.state = BodyState::Loaded(bytes);
        }
        match &self.state {
            BodyState::Loaded(bytes) => Ok(bytes),
            BodyState::Unread(_) => Ok(&[]),
        }
    }
}

/// Replays a field plan against one request.
///
/// Conversion failures and missing required values are collected and turned
/// into a single [`BindError`] by [`BindCursor::finish`]. Body and context
/// failures are fatal and surface as `Err` from the body methods.
pub struct BindCursor<'a> {
    ctx: &'a RequestContext,
    snapshot: &'a Snapshot,
    body: BodySlot<'a>,
    prefix: String,
    errors: Vec<FieldError>,
}

impl<'a> BindCursor<'a> {
    pub fn new(ctx: &'a RequestContext, snapshot: &'a Snapshot, body: BodySlot<'a>) -> Self {
        Self {
            ctx,
            snapshot,
            body,
            prefix: String::new(),
            errors: Vec::new(),
        }
    }

    pub fn context(&self) -> &RequestContext {
        self.ctx
    }

    /// Records a problem with `spec`'s field.
    pub fn fail(&mut self, spec: &FieldSpec, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: format!("{}{}", self.prefix, spec.field),
            source: spec.source.unwrap_or(Source::Body),
            message: message.into(),
        });
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Values present for `spec`, or `None` after noting a missing required one.
    fn lookup(&mut self, spec: &FieldSpec) -> Option<&'a [String]> {
        let snapshot = self.snapshot;
        let found = spec
            .source
            .and_then(|source| snapshot.values(source, spec.key))
            .filter(|values| !values.is_empty());
        if found.is_none() && spec.required {
            self.fail(spec, MISSING);
        }
        found
    }

    fn convert<T>(&mut self, spec: &FieldSpec, raw: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                self.fail(
                    spec,
                    format!("cannot convert {raw:?} to {}: {err}", spec.type_name),
                );
                None
            }
        }
    }

    fn convert_all<T>(&mut self, spec: &FieldSpec, values: &[String]) -> Option<Vec<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        let mut out = Vec::with_capacity(values.len());
        for (index, raw) in values.iter().enumerate() {
            match raw.parse::<T>() {
                Ok(value) => out.push(value),
                Err(err) => {
                    self.fail(
                        spec,
                        format!(
                            "cannot convert {raw:?} at position {index} to {}: {err}",
                            spec.type_name
                        ),
                    );
                    return None;
                }
            }
        }
        Some(out)
    }

    /// `T` field: converts the first value present.
    pub fn scalar<T>(&mut self, spec: &FieldSpec, dest: &mut T)
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(values) = self.lookup(spec) else {
            return;
        };
        if let Some(value) = self.convert(spec, &values[0]) {
            *dest = value;
        }
    }

    /// `Option<T>` field: set only when a value is present.
    pub fn optional<T>(&mut self, spec: &FieldSpec, dest: &mut Option<T>)
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(values) = self.lookup(spec) else {
            return;
        };
        if let Some(value) = self.convert(spec, &values[0]) {
            *dest = Some(value);
        }
    }

    /// `Vec<T>` field: every value, in request order.
    pub fn list<T>(&mut self, spec: &FieldSpec, dest: &mut Vec<T>)
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(values) = self.lookup(spec) else {
            return;
        };
        if let Some(converted) = self.convert_all(spec, values) {
            *dest = converted;
        }
    }

    pub fn optional_list<T>(&mut self, spec: &FieldSpec, dest: &mut Option<Vec<T>>)
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(values) = self.lookup(spec) else {
            return;
        };
        if let Some(converted) = self.convert_all(spec, values) {
            *dest = Some(converted);
        }
    }

    /// Decodes the body into `dest`. An empty body leaves `dest` untouched.
    pub fn body<T: DeserializeOwned>(&mut self, spec: &FieldSpec, dest: &mut T) -> anyhow::Result<()> {
        let decoder = self.body.decoder;
        let bytes = self.body.load(self.ctx)?;
        if bytes.is_empty() {
            if spec.required {
                self.fail(spec, MISSING);
            }
            return Ok(());
        }
        decoder.decode(bytes, &mut FieldTarget(dest))?;
        Ok(())
    }

    pub fn optional_body<T: DeserializeOwned>(
        &mut self,
        spec: &FieldSpec,
        dest: &mut Option<T>,
    ) -> anyhow::Result<()> {
        let decoder = self.body.decoder;
        let bytes = self.body.load(self.ctx)?;
        if bytes.is_empty() {
            if spec.required {
                self.fail(spec, MISSING);
            }
            return Ok(());
        }
        decoder.decode(bytes, &mut OptionalTarget(dest))?;
        Ok(())
    }

    /// Binds `dest`'s own plan under the parent's names.
    pub fn flatten<B: Bindable>(&mut self, _spec: &FieldSpec, dest: &mut B) -> anyhow::Result<()> {
        dest.bind_fields(self)
    }

    /// Binds `dest`'s own plan, reporting its fields as `parent.child`.
    pub fn nested<B: Bindable>(&mut self, spec: &FieldSpec, dest: &mut B) -> anyhow::Result<()> {
        let restore = self.prefix.len();
        self.prefix.push_str(spec.field);
        self.prefix.push('.');
        let result = dest.bind_fields(self);
        self.prefix.truncate(restore);
        result
    }

    /// Ends the bind: `Err(BindError)` if any field failed.
    pub fn finish(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BindError::new(self.errors).into())
        }
    }
}
