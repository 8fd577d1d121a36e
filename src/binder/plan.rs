use super::cursor::BindCursor;
use serde::Serialize;
use std::fmt;

/// Where a field's value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Body => "body",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's declared type consumes the values found for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `T`; the first value is converted.
    Scalar,
    /// `Option<T>`; set only when a value is present.
    Optional,
    /// `Vec<T>`; every value is converted, in order.
    List,
    /// `Option<Vec<T>>`.
    OptionalList,
    /// A [`Bindable`] whose fields bind with the parent's names.
    Flatten,
    /// A [`Bindable`] whose field names are reported under `parent.`.
    Nested,
}

/// One entry of a type's field plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Rust field name, used in error reports.
    pub field: &'static str,
    /// Lookup key within `source`: parameter, header or cookie name.
    pub key: &'static str,
    /// `None` for flatten/nested fields.
    pub source: Option<Source>,
    pub required: bool,
    pub shape: Shape,
    /// Declared type, as written, for conversion messages.
    pub type_name: &'static str,
}

/// A destination the binder can fill.
///
/// Normally produced by `#[derive(Bind)]`: the derive emits the field plan
/// as a `static`, computed once per type at compile time, and a
/// `bind_fields` body that replays it against a [`BindCursor`].
///
/// Fields without a binding declaration are not part of the plan and keep
/// whatever value the destination started with.
pub trait Bindable {
    /// Declared bindings, in field order.
    fn field_plan(&self) -> &'static [FieldSpec];

    /// Pulls each planned field's value out of `cursor`.
    ///
    /// Per-field problems are recorded in the cursor and reported together;
    /// an `Err` here is fatal and stops binding immediately.
    fn bind_fields(&mut self, cursor: &mut BindCursor<'_>) -> anyhow::Result<()>;
}
