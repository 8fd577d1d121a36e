use super::catalog::ids;
use crate::binder::BindError;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// What an error is willing to say about itself on the wire.
///
/// The mapper asks every describable error in a chain; the first non-empty
/// answer for each question wins. Errors that do not implement this, or are
/// not registered with the mapper, only ever surface their catalog entry's
/// default message.
pub trait Describe {
    /// Catalog id this error maps to.
    fn catalog_id(&self) -> Option<&str> {
        None
    }

    /// Replacement for the catalog entry's default message.
    fn public_message(&self) -> Option<String> {
        None
    }

    /// Extra data safe to show the caller.
    fn public_data(&self) -> Option<Value> {
        None
    }
}

/// An error that names its catalog entry and what it may reveal.
///
/// ```rust,ignore
/// return Err(Problem::new("pet_not_found")
///     .with_message(format!("no pet {id}"))
///     .with_data(json!({ "id": id }))
///     .into());
/// ```
#[derive(Debug)]
pub struct Problem {
    id: Option<Cow<'static, str>>,
    message: Option<String>,
    data: Option<Value>,
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl Problem {
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: Some(id.into()),
            message: None,
            data: None,
            cause: None,
        }
    }

    /// A problem that only overrides the message; the catalog entry comes from elsewhere.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            id: None,
            message: Some(message.into()),
            data: None,
            cause: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ids::INVALID_REQUEST).with_message(message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ids::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(ids::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::new(ids::NOT_FOUND)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches public data; values that fail to serialize are dropped.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.message) {
            (Some(id), Some(message)) => write!(f, "{id}: {message}"),
            (Some(id), None) => f.write_str(id),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("problem"),
        }
    }
}

impl StdError for Problem {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }
}

impl Describe for Problem {
    fn catalog_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn public_message(&self) -> Option<String> {
        self.message.clone()
    }

    fn public_data(&self) -> Option<Value> {
        self.data.clone()
    }
}

impl Describe for BindError {
    /// The per-field report is the caller's own input, so it is public.
    fn public_data(&self) -> Option<Value> {
        serde_json::to_value(self.fields())
            .ok()
            .map(|fields| serde_json::json!({ "fields": fields }))
    }
}
