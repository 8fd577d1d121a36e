use super::plan::Source;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

/// Problem with a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name; nested fields are reported as `outer.inner`.
    pub field: String,
    pub source: Source,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.source, self.message)
    }
}

/// Every per-field problem found while binding one request.
///
/// Binding does not stop at the first bad field: a request with a missing
/// header and an unparseable query value reports both here.
#[derive(Debug, thiserror::Error)]
#[error("{}{}", .message, FieldList(.fields))]
pub struct BindError {
    message: String,
    fields: Vec<FieldError>,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

/// Renders as `: a; b` after the message, or nothing when empty.
struct FieldList<'a>(&'a [FieldError]);

impl fmt::Display for FieldList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

impl BindError {
    pub fn new(fields: Vec<FieldError>) -> Self {
        let message = match fields.len() {
            1 => "invalid request: 1 field failed to bind".to_string(),
            n => format!("invalid request: {n} fields failed to bind"),
        };
        Self {
            message,
            fields,
            cause: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.fields
    }

    /// The error for `field`, if it failed.
    pub fn field(&self, field: &str) -> Option<&FieldError> {
        self.fields.iter().find(|f| f.field == field)
    }
}

/// Fatal failures while reading a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("request body was not received within {0:?}")]
    Timeout(Duration),
    #[error("failed to read request body")]
    Read(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_field() {
        let err = BindError::new(vec![
            FieldError {
                field: "id".into(),
                source: Source::Path,
                message: "missing required value".into(),
            },
            FieldError {
                field: "limit".into(),
                source: Source::Query,
                message: "invalid u32".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("2 fields"));
        assert!(text.contains("id (path)"));
        assert!(text.contains("limit (query)"));
        assert_eq!(err.field("limit").map(|f| f.source), Some(Source::Query));
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let err = BindError::new(Vec::new())
            .with_message("body is not valid JSON")
            .with_cause(io::Error::new(io::ErrorKind::InvalidData, "eof"));
        assert_eq!(err.to_string(), "body is not valid JSON");
        assert_eq!(StdError::source(&err).map(|c| c.to_string()).as_deref(), Some("eof"));
    }
}
