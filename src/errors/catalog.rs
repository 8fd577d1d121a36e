use http::StatusCode;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog ids registered by [`ErrorCatalog::with_defaults`].
pub mod ids {
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const REQUEST_TIMEOUT: &str = "request_timeout";
}

/// A public error: stable id, HTTP status and default wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(serialize_with = "status_as_u16")]
    pub status: StatusCode,
    pub message: String,
}

fn status_as_u16<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog id must not be empty")]
    EmptyId,
    #[error("catalog entry {id:?} has status {status}, expected 400..=599")]
    StatusOutOfRange { id: String, status: u16 },
    #[error("catalog id {0:?} is already registered")]
    Duplicate(String),
    #[error("catalog id {0:?} is not registered")]
    Unknown(String),
}

fn entry(id: &str, status: StatusCode, message: &str) -> Arc<CatalogEntry> {
    Arc::new(CatalogEntry {
        id: id.to_string(),
        status,
        message: message.to_string(),
    })
}

/// The standard entries, in the order their ids are declared in [`ids`].
pub(crate) fn standard_entries() -> [Arc<CatalogEntry>; 7] {
    [
        entry(ids::INTERNAL_ERROR, StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        entry(ids::INVALID_REQUEST, StatusCode::BAD_REQUEST, "invalid request"),
        entry(ids::UNAUTHORIZED, StatusCode::UNAUTHORIZED, "unauthorized"),
        entry(ids::FORBIDDEN, StatusCode::FORBIDDEN, "forbidden"),
        entry(ids::NOT_FOUND, StatusCode::NOT_FOUND, "not found"),
        entry(ids::PAYLOAD_TOO_LARGE, StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
        entry(ids::REQUEST_TIMEOUT, StatusCode::REQUEST_TIMEOUT, "request timed out"),
    ]
}

/// Id → entry registry. Built up front, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    entries: HashMap<String, Arc<CatalogEntry>>,
}

impl ErrorCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the standard entries listed in [`ids`].
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for entry in standard_entries() {
            catalog.insert(entry);
        }
        catalog
    }

    pub(crate) fn insert(&mut self, entry: Arc<CatalogEntry>) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Adds an entry.
    ///
    /// `status` must be a 4xx or 5xx code. An empty `message` falls back to
    /// the status code's canonical reason phrase.
    pub fn register(
        &mut self,
        id: &str,
        status: u16,
        message: &str,
    ) -> Result<Arc<CatalogEntry>, CatalogError> {
        if id.is_empty() {
            return Err(CatalogError::EmptyId);
        }
        if !(400..=599).contains(&status) {
            return Err(CatalogError::StatusOutOfRange {
                id: id.to_string(),
                status,
            });
        }
        if self.entries.contains_key(id) {
            return Err(CatalogError::Duplicate(id.to_string()));
        }
        let status = StatusCode::from_u16(status).map_err(|_| CatalogError::StatusOutOfRange {
            id: id.to_string(),
            status,
        })?;
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            message.to_string()
        };
        let entry = Arc::new(CatalogEntry {
            id: id.to_string(),
            status,
            message,
        });
        self.entries.insert(id.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<CatalogEntry>> {
        self.entries.get(id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<CatalogEntry>, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::Unknown(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().map(AsRef::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_present() {
        let catalog = ErrorCatalog::with_defaults();
        for (id, status) in [
            (ids::INTERNAL_ERROR, 500),
            (ids::INVALID_REQUEST, 400),
            (ids::UNAUTHORIZED, 401),
            (ids::FORBIDDEN, 403),
            (ids::NOT_FOUND, 404),
            (ids::PAYLOAD_TOO_LARGE, 413),
            (ids::REQUEST_TIMEOUT, 408),
        ] {
            assert_eq!(catalog.get(id).unwrap().status.as_u16(), status);
        }
    }

    #[test]
    fn registration_is_validated() {
        let mut catalog = ErrorCatalog::with_defaults();
        assert_eq!(catalog.register("", 400, "x"), Err(CatalogError::EmptyId));
        assert!(matches!(
            catalog.register("teapot", 200, "x"),
            Err(CatalogError::StatusOutOfRange { status: 200, .. })
        ));
        assert!(matches!(
            catalog.register("teapot", 600, "x"),
            Err(CatalogError::StatusOutOfRange { .. })
        ));
        assert_eq!(
            catalog.register(ids::FORBIDDEN, 403, "again"),
            Err(CatalogError::Duplicate(ids::FORBIDDEN.to_string()))
        );
    }

    #[test]
    fn empty_message_uses_reason_phrase() {
        let mut catalog = ErrorCatalog::new();
        let entry = catalog.register("conflict", 409, "").unwrap();
        assert_eq!(entry.message, "Conflict");
    }
}
