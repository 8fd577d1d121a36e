//! Error catalog and mapping.
//!
//! Every failure a request can end in is reported as one catalog entry: a
//! stable id, an HTTP status and a default message. The [`ErrorMapper`]
//! decides which entry an arbitrary `anyhow::Error` becomes and what, if
//! anything, of the error's own text reaches the caller.

mod catalog;
mod mapper;
mod problem;

pub use catalog::{ids, CatalogEntry, CatalogError, ErrorCatalog};
pub use mapper::{ErrorMapper, ErrorPayload, MappedError};
pub use problem::{Describe, Problem};
