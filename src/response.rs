//! Response sink written by the pipeline.

use crate::request::HeaderVec;
use http::StatusCode;
use std::io;
use std::sync::Arc;

/// Where a pipeline writes its response.
///
/// Headers must be set before [`ResponseWriter::write_status`]; the status
/// line commits the response, after which header changes are ignored.
/// Writing body bytes before a status commits `200 OK`.
pub trait ResponseWriter {
    fn set_header(&mut self, name: &str, value: &str);
    fn write_status(&mut self, status: StatusCode);
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Status committed so far, if any.
    fn status(&self) -> Option<StatusCode>;
    fn bytes_written(&self) -> usize;
}

/// In-memory [`ResponseWriter`] used by the HTTP adapter and by tests.
#[derive(Debug, Default, Clone)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderVec,
    body: Vec<u8>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    /// Body parsed as JSON, or `Value::Null` when it is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    pub fn into_parts(self) -> (Option<StatusCode>, HeaderVec, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

impl ResponseWriter for BufferedResponse {
    fn set_header(&mut self, name: &str, value: &str) {
        if self.status.is_some() {
            return;
        }
        let name = name.to_ascii_lowercase();
        if let Some(slot) = self.headers.iter_mut().find(|(k, _)| k.as_ref() == name) {
            slot.1 = value.to_string();
        } else {
            self.headers.push((Arc::from(name), value.to_string()));
        }
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(bytes);
        Ok(())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn bytes_written(&self) -> usize {
        self.body.len()
    }
}
