//! Transport-neutral request handed to a compiled endpoint.

use http::Method;
use smallvec::SmallVec;
use std::fmt;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;

/// Maximum number of path parameters stored inline.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Maximum number of headers stored inline.
///
/// Most requests carry fewer than 16 headers, so header capture stays on the stack.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Path parameters as `(name, value)` pairs.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Headers as `(lowercase name, value)` pairs, in arrival order.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// One inbound request.
///
/// Header names are stored lowercase; lookups are case-insensitive. The body
/// is a reader that is taken at most once, by whichever stage needs it.
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub headers: HeaderVec,
    pub path_params: ParamVec,
    pub remote_addr: Option<SocketAddr>,
    body: Option<Box<dyn Read + Send>>,
}

impl Request {
    /// Builds a request from a method and a request target such as `/pets/7?tag=a`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            headers: HeaderVec::new(),
            path_params: ParamVec::new(),
            remote_addr: None,
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
    }

    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Attaches an in-memory body.
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_body_reader(Cursor::new(body.into()))
    }

    /// Attaches a streaming body.
    pub fn with_body_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Some(Box::new(reader));
        self
    }

    /// Removes the body reader; later calls return `None`.
    pub fn take_body(&mut self) -> Option<Box<dyn Read + Send>> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// First value of the header `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the path parameter `name`; the last occurrence wins.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rev()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query pairs in the order they appear.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Cookies from every `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.header_values("cookie")
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let mut parts = pair.trim().splitn(2, '=');
                let name = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let value = parts.next().unwrap_or("").trim().trim_matches('"');
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("path_params", &self.path_params)
            .field("remote_addr", &self.remote_addr)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
