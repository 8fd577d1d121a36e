//! Conversion from `may_minihttp` requests.

use crate::request::Request;
use http::Method;
use std::io::{self, Read};
use tracing::debug;

/// Converts a raw request into a [`Request`].
///
/// The body is buffered, but at most `max_body_bytes + 1` bytes are read so an
/// oversized body still reaches the binder as oversized and is rejected there.
/// Header names are lowercased.
pub fn convert_request(req: may_minihttp::Request, max_body_bytes: u64) -> io::Result<Request> {
    let method = Method::from_bytes(req.method().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut converted = Request::new(method, req.path());

    for h in req.headers().iter() {
        converted.push_header(h.name, String::from_utf8_lossy(h.value).into_owned());
    }

    let mut body = Vec::new();
    req.body()
        .take(max_body_bytes.saturating_add(1))
        .read_to_end(&mut body)?;

    debug!(
        method = %converted.method,
        path = %converted.path,
        header_count = converted.headers.len(),
        body_size_bytes = body.len(),
        "HTTP request parsed"
    );

    if !body.is_empty() {
        converted = converted.with_body(body);
    }
    Ok(converted)
}
