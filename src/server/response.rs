//! Copying buffered responses onto `may_minihttp` responses.
//!
//! `may_minihttp` only accepts `&'static str` header lines. Content-type
//! lines are interned: each distinct line is leaked once and reused, and the
//! interner stops growing at [`MAX_INTERNED_HEADERS`]. Other headers are not
//! forwarded.

use crate::response::BufferedResponse;
use http::StatusCode;
use may_minihttp::Response;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::warn;

pub const MAX_INTERNED_HEADERS: usize = 256;

fn interned(line: String) -> Option<&'static str> {
    static LINES: OnceLock<Mutex<HashMap<String, &'static str>>> = OnceLock::new();
    let mut lines = LINES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(line) = lines.get(&line) {
        return Some(line);
    }
    if lines.len() >= MAX_INTERNED_HEADERS {
        return None;
    }
    let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
    lines.insert(line, leaked);
    Some(leaked)
}

/// Writes `buffered` to `res`. A response that never wrote a status becomes
/// an empty 200.
pub fn write_response(res: &mut Response, buffered: BufferedResponse) {
    let (status, headers, body) = buffered.into_parts();
    let status = status.unwrap_or(StatusCode::OK);
    res.status_code(
        status.as_u16() as usize,
        status.canonical_reason().unwrap_or("Unknown"),
    );

    if let Some((_, content_type)) = headers
        .iter()
        .rfind(|(name, _)| name.as_ref() == "content-type")
    {
        match interned(format!("Content-Type: {content_type}")) {
            Some(line) => {
                res.header(line);
            }
            None => warn!(
                content_type = %content_type,
                "header interner full; content type not sent"
            ),
        }
    }
    res.body_vec(body);
}

/// Writes a JSON body with `status`.
pub fn write_json(res: &mut Response, status: StatusCode, body: &serde_json::Value) {
    res.status_code(
        status.as_u16() as usize,
        status.canonical_reason().unwrap_or("Unknown"),
    );
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}
