use super::plan::Source;
use crate::request::Request;
use std::collections::HashMap;

/// Read-only view of every non-body value source of one request.
///
/// Captured once per bind so each field read is a map lookup rather than a
/// re-parse of the query string or cookie header. Repeated keys keep every
/// value in arrival order.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    path: HashMap<String, Vec<String>>,
    query: HashMap<String, Vec<String>>,
    headers: HashMap<String, Vec<String>>,
    cookies: HashMap<String, Vec<String>>,
}

fn push(map: &mut HashMap<String, Vec<String>>, key: String, value: String) {
    map.entry(key).or_default().push(value);
}

impl Snapshot {
    pub fn capture(req: &Request) -> Self {
        let mut snapshot = Self::default();
        for (name, value) in &req.path_params {
            // Later path params shadow earlier ones with the same name.
            snapshot
                .path
                .insert(name.to_string(), vec![value.clone()]);
        }
        for (name, value) in req.query_pairs() {
            push(&mut snapshot.query, name, value);
        }
        for (name, value) in &req.headers {
            push(
                &mut snapshot.headers,
                name.to_ascii_lowercase(),
                value.clone(),
            );
        }
        for (name, value) in req.cookies() {
            push(&mut snapshot.cookies, name, value);
        }
        snapshot
    }

    /// All values for `key` in `source`; header keys match case-insensitively.
    ///
    /// Always `None` for [`Source::Body`].
    pub fn values(&self, source: Source, key: &str) -> Option<&[String]> {
        let found = match source {
            Source::Path => self.path.get(key),
            Source::Query => self.query.get(key),
            Source::Header => {
                if key.bytes().any(|b| b.is_ascii_uppercase()) {
                    self.headers.get(&key.to_ascii_lowercase())
                } else {
                    self.headers.get(key)
                }
            }
            Source::Cookie => self.cookies.get(key),
            Source::Body => None,
        };
        found.map(Vec::as_slice)
    }
}
