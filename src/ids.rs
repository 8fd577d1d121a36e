use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Longest caller-supplied correlation id that is echoed back verbatim.
pub const MAX_CORRELATION_ID_LEN: usize = 128;

/// Strongly typed request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(RequestId(id))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// Correlation id attached to one request.
///
/// Either the caller's own id (taken from the configured request-id header)
/// or a freshly generated [`RequestId`]. Cloning is cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// A new id backed by a fresh ULID.
    pub fn generate() -> Self {
        Self(Arc::from(RequestId::new().to_string()))
    }

    /// Accepts the caller's id when it is a usable header token, otherwise generates one.
    ///
    /// A usable id is non-empty, at most [`MAX_CORRELATION_ID_LEN`] bytes and
    /// made only of visible ASCII, so echoing it back cannot split a header.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        match header_value.map(str::trim) {
            Some(v) if is_token(v) => Self(Arc::from(v)),
            _ => Self::generate(),
        }
    }

    /// The caller's id when it is usable; never generates.
    pub fn from_header(header_value: Option<&str>) -> Option<Self> {
        header_value
            .map(str::trim)
            .filter(|v| is_token(v))
            .map(|v| Self(Arc::from(v)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_CORRELATION_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_round_trips_through_text() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn caller_id_is_kept_when_it_is_a_token() {
        let id = CorrelationId::from_header_or_new(Some("req-42"));
        assert_eq!(id.as_str(), "req-42");
    }

    #[test]
    fn unusable_caller_id_is_replaced() {
        for bad in [None, Some(""), Some("has space"), Some("line\r\nbreak")] {
            let id = CorrelationId::from_header_or_new(bad);
            assert!(id.as_str().parse::<RequestId>().is_ok(), "{bad:?}");
        }
        let long = "a".repeat(MAX_CORRELATION_ID_LEN + 1);
        let id = CorrelationId::from_header_or_new(Some(&long));
        assert_ne!(id.as_str(), long);
    }
}
