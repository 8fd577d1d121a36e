//! Content negotiation and response rendering.
//!
//! A [`RenderRegistry`] maps content types to renderers and always holds a
//! renderer for its default type. Each request's `Accept` header picks the
//! renderer; anything unsatisfiable falls back to the default.

use crate::context::RequestContext;
use crate::request::Request;
use crate::response::ResponseWriter;
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";

/// Serializes a payload for one content type.
///
/// `Ok(None)` writes the literal `null`.
pub type Renderer =
    Arc<dyn Fn(&RequestContext, &Value) -> anyhow::Result<Option<Vec<u8>>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no renderer registered for default content type {0:?}")]
    UnknownDefault(String),
    #[error("renderer for {content_type} failed")]
    Renderer {
        content_type: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("failed to write response body")]
    Write(#[source] io::Error),
}

/// JSON renderer used as the default.
pub fn json_renderer() -> Renderer {
    Arc::new(|_ctx: &RequestContext, payload: &Value| Ok(Some(serde_json::to_vec(payload)?)))
}

/// Renderer that writes whatever `f` returns as text.
pub fn text_renderer<F>(f: F) -> Renderer
where
    F: Fn(&Value) -> String + Send + Sync + 'static,
{
    Arc::new(move |_ctx: &RequestContext, payload: &Value| Ok(Some(f(payload).into_bytes())))
}

/// Plain-text rendering of a JSON value: strings bare, scalars via `Display`,
/// objects and arrays as compact JSON.
pub fn plain_text(payload: &Value) -> String {
    match payload {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Normalizes a content-type key: parameters dropped, trimmed, lowercased.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Media types from an `Accept` header, in order, with `*/*` moved last.
///
/// Quality values are not ranked; list order is the preference order.
pub fn parse_accept(header: &str) -> Vec<String> {
    let mut types: Vec<String> = header
        .split(',')
        .map(normalize_content_type)
        .filter(|t| !t.is_empty())
        .collect();
    if let Some(pos) = types.iter().position(|t| t == "*/*") {
        let wildcard = types.remove(pos);
        types.retain(|t| t != "*/*");
        types.push(wildcard);
    }
    types
}

/// Statuses that never carry a body.
pub fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Content type → renderer map with a guaranteed default.
#[derive(Clone)]
pub struct RenderRegistry {
    renderers: HashMap<String, Renderer>,
    default_type: String,
}

impl RenderRegistry {
    /// A registry whose default is `default_type`, rendered by `renderer`.
    pub fn new(default_type: &str, renderer: Renderer) -> Self {
        let default_type = normalize_content_type(default_type);
        let mut renderers = HashMap::new();
        renderers.insert(default_type.clone(), renderer);
        Self {
            renderers,
            default_type,
        }
    }

    /// A registry with JSON as the default.
    pub fn json() -> Self {
        Self::new(APPLICATION_JSON, json_renderer())
    }

    /// Adds or replaces the renderer for `content_type`.
    pub fn register(&mut self, content_type: &str, renderer: Renderer) {
        self.renderers
            .insert(normalize_content_type(content_type), renderer);
    }

    pub fn register_fn<F>(&mut self, content_type: &str, f: F)
    where
        F: Fn(&RequestContext, &Value) -> anyhow::Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        self.register(content_type, Arc::new(f));
    }

    /// Makes `content_type` the fallback. It must already be registered.
    pub fn set_default(&mut self, content_type: &str) -> Result<(), RenderError> {
        let key = normalize_content_type(content_type);
        if !self.renderers.contains_key(&key) {
            return Err(RenderError::UnknownDefault(key));
        }
        self.default_type = key;
        Ok(())
    }

    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    pub fn contains(&self, content_type: &str) -> bool {
        self.renderers
            .contains_key(&normalize_content_type(content_type))
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }

    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }

    /// Picks the content type and renderer for `accept`.
    ///
    /// A missing header, `*/*`, or no registered match all select the default.
    /// `None` only if the default has no renderer, which construction rules out.
    pub fn negotiate(&self, accept: Option<&str>) -> Option<(&str, &Renderer)> {
        if let Some(header) = accept {
            for media in parse_accept(header) {
                if media == "*/*" {
                    break;
                }
                if let Some((key, renderer)) = self.renderers.get_key_value(&media) {
                    return Some((key.as_str(), renderer));
                }
            }
        }
        self.renderers
            .get_key_value(&self.default_type)
            .map(|(key, renderer)| (key.as_str(), renderer))
    }

    /// Renders `payload` with `status` for `req`'s `Accept` header.
    ///
    /// Content-Type is set to the chosen key. Statuses without a body get
    /// only headers and the status line.
    pub fn render(
        &self,
        ctx: &RequestContext,
        w: &mut dyn ResponseWriter,
        req: &Request,
        status: StatusCode,
        payload: &Value,
    ) -> Result<(), RenderError> {
        let (content_type, renderer) = self
            .negotiate(req.header("accept"))
            .ok_or_else(|| RenderError::UnknownDefault(self.default_type.clone()))?;
        if !body_allowed(status) {
            w.write_status(status);
            return Ok(());
        }
        let bytes = renderer(ctx, payload).map_err(|err| RenderError::Renderer {
            content_type: content_type.to_string(),
            source: err.into(),
        })?;
        w.set_header("content-type", content_type);
        w.write_status(status);
        w.write_body(bytes.as_deref().unwrap_or(b"null"))
            .map_err(RenderError::Write)
    }
}

impl Default for RenderRegistry {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.content_types().collect();
        types.sort_unstable();
        f.debug_struct("RenderRegistry")
            .field("default_type", &self.default_type)
            .field("content_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::BufferedResponse;
    use http::Method;
    use serde_json::json;

    fn registry() -> RenderRegistry {
        let mut registry = RenderRegistry::json();
        registry.register(TEXT_PLAIN, text_renderer(plain_text));
        registry
    }

    #[test]
    fn accept_parsing_drops_params_and_demotes_wildcard() {
        assert_eq!(
            parse_accept("*/*, Text/Plain; q=0.9 , application/json"),
            vec!["text/plain", "application/json", "*/*"]
        );
        assert!(parse_accept("").is_empty());
    }

    #[test]
    fn negotiation_picks_first_registered_match() {
        let registry = registry();
        assert_eq!(registry.negotiate(Some("text/html, text/plain")).unwrap().0, TEXT_PLAIN);
        assert_eq!(registry.negotiate(Some("text/html")).unwrap().0, APPLICATION_JSON);
        assert_eq!(registry.negotiate(Some("*/*, text/plain")).unwrap().0, TEXT_PLAIN);
        assert_eq!(registry.negotiate(None).unwrap().0, APPLICATION_JSON);
    }

    #[test]
    fn registration_normalizes_and_last_write_wins() {
        let mut registry = registry();
        registry.register("TEXT/PLAIN; charset=utf-8", text_renderer(|_| "second".into()));
        assert_eq!(registry.len(), 2);

        let req = Request::new(Method::GET, "/").with_header("Accept", "text/plain");
        let mut res = BufferedResponse::new();
        registry
            .render(
                &RequestContext::background(),
                &mut res,
                &req,
                StatusCode::OK,
                &json!("x"),
            )
            .unwrap();
        assert_eq!(res.body_str(), "second");
    }

    #[test]
    fn json_rendering_preserves_the_payload() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Owner {
            name: String,
            since: Option<u16>,
        }

        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Pet {
            name: String,
            tags: Vec<String>,
            age: u8,
            weight: f64,
            owner: Owner,
        }

        let pet = Pet {
            name: "Rex \"the\" dog".into(),
            tags: vec!["good".into(), "ünïcode ✓".into()],
            age: 7,
            weight: 12.5,
            owner: Owner {
                name: "Ada".into(),
                since: None,
            },
        };
        let req = Request::new(Method::GET, "/pets/7");
        let mut res = BufferedResponse::new();
        RenderRegistry::json()
            .render(
                &RequestContext::background(),
                &mut res,
                &req,
                StatusCode::OK,
                &serde_json::to_value(&pet).unwrap(),
            )
            .unwrap();

        assert_eq!(res.header("content-type"), Some(APPLICATION_JSON));
        let decoded: Pet = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(decoded, pet);
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = registry();
        assert!(registry.set_default("application/xml").is_err());
        registry.set_default("text/plain").unwrap();
        assert_eq!(registry.default_type(), TEXT_PLAIN);
    }

    #[test]
    fn no_content_writes_no_body() {
        let req = Request::new(Method::DELETE, "/");
        let mut res = BufferedResponse::new();
        registry()
            .render(
                &RequestContext::background(),
                &mut res,
                &req,
                StatusCode::NO_CONTENT,
                &json!({"ignored": true}),
            )
            .unwrap();
        assert_eq!(res.status(), Some(StatusCode::NO_CONTENT));
        assert!(res.body().is_empty());
    }

    #[test]
    fn none_renders_null() {
        let mut registry = RenderRegistry::json();
        registry.register_fn(APPLICATION_JSON, |_, _| Ok(None));
        let req = Request::new(Method::GET, "/");
        let mut res = BufferedResponse::new();
        registry
            .render(
                &RequestContext::background(),
                &mut res,
                &req,
                StatusCode::OK,
                &json!(1),
            )
            .unwrap();
        assert_eq!(res.body_str(), "null");
    }
}
