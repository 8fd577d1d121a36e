//! # Configuration Module
//!
//! Engine and runtime settings, loaded from YAML and/or environment variables.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `DECLAREST_MAX_BODY_BYTES` | [`EngineConfig::max_body_bytes`] | `1048576` |
//! | `DECLAREST_BODY_READ_TIMEOUT_MS` | [`EngineConfig::body_read_timeout_ms`] | `10000` |
//! | `DECLAREST_STRICT_JSON` | [`EngineConfig::strict_json`] | `false` |
//! | `DECLAREST_REQUEST_ID_HEADER` | [`EngineConfig::request_id_header`] | `x-request-id` |
//! | `DECLAREST_GENERATE_REQUEST_IDS` | [`EngineConfig::generate_request_ids`] | `true` |
//! | `DECLAREST_DEFAULT_CONTENT_TYPE` | [`EngineConfig::default_content_type`] | `application/json` |
//! | `DECLAREST_REQUEST_TIMEOUT_MS` | [`EngineConfig::request_timeout_ms`] | unset |
//! | `DECLAREST_STACK_SIZE` | [`RuntimeConfig::stack_size`] | `0x8000` |
//!
//! Unparseable values are logged and ignored, leaving the previous value.
//!
//! ## YAML
//!
//! ```yaml
//! max_body_bytes: 65536
//! strict_json: true
//! request_timeout_ms: 5000
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML")]
    Yaml(#[from] serde_yaml::Error),
    #[error("endpoint {method} {path}: {reason}")]
    Endpoint {
        method: String,
        path: String,
        reason: String,
    },
}

/// Engine-wide defaults applied to every endpoint that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest accepted request body.
    pub max_body_bytes: u64,
    /// How long the binder waits for a body before giving up.
    pub body_read_timeout_ms: u64,
    /// Reject unknown members and trailing data in JSON bodies.
    pub strict_json: bool,
    /// Header carrying the caller's correlation id; echoed on responses.
    pub request_id_header: String,
    /// Generate a correlation id when the caller sent none.
    pub generate_request_ids: bool,
    /// Fallback response content type. Must have a registered renderer.
    pub default_content_type: String,
    /// Per-request deadline; unset means no deadline.
    pub request_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            body_read_timeout_ms: 10_000,
            strict_json: false,
            request_id_header: "x-request-id".to_string(),
            generate_request_ids: true,
            default_content_type: crate::render::APPLICATION_JSON.to_string(),
            request_timeout_ms: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn apply<T>(slot: &mut T, var: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) {
    let Some(raw) = raw else {
        return;
    };
    match parse(&raw) {
        Some(value) => *slot = value,
        None => warn!(var, value = %raw, "ignoring unparseable configuration value"),
    }
}

impl EngineConfig {
    /// Defaults overridden by `DECLAREST_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_with(|key| env::var(key).ok());
        config
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        apply(
            &mut self.max_body_bytes,
            "DECLAREST_MAX_BODY_BYTES",
            lookup("DECLAREST_MAX_BODY_BYTES"),
            |v| v.trim().parse().ok(),
        );
        apply(
            &mut self.body_read_timeout_ms,
            "DECLAREST_BODY_READ_TIMEOUT_MS",
            lookup("DECLAREST_BODY_READ_TIMEOUT_MS"),
            |v| v.trim().parse().ok(),
        );
        apply(
            &mut self.strict_json,
            "DECLAREST_STRICT_JSON",
            lookup("DECLAREST_STRICT_JSON"),
            parse_bool,
        );
        apply(
            &mut self.request_id_header,
            "DECLAREST_REQUEST_ID_HEADER",
            lookup("DECLAREST_REQUEST_ID_HEADER"),
            |v| Some(v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty()),
        );
        apply(
            &mut self.generate_request_ids,
            "DECLAREST_GENERATE_REQUEST_IDS",
            lookup("DECLAREST_GENERATE_REQUEST_IDS"),
            parse_bool,
        );
        apply(
            &mut self.default_content_type,
            "DECLAREST_DEFAULT_CONTENT_TYPE",
            lookup("DECLAREST_DEFAULT_CONTENT_TYPE"),
            |v| Some(v.trim().to_string()).filter(|v| !v.is_empty()),
        );
        apply(
            &mut self.request_timeout_ms,
            "DECLAREST_REQUEST_TIMEOUT_MS",
            lookup("DECLAREST_REQUEST_TIMEOUT_MS"),
            // 0 disables the deadline.
            |v| v.trim().parse::<u64>().ok().map(|ms| Some(ms).filter(|ms| *ms > 0)),
        );
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads a YAML file, then applies environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_with(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_millis(self.body_read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Coroutine runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for request coroutines in bytes (default 32 KB / `0x8000`).
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { stack_size: 0x8000 }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply(
            &mut config.stack_size,
            "DECLAREST_STACK_SIZE",
            env::var("DECLAREST_STACK_SIZE").ok(),
            parse_size,
        );
        config
    }

    /// Configures the `may` scheduler. Call once, before the server starts.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("DECLAREST_MAX_BODY_BYTES", "16"),
            ("DECLAREST_STRICT_JSON", "yes"),
            ("DECLAREST_REQUEST_ID_HEADER", "X-Correlation-Id"),
            ("DECLAREST_BODY_READ_TIMEOUT_MS", "soon"),
            ("DECLAREST_REQUEST_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config.apply_env_with(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_body_bytes, 16);
        assert!(config.strict_json);
        assert_eq!(config.request_id_header, "x-correlation-id");
        assert_eq!(config.body_read_timeout_ms, 10_000);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_request_timeout_disables_it() {
        let mut config = EngineConfig {
            request_timeout_ms: Some(5),
            ..EngineConfig::default()
        };
        config.apply_env_with(|k| (k == "DECLAREST_REQUEST_TIMEOUT_MS").then(|| "0".to_string()));
        assert_eq!(config.request_timeout_ms, None);
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = EngineConfig::from_yaml_str("max_body_bytes: 64\nstrict_json: true\n").unwrap();
        assert_eq!(config.max_body_bytes, 64);
        assert!(config.strict_json);
        assert_eq!(config.request_id_header, "x-request-id");
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "body_read_timeout_ms: 1500").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.body_read_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn stack_size_accepts_hex_and_decimal() {
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("big"), None);
    }
}
