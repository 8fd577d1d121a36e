//! Access logging: one entry per request, after the response is decided.

use std::time::Duration;
use tracing::{info, warn};

/// Summary of one finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub method: String,
    pub path: String,
    /// `None` when nothing was written (cancelled requests).
    pub status: Option<u16>,
    pub duration: Duration,
    pub bytes: usize,
    pub request_id: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    /// Terminal error, if the request failed.
    pub error: Option<String>,
}

pub trait AccessLogger: Send + Sync {
    fn log(&self, entry: &AccessEntry);
}

impl<F> AccessLogger for F
where
    F: Fn(&AccessEntry) + Send + Sync,
{
    fn log(&self, entry: &AccessEntry) {
        self(entry)
    }
}

/// Writes entries as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLogger;

impl AccessLogger for TracingAccessLogger {
    fn log(&self, entry: &AccessEntry) {
        let latency_ms = entry.duration.as_secs_f64() * 1000.0;
        let status = entry.status.unwrap_or(0);
        if let Some(error) = &entry.error {
            warn!(
                method = %entry.method,
                path = %entry.path,
                status,
                latency_ms,
                bytes = entry.bytes,
                request_id = entry.request_id.as_deref().unwrap_or(""),
                remote_addr = entry.remote_addr.as_deref().unwrap_or(""),
                user_agent = entry.user_agent.as_deref().unwrap_or(""),
                error = %error,
                "request failed"
            );
        } else {
            info!(
                method = %entry.method,
                path = %entry.path,
                status,
                latency_ms,
                bytes = entry.bytes,
                request_id = entry.request_id.as_deref().unwrap_or(""),
                remote_addr = entry.remote_addr.as_deref().unwrap_or(""),
                user_agent = entry.user_agent.as_deref().unwrap_or(""),
                "request completed"
            );
        }
    }
}
