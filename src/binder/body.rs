//! Bounded, cancellable body reads.
//!
//! The read runs on a short-lived `may` coroutine while the caller waits on a
//! `may` channel for whichever comes first: the bytes, the context being
//! cancelled, the context deadline or the read timeout. Waiting parks the
//! calling coroutine, not its worker thread. A reader that never returns is
//! abandoned rather than joined.

use super::error::BodyError;
use crate::context::{ContextError, RequestContext};
use may::coroutine;
use may::sync::mpsc::{self, RecvTimeoutError};
use std::io::{self, Read};
use std::time::{Duration, Instant};
use tracing::debug;

/// Size and time bounds for reading one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    pub max_bytes: u64,
    pub read_timeout: Duration,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            read_timeout: Duration::from_secs(10),
        }
    }
}

enum Event {
    Read(Result<Vec<u8>, BodyError>),
    Done(ContextError),
}

fn read_bounded(mut reader: Box<dyn Read + Send>, limit: u64) -> Result<Vec<u8>, BodyError> {
    let mut buf = Vec::new();
    // One byte past the limit tells "exactly at the limit" from "over it".
    reader
        .by_ref()
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(BodyError::Read)?;
    if buf.len() as u64 > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(buf)
}

/// Reads at most `limits.max_bytes` from `reader`.
///
/// A declared `content_length` above the limit fails before any byte is read.
/// Errors are [`BodyError`] or [`ContextError`], wrapped in `anyhow`.
pub fn read_body(
    ctx: &RequestContext,
    reader: Box<dyn Read + Send>,
    content_length: Option<u64>,
    limits: &BodyLimits,
) -> anyhow::Result<Vec<u8>> {
    if let Some(err) = ctx.err() {
        return Err(err.into());
    }
    if matches!(content_length, Some(len) if len > limits.max_bytes) {
        return Err(BodyError::TooLarge {
            limit: limits.max_bytes,
        }
        .into());
    }

    let (tx, rx) = mpsc::channel();
    let on_cancel = tx.clone();
    ctx.on_cancel(move |err| {
        // The receiver may already be gone once the body has been read.
        drop(on_cancel.send(Event::Done(err)));
    });

    let limit = limits.max_bytes;
    // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
    // The closure owns everything it touches and reports only through the channel,
    // so dropping the handle (abandoning the read) leaves nothing dangling.
    let spawned = unsafe {
        coroutine::Builder::new()
            .name("declarest-body".to_string())
            .spawn(move || {
                drop(tx.send(Event::Read(read_bounded(reader, limit))));
            })
    };
    spawned.map_err(BodyError::Read)?;

    let read_deadline = Instant::now() + limits.read_timeout;
    let (wait_until, expiry) = match ctx.deadline() {
        Some(deadline) if deadline <= read_deadline => (deadline, Expiry::Context),
        _ => (read_deadline, Expiry::ReadTimeout),
    };

    match rx.recv_timeout(wait_until.saturating_duration_since(Instant::now())) {
        Ok(Event::Read(result)) => Ok(result?),
        Ok(Event::Done(err)) => {
            debug!(error = %err, "body read abandoned");
            Err(err.into())
        }
        Err(RecvTimeoutError::Timeout) => match expiry {
            Expiry::Context => Err(ContextError::DeadlineExceeded.into()),
            Expiry::ReadTimeout => Err(BodyError::Timeout(limits.read_timeout).into()),
        },
        Err(RecvTimeoutError::Disconnected) => Err(BodyError::Read(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "body reader exited without a result",
        ))
        .into()),
    }
}

enum Expiry {
    Context,
    ReadTimeout,
}
