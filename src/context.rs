//! Per-request context: cancellation, deadline and request-scoped values.
//!
//! A [`RequestContext`] is created by the transport for every request and
//! flows through every pipeline stage. Enrichers return a derived context
//! rather than mutating the one they were given; clones share the same
//! cancellation state, so cancelling through a [`CancelHandle`] is observed
//! by every clone.

use crate::ids::CorrelationId;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Returns true when `err` (or anything in its cause chain) is a [`ContextError`].
///
/// The engine uses this to abort a request silently instead of rendering an error.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ContextError>().is_some()
        || err
            .chain()
            .any(|cause| cause.downcast_ref::<ContextError>().is_some())
}

type CancelCallback = Box<dyn FnOnce(ContextError) + Send>;

#[derive(Default)]
struct CancelState {
    inner: Mutex<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    canceled: bool,
    callbacks: Vec<CancelCallback>,
}

impl CancelState {
    fn cancel(&self) {
        let callbacks = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.canceled {
                return;
            }
            inner.canceled = true;
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback(ContextError::Canceled);
        }
    }

    fn is_canceled(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .canceled
    }

    fn on_cancel(&self, callback: CancelCallback) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.canceled {
            drop(inner);
            callback(ContextError::Canceled);
        } else {
            inner.callbacks.push(callback);
        }
    }
}

/// Cancels every clone of the context it was created with.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.state.is_canceled())
            .finish()
    }
}

/// Cancellation signal, optional deadline, correlation id and typed values for one request.
#[derive(Clone, Default)]
pub struct RequestContext {
    cancel: Arc<CancelState>,
    deadline: Option<Instant>,
    correlation_id: Option<CorrelationId>,
    values: http::Extensions,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh context together with the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let ctx = Self::default();
        let handle = CancelHandle {
            state: Arc::clone(&ctx.cancel),
        };
        (ctx, handle)
    }

    /// Derives a context whose deadline is the earlier of `deadline` and the current one.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the context is live; otherwise why it is done.
    ///
    /// Explicit cancellation takes precedence over an elapsed deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_canceled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Runs `callback` once when the context is cancelled, immediately if it already is.
    ///
    /// Deadlines do not trigger callbacks; callers that wait should bound the
    /// wait by [`RequestContext::deadline`] themselves.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(ContextError) + Send + 'static,
    {
        self.cancel.on_cancel(Box::new(callback));
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Derives a context carrying `value`, replacing any earlier value of the same type.
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value);
        self
    }

    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("deadline", &self.deadline)
            .field("correlation_id", &self.correlation_id)
            .field("err", &self.err())
            .finish_non_exhaustive()
    }
}
