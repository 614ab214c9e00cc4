//! Operation context: cancellation, deadline and scoped values.
//!
//! # Responsibilities
//! - Carry a cancellation token that parents propagate to children
//! - Carry an optional deadline, reported separately from cancellation
//! - Carry the values scope code running under this context should resolve from
//!
//! # Design Decisions
//! - Cheap to clone; derived contexts never affect their parent
//! - `done()` is event driven, no polling

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::values::{CachedValues, ChildValues, Values};

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context, or one of its ancestors, was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    /// True if `err` is, or was caused by, a context ending.
    pub fn is_context_error(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.downcast_ref::<ContextError>().is_some())
    }
}

/// Handle passed through lifecycle calls and into request handling.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Option<Arc<dyn Values>>,
}

impl Context {
    /// A context that is never cancelled and has no deadline or values.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: None,
        }
    }

    /// Derive a context that can be cancelled through the returned token.
    pub fn with_cancel(&self) -> (Context, CancellationToken) {
        let token = self.token.child_token();
        let ctx = Context {
            token: token.clone(),
            deadline: self.deadline,
            values: self.values.clone(),
        };
        (ctx, token)
    }

    /// Derive a context that ends `timeout` from now, or at the parent's
    /// deadline if that is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Context {
            token: self.token.child_token(),
            deadline: Some(deadline),
            values: self.values.clone(),
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ContextError::Canceled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Why the context has ended, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
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

    /// The values scope attached to this context.
    pub fn values(&self) -> Option<&Arc<dyn Values>> {
        self.values.as_ref()
    }

    /// Derive a context resolving from `values`.
    pub fn with_values(&self, values: Arc<dyn Values>) -> Context {
        Context {
            token: self.token.clone(),
            deadline: self.deadline,
            values: Some(values),
        }
    }

    /// Derive a context with a fresh child scope of the current values.
    pub fn with_child_values(&self, name: &str) -> (Context, Arc<ChildValues>) {
        let child = Arc::new(ChildValues::new(self.values.clone(), name));
        (self.with_values(child.clone()), child)
    }

    /// Derive a context with a cached view over a fresh child scope.
    pub fn with_cached_child_values(&self, name: &str) -> (Context, Arc<CachedValues>) {
        let child: Arc<dyn Values> = Arc::new(ChildValues::new(self.values.clone(), name));
        let cached = Arc::new(CachedValues::new(child));
        (self.with_values(cached.clone()), cached)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &self.values.as_ref().map(|v| v.path()))
            .finish()
    }
}
