//! Task group with first-error cancellation.
//!
//! # Responsibilities
//! - Run named tasks concurrently under a shared cancellation token
//! - Record the first task failure and cancel every sibling when it happens
//! - Wait for all tasks, reporting the first failure (or none)
//!
//! # Design Decisions
//! - A task "fails" by returning `Err` or by panicking; both cancel the group
//! - Errors are stored as [`SharedError`] so multiple waiters can observe them
//! - `wait()` may be called from several places; only one drives the join set,
//!   the others wait for it to finish
//! - Task bodies run directly in the join set; none outlive the group

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::context::Context;

/// An `anyhow::Error` that can be cloned and handed to several observers.
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl Deref for SharedError {
    type Target = anyhow::Error;

    fn deref(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for SharedError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

/// The first failure observed in a group.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task: String,
    pub error: SharedError,
}

struct GroupInner {
    token: CancellationToken,
    first_error: Mutex<Option<TaskFailure>>,
    finished: CancellationToken,
}

impl GroupInner {
    fn record(&self, task: &str, error: anyhow::Error) {
        let mut first = self.first_error.lock().expect("task group lock poisoned");
        if first.is_none() {
            tracing::debug!(task = %task, error = %error, "Task failed, cancelling group");
            *first = Some(TaskFailure {
                task: task.to_string(),
                error: SharedError::new(error),
            });
        }
        drop(first);
        self.token.cancel();
    }

    fn first_error(&self) -> Option<TaskFailure> {
        self.first_error
            .lock()
            .expect("task group lock poisoned")
            .clone()
    }
}

/// Cancels the group and releases other waiters once the driving `wait()`
/// finishes or is dropped.
struct FinishGuard<'a>(&'a GroupInner);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.token.cancel();
        self.0.finished.cancel();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// A set of tasks sharing one derived context.
pub struct TaskGroup {
    inner: Arc<GroupInner>,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl TaskGroup {
    /// Create a group whose context is derived from `ctx`.
    ///
    /// The returned context is cancelled when `ctx` is, when any task fails,
    /// or once `wait()` returns.
    pub fn with_context(ctx: &Context) -> (TaskGroup, Context) {
        let (group_ctx, token) = ctx.with_cancel();
        let group = TaskGroup {
            inner: Arc::new(GroupInner {
                token,
                first_error: Mutex::new(None),
                finished: CancellationToken::new(),
            }),
            tasks: Mutex::new(Some(JoinSet::new())),
        };
        (group, group_ctx)
    }

    /// Run `fut` as part of the group.
    ///
    /// The task lives in the group's join set, so dropping the group or an
    /// in-progress `wait()` aborts it.
    ///
    /// # Panics
    /// Panics if called after `wait()`.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let inner = self.inner.clone();
        let mut tasks = self.tasks.lock().expect("task group lock poisoned");
        let set = tasks
            .as_mut()
            .unwrap_or_else(|| panic!("task {} spawned after the group was waited on", name));

        set.spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => inner.record(&name, err),
                Err(payload) => {
                    let err = anyhow::anyhow!("task {} panicked: {}", name, panic_message(&*payload));
                    inner.record(&name, err);
                }
            }
        });
    }

    /// Wait for every task, then cancel the group context.
    ///
    /// Returns the first failure, if any. If the waiting future is dropped
    /// early, the remaining tasks are aborted and other waiters released.
    pub async fn wait(&self) -> Option<TaskFailure> {
        let set = self.tasks.lock().expect("task group lock poisoned").take();
        match set {
            Some(mut set) => {
                let _finish = FinishGuard(&self.inner);
                while set.join_next().await.is_some() {}
            }
            None => self.inner.finished.cancelled().await,
        }
        self.inner.first_error()
    }

    /// The first failure recorded so far.
    pub fn first_error(&self) -> Option<TaskFailure> {
        self.inner.first_error()
    }

    /// Resolves once the group context is cancelled for any reason.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}
