//! Service registry: lifecycle orchestration over a values scope.
//!
//! # Data Flow
//! ```text
//! add_service / add_controller          (registration, before start)
//!     → initialize_services(ctx, dep)   all Initialize concurrently, first error wins,
//!                                       failure → Cleanup for every service
//!     → start_services(ctx)             one Start task per service in the running group
//!     → wait_all_ready(ctx)             registration order; ready | ctx done | group failed
//!     → request_stop_services()         cancel the running context, once
//!     → wait_services()                 join the running group, cancellation is clean
//!     → cleanup_services(ctx)           all Cleanup concurrently, reset for the next round
//! ```
//!
//! # Design Decisions
//! - Out-of-order lifecycle calls are bugs in the embedding app and panic
//! - Two short-held locks: service state and the controller list; neither is
//!   held across an await or a call into a service or controller
//! - The registry is a scope in the values tree, bound under [`REGISTRY_KEY`]
//!   so code holding only a values handle can reach it

mod controller;
mod controllers;
mod initializer;
mod service;
mod services;
mod signal_service;

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::{Context, ContextError, SharedError, TaskFailure};
use crate::values::{AnyKey, ChildValues, Key, MutableValues, Value, ValueSource, Values};

pub use controller::{Controller, ServerInfo};
pub use controllers::{Endpoint, EndpointHandler, RouteMethod};
pub use initializer::Initializer;
pub use service::{Dependency, Service, ServiceTag};
pub use signal_service::{register_default_signal_listener, SignalListener};

use services::ServiceState;

/// Where every registry binds itself in its own values scope.
pub static REGISTRY_KEY: LazyLock<Key<Registry>> = LazyLock::new(|| Key::new("registry"));

/// Find the registry visible from `values`.
pub fn get_registry(values: &dyn Values) -> Option<Registry> {
    REGISTRY_KEY.cloned(values)
}

/// Lifecycle step, for errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Start,
    Cleanup,
    Register,
    Startup,
    Shutdown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "initialize",
            Phase::Start => "start",
            Phase::Cleanup => "cleanup",
            Phase::Register => "register",
            Phase::Startup => "startup",
            Phase::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// `wait_ready_by_name` matched no registered service.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Services are not running, from a non-panicking readiness wait.
    #[error("services are not running")]
    NotStarted,

    /// The caller's context ended, or the running services were stopped.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The configured readiness timeout elapsed.
    #[error("timed out waiting for service {service} to be ready")]
    ReadyTimeout { service: String },

    /// First failure of a service phase.
    #[error("service {service} failed to {phase}: {source}")]
    Service {
        service: String,
        phase: Phase,
        #[source]
        source: SharedError,
    },

    /// First failure of a controller phase.
    #[error("controller {controller} failed to {phase}: {source}")]
    Controller {
        controller: String,
        phase: Phase,
        #[source]
        source: SharedError,
    },

    /// A route table could not be applied.
    #[error("invalid route {method} {path}: {reason}")]
    Route {
        method: String,
        path: String,
        reason: String,
    },
}

impl RegistryError {
    pub(crate) fn service(failure: TaskFailure, phase: Phase) -> Self {
        RegistryError::Service {
            service: failure.task,
            phase,
            source: failure.error,
        }
    }

    pub(crate) fn controller(failure: TaskFailure, phase: Phase) -> Self {
        RegistryError::Controller {
            controller: failure.task,
            phase,
            source: failure.error,
        }
    }

    /// True if this error only reports a context ending.
    pub fn is_context(&self) -> bool {
        match self {
            RegistryError::Context(_) => true,
            RegistryError::Service { source, .. } | RegistryError::Controller { source, .. } => {
                ContextError::is_context_error(source)
            }
            _ => false,
        }
    }
}

/// Tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// How often a slow-to-become-ready warning is logged.
    pub ready_warn_interval: Duration,

    /// Give up waiting for readiness after this long. `None` waits indefinitely.
    pub ready_timeout: Option<Duration>,

    /// Deadline for the cleanup phase. Services still running past it see
    /// their context end but are awaited regardless.
    pub cleanup_timeout: Option<Duration>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ready_warn_interval: Duration::from_secs(1),
            ready_timeout: None,
            cleanup_timeout: None,
        }
    }
}

struct RegistryInner {
    name: String,
    values: ChildValues,
    options: RegistryOptions,
    svc: Mutex<ServiceState>,
    ctl: Mutex<Vec<Arc<dyn Controller>>>,
}

/// Owns services and controllers and drives them through their lifecycle.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry whose values scope is a child of `parent`.
    pub fn new(name: impl Into<String>, parent: Option<Arc<dyn Values>>) -> Self {
        Self::with_options(name, parent, RegistryOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        parent: Option<Arc<dyn Values>>,
        options: RegistryOptions,
    ) -> Self {
        let inner = Arc::new(RegistryInner {
            name: name.into(),
            values: ChildValues::new(parent, "registry"),
            options,
            svc: Mutex::new(ServiceState::default()),
            ctl: Mutex::new(Vec::new()),
        });

        // weak, or the registry would keep itself alive through its own scope
        let weak: Weak<RegistryInner> = Arc::downgrade(&inner);
        inner.values.must_bind(
            &REGISTRY_KEY,
            ValueSource::provider(move |_: &dyn Values| match weak.upgrade() {
                Some(inner) => Registry { inner },
                None => panic!("registry resolved after it was dropped"),
            }),
        );

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.inner.options
    }

    /// Run one full lifecycle round: initialize, start, wait for readiness,
    /// run until stopped, clean up.
    ///
    /// A failure anywhere after start stops the remaining services before
    /// cleanup. The first error is returned; a cleanup error is reported only
    /// when nothing failed before it. A stop requested while services are
    /// still getting ready ends the round cleanly.
    pub async fn run(&self, ctx: &Context, dependency: &Dependency) -> Result<(), RegistryError> {
        if let Err(err) = self.initialize_services(ctx, dependency).await {
            tracing::warn!(registry = %self.name(), error = %err, "App shutdown after error");
            return Err(err);
        }

        self.start_services(ctx);
        let mut result = match self.wait_all_ready(ctx).await {
            Ok(()) => {
                tracing::info!(
                    registry = %self.name(),
                    count = self.service_count(),
                    "All services ready"
                );
                let waited = self.wait_services().await;
                if let Err(err) = &waited {
                    tracing::warn!(registry = %self.name(), error = %err, "App exiting after error");
                }
                waited
            }
            Err(err) => {
                // a stop requested before everything was ready is a clean exit
                let stopping = err.is_context() && self.stop_requested();
                self.request_stop_services();
                let waited = self.wait_services().await;
                if stopping {
                    tracing::info!(registry = %self.name(), "Stopped before all services were ready");
                    waited
                } else {
                    if let Err(stop_err) = waited {
                        tracing::debug!(error = %stop_err, "Services failed while stopping after error");
                    }
                    Err(err)
                }
            }
        };

        if let Err(cleanup_err) = self.cleanup_services(ctx).await {
            tracing::error!(
                registry = %self.name(),
                error = %cleanup_err,
                "Failed to cleanup services"
            );
            if result.is_ok() {
                result = Err(cleanup_err);
            }
        }

        match &result {
            Ok(()) => tracing::info!(registry = %self.name(), "App exiting cleanly"),
            Err(_) => tracing::warn!(registry = %self.name(), "App shutdown after error"),
        }
        result
    }

    fn lock_services(&self) -> MutexGuard<'_, ServiceState> {
        self.inner.svc.lock().expect("registry service lock poisoned")
    }

    fn lock_controllers(&self) -> MutexGuard<'_, Vec<Arc<dyn Controller>>> {
        self.inner.ctl.lock().expect("registry controller lock poisoned")
    }
}

impl Values for Registry {
    fn path(&self) -> String {
        self.inner.values.path()
    }

    fn value_source(&self, key: &AnyKey) -> Option<ValueSource> {
        self.inner.values.value_source(key)
    }

    fn value(&self, key: &AnyKey) -> Option<Value> {
        self.inner.values.value(key)
    }
}

impl MutableValues for Registry {
    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool {
        self.inner.values.bind(key, source)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.inner.name)
            .field("path", &self.inner.values.path())
            .finish()
    }
}
