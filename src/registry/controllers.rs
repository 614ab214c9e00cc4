//! Controller registration and hooks.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, on, MethodFilter};
use axum::Router;
use futures_util::future::BoxFuture;

use super::{Phase, Registry, RegistryError};
use crate::lifecycle::{Context, SharedError, TaskGroup};
use crate::registry::controller::{Controller, ServerInfo};

/// Type-erased request handler for [`Registry::register_map`].
pub type EndpointHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Method selector for a route table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Method(Method),
    /// Every method.
    Any,
}

/// One row of a route table.
#[derive(Clone)]
pub struct Endpoint {
    pub method: RouteMethod,
    pub path: String,
    /// `None` answers `501 Not Implemented`.
    pub handler: Option<EndpointHandler>,
}

impl Endpoint {
    pub fn new(method: RouteMethod, path: impl Into<String>, handler: Option<EndpointHandler>) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
        }
    }

    /// Wrap an async function as an [`EndpointHandler`].
    pub fn handler<F, Fut, R>(f: F) -> EndpointHandler
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            let fut = f(req);
            Box::pin(async move { fut.await.into_response() })
        })
    }
}

impl Registry {
    /// Add a controller to register against future routers.
    ///
    /// # Panics
    /// Panics if services have been started and not yet cleaned up.
    pub fn add_controller(&self, controller: Arc<dyn Controller>) {
        if self.services_running() {
            panic!("cannot add controllers after services have been started");
        }
        self.lock_controllers().push(controller);
    }

    pub fn controller_count(&self) -> usize {
        self.lock_controllers().len()
    }

    /// Let every controller add its routes, in registration order.
    pub fn register_controllers(&self, router: Router) -> Result<Router, RegistryError> {
        let controllers = self.lock_controllers().clone();
        let mut router = router;
        for controller in controllers {
            router = controller.register(self, router).map_err(|err| RegistryError::Controller {
                controller: controller.name(),
                phase: Phase::Register,
                source: SharedError::new(err),
            })?;
        }
        Ok(router)
    }

    /// Run every controller's `startup` hook concurrently.
    pub async fn start_controllers(&self, ctx: &Context, server: &ServerInfo) -> Result<(), RegistryError> {
        self.run_controller_hooks(ctx, server, Phase::Startup).await
    }

    /// Run every controller's `shutdown` hook concurrently.
    pub async fn shutdown_controllers(&self, ctx: &Context, server: &ServerInfo) -> Result<(), RegistryError> {
        self.run_controller_hooks(ctx, server, Phase::Shutdown).await
    }

    async fn run_controller_hooks(
        &self,
        ctx: &Context,
        server: &ServerInfo,
        phase: Phase,
    ) -> Result<(), RegistryError> {
        let controllers = self.lock_controllers().clone();
        let (group, group_ctx) = TaskGroup::with_context(ctx);
        for controller in controllers {
            let ctx = group_ctx.clone();
            let server = server.clone();
            group.spawn(controller.name(), async move {
                match phase {
                    Phase::Shutdown => controller.shutdown(&ctx, &server).await,
                    _ => controller.startup(&ctx, &server).await,
                }
            });
        }
        match group.wait().await {
            Some(failure) => Err(RegistryError::controller(failure, phase)),
            None => Ok(()),
        }
    }

    /// Add a table of routes under `root`.
    ///
    /// Rows are applied in order. [`RouteMethod::Any`] matches every method
    /// and rows without a handler answer `501 Not Implemented`.
    pub fn register_map(
        &self,
        router: Router,
        root: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<Router, RegistryError> {
        let mut router = router;
        for endpoint in endpoints {
            let path = join_path(root, &endpoint.path);
            let method_router = match (&endpoint.method, endpoint.handler) {
                (RouteMethod::Any, Some(handler)) => any(move |req: Request| handler(req)),
                (RouteMethod::Any, None) => any(not_implemented),
                (RouteMethod::Method(method), handler) => {
                    let filter = MethodFilter::try_from(method.clone()).map_err(|err| {
                        RegistryError::Route {
                            method: method.to_string(),
                            path: path.clone(),
                            reason: err.to_string(),
                        }
                    })?;
                    match handler {
                        Some(handler) => on(filter, move |req: Request| handler(req)),
                        None => on(filter, not_implemented),
                    }
                }
            };
            router = router.route(&path, method_router);
        }
        Ok(router)
    }
}

async fn not_implemented() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, "Not Implemented")
}

fn join_path(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (root.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => ensure_leading_slash(root),
        (false, false) => format!("{}/{}", ensure_leading_slash(root), path),
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
