//! HTTP listener service.
//!
//! # Responsibilities
//! - Resolve the listen port (config, `PORT` env, offset, random)
//! - Bind the listener during `initialize` so bind errors fail initialization
//! - Build the axum Router from the registry's controllers
//! - Wire up middleware (tracing, request ID, request metrics, scoped values)
//! - Serve until the running context is cancelled, then drain gracefully
//! - Run controller startup / shutdown hooks

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{HttpConfig, CONFIG_KEY};
use crate::http::{RequestValues, SERVER_INFO_KEY};
use crate::lifecycle::{Context, ReadySignal};
use crate::observability::metrics;
use crate::registry::{Dependency, Registry, ServerInfo, Service};
use crate::values::{ChildValues, MutableValues, ValueSource, Values};

/// Work the port from `config`, with `PORT` in the environment overriding
/// the base port. A base of `0` asks the OS for a free port.
pub fn resolve_port(config: &HttpConfig) -> anyhow::Result<u16> {
    let base = match std::env::var("PORT") {
        Ok(port) if !port.trim().is_empty() => port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid PORT {:?}", port))?,
        _ => config.port,
    };
    if base == 0 {
        return Ok(0);
    }
    base.checked_add(config.port_offset)
        .with_context(|| format!("port {} + offset {} out of range", base, config.port_offset))
}

/// State between `initialize` and `start`.
struct Bound {
    listener: TcpListener,
    router: Router,
}

/// Hosts the registry's controllers on one TCP listener.
pub struct HttpService {
    config: Option<HttpConfig>,
    requested_port: AtomicU16,
    real_port: AtomicU16,
    bound: Mutex<Option<Bound>>,
    server: Mutex<Option<ServerInfo>>,
}

impl HttpService {
    /// Use the `http` section of the config bound in the registry's values,
    /// or defaults when none is bound.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Use an explicit config.
    pub fn with_config(config: HttpConfig) -> Self {
        Self::build(Some(config))
    }

    fn build(config: Option<HttpConfig>) -> Self {
        let requested = config
            .as_ref()
            .map(|c| c.port.saturating_add(c.port_offset))
            .unwrap_or_default();
        Self {
            config,
            requested_port: AtomicU16::new(requested),
            real_port: AtomicU16::new(0),
            bound: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    /// Register a new HTTP service with `registry`.
    pub fn register(registry: &Registry, config: HttpConfig) -> crate::registry::ServiceTag {
        registry.add_service(Arc::new(Self::with_config(config)))
    }

    /// Address of the bound listener, once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server
            .lock()
            .expect("http server lock poisoned")
            .as_ref()
            .map(|info| info.local_addr)
    }

    fn resolve_config(&self, registry: &Registry) -> HttpConfig {
        match &self.config {
            Some(config) => config.clone(),
            None => CONFIG_KEY
                .value(registry)
                .map(|config| config.http.clone())
                .unwrap_or_default(),
        }
    }

    fn build_router(&self, registry: &Registry, info: &ServerInfo) -> anyhow::Result<Router> {
        let scope = ChildValues::new(Some(Arc::new(registry.clone())), info.name.clone());
        scope.must_bind(&SERVER_INFO_KEY, ValueSource::constant(info.clone()));
        let scope: Arc<dyn Values> = Arc::new(scope);

        let router = registry.register_controllers(Router::new())?;
        Ok(router
            .layer(Extension(RequestValues(scope)))
            .layer(Extension(registry.clone()))
            .layer(middleware::from_fn(track_metrics))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)))
    }
}

impl Default for HttpService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> String {
        let requested = self.requested_port.load(Ordering::Relaxed);
        let real = self.real_port.load(Ordering::Relaxed);
        if real != 0 && real != requested {
            format!("http({}={})", requested, real)
        } else {
            format!("http({})", requested)
        }
    }

    async fn initialize(
        &self,
        ctx: &Context,
        registry: &Registry,
        _dependency: &Dependency,
    ) -> anyhow::Result<()> {
        let config = self.resolve_config(registry);
        let port = resolve_port(&config)?;
        self.requested_port.store(port, Ordering::Relaxed);

        let listener = TcpListener::bind((config.bind_host.as_str(), port))
            .await
            .with_context(|| format!("failed to bind {}:{}", config.bind_host, port))?;
        let local_addr = listener.local_addr()?;
        self.real_port.store(local_addr.port(), Ordering::Relaxed);

        let info = ServerInfo {
            name: self.name(),
            local_addr,
        };
        if port == 0 {
            tracing::info!(port = local_addr.port(), "Using randomized port");
        }

        let router = self.build_router(registry, &info)?;
        *self.server.lock().expect("http server lock poisoned") = Some(info.clone());
        *self.bound.lock().expect("http server lock poisoned") = Some(Bound { listener, router });

        registry
            .start_controllers(ctx, &info)
            .await
            .context("registry startup failed")?;
        Ok(())
    }

    async fn start(&self, ctx: Context, ready: ReadySignal) -> anyhow::Result<()> {
        let Bound { listener, router } = self
            .bound
            .lock()
            .expect("http server lock poisoned")
            .take()
            .ok_or_else(|| anyhow::anyhow!("{} started without a bound listener", self.name()))?;

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, service = %self.name(), "Server is ready");
        ready.fire();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                ctx.done().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    async fn cleanup(&self, ctx: &Context, registry: &Registry) -> anyhow::Result<()> {
        // drops the listener if start never ran
        self.bound.lock().expect("http server lock poisoned").take();

        let info = self.server.lock().expect("http server lock poisoned").take();
        if let Some(info) = info {
            registry
                .shutdown_controllers(ctx, &info)
                .await
                .context("registry shutdown failed")?;
        }
        Ok(())
    }
}

/// Count requests by method and status.
async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let response = next.run(req).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), started);
    response
}
