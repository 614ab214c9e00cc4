//! One-shot setup steps packaged as a service.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::lifecycle::{Context, ReadySignal};
use crate::registry::service::{Dependency, Service};
use crate::registry::Registry;

type InitFn =
    Box<dyn Fn(Context, Registry, Dependency) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type StartFn = Box<dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A service that runs simple steps at startup instead of a long-lived task.
///
/// The init step runs during `initialize`. The start step runs once per
/// round; the service reports ready when it returns, successful or not.
pub struct Initializer {
    name: String,
    init: Option<InitFn>,
    start: Option<StartFn>,
}

impl Initializer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: None,
            start: None,
        }
    }

    /// Step to run during `initialize`.
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Registry, Dependency) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.init = Some(Box::new(move |ctx, registry, dependency| {
            f(ctx, registry, dependency).boxed()
        }));
        self
    }

    /// Step to run during `start`.
    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.start = Some(Box::new(move |ctx| f(ctx).boxed()));
        self
    }
}

#[async_trait]
impl Service for Initializer {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn initialize(
        &self,
        ctx: &Context,
        registry: &Registry,
        dependency: &Dependency,
    ) -> anyhow::Result<()> {
        match &self.init {
            Some(init) => init(ctx.clone(), registry.clone(), dependency.clone()).await,
            None => Ok(()),
        }
    }

    async fn start(&self, ctx: Context, ready: ReadySignal) -> anyhow::Result<()> {
        let result = match &self.start {
            Some(start) => start(ctx).await,
            None => Ok(()),
        };
        ready.fire();
        result
    }

    async fn cleanup(&self, _ctx: &Context, _registry: &Registry) -> anyhow::Result<()> {
        Ok(())
    }
}
