//! The service contract.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::lifecycle::{Context, ReadySignal};
use crate::registry::Registry;

/// An independently runnable background component driven by a [`Registry`].
///
/// Every method may run concurrently with the same method of other services;
/// no ordering between services is guaranteed. Services that depend on each
/// other should resolve through the registry's values or wait on
/// [`Registry::ready_waiter`].
#[async_trait]
pub trait Service: Send + Sync {
    /// Diagnostic name. Used by [`Registry::wait_ready_by_name`].
    fn name(&self) -> String;

    /// Prepare the service without starting it. `ctx` is only valid for the
    /// duration of the call.
    async fn initialize(
        &self,
        ctx: &Context,
        registry: &Registry,
        dependency: &Dependency,
    ) -> anyhow::Result<()>;

    /// Run the service.
    ///
    /// Must fire `ready` once operational, then keep running until `ctx` is
    /// done, returning `Ok(())` on that clean stop.
    async fn start(&self, ctx: Context, ready: ReadySignal) -> anyhow::Result<()>;

    /// Release resources. Must tolerate `initialize` having failed part way
    /// and `start` never having run.
    async fn cleanup(&self, ctx: &Context, registry: &Registry) -> anyhow::Result<()>;
}

/// Handle to a registered service, returned by [`Registry::add_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceTag(pub(crate) usize);

impl ServiceTag {
    /// Registration index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Opaque, externally constructed resource handed to every `initialize`.
///
/// The registry never inspects it; services downcast to what they expect.
#[derive(Clone, Default)]
pub struct Dependency(Option<Arc<dyn Any + Send + Sync>>);

impl Dependency {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The wrapped resource, if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Dependency(..)"),
            None => f.write_str("Dependency(none)"),
        }
    }
}
