//! The controller contract.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;

use crate::lifecycle::Context;
use crate::registry::Registry;

/// The listener a controller is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Name of the service hosting the router.
    pub name: String,
    /// Bound address.
    pub local_addr: SocketAddr,
}

/// A set of HTTP routes registered through a [`Registry`].
///
/// `register` runs once per router, in registration order. The optional
/// `startup` / `shutdown` hooks run concurrently across controllers when the
/// hosting listener starts and stops.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Diagnostic name.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("controller")
            .to_string()
    }

    /// Add routes to `router`.
    fn register(&self, registry: &Registry, router: Router) -> anyhow::Result<Router>;

    async fn startup(&self, _ctx: &Context, _server: &ServerInfo) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _ctx: &Context, _server: &ServerInfo) -> anyhow::Result<()> {
        Ok(())
    }
}
