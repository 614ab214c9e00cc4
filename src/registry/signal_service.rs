//! Stop the registry on SIGINT / SIGTERM.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::lifecycle::{Context, ReadySignal, ShutdownSignals};
use crate::registry::service::{Dependency, Service};
use crate::registry::Registry;

/// Requests a stop of every service when a termination signal arrives.
#[derive(Default)]
pub struct SignalListener {
    registry: Mutex<Option<Registry>>,
}

impl SignalListener {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Service for SignalListener {
    fn name(&self) -> String {
        "shutdown-on-signals(SIGINT, SIGTERM)".to_string()
    }

    async fn initialize(
        &self,
        _ctx: &Context,
        registry: &Registry,
        _dependency: &Dependency,
    ) -> anyhow::Result<()> {
        *self.registry.lock().expect("signal listener lock poisoned") = Some(registry.clone());
        Ok(())
    }

    async fn start(&self, ctx: Context, ready: ReadySignal) -> anyhow::Result<()> {
        let registry = self
            .registry
            .lock()
            .expect("signal listener lock poisoned")
            .clone()
            .ok_or_else(|| anyhow::anyhow!("signal listener started before initialize"))?;

        let mut signals = ShutdownSignals::install()?;
        ready.fire();

        tokio::select! {
            received = signals.recv() => {
                let received = received?;
                tracing::info!(signal = %received, "Shutting down on signal");
                registry.request_stop_services();
                ctx.done().await;
            }
            _ = ctx.done() => {}
        }
        Ok(())
    }

    async fn cleanup(&self, _ctx: &Context, _registry: &Registry) -> anyhow::Result<()> {
        self.registry.lock().expect("signal listener lock poisoned").take();
        Ok(())
    }
}

/// Register a [`SignalListener`] with `registry`.
pub fn register_default_signal_listener(registry: &Registry) {
    registry.add_service(Arc::new(SignalListener::new()));
}
