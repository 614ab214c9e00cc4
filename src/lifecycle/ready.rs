//! Single-fire readiness signals.

use std::sync::Arc;

use tokio::sync::watch;

/// Handed to a service's `start`; firing it announces the service is ready.
///
/// Firing consumes the signal, so it can only happen once.
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
    name: String,
    fired: bool,
}

impl ReadySignal {
    pub(crate) fn new(tx: Arc<watch::Sender<bool>>, name: impl Into<String>) -> Self {
        Self {
            tx,
            name: name.into(),
            fired: false,
        }
    }

    /// Announce readiness. Wakes every waiter.
    pub fn fire(mut self) {
        self.fired = true;
        self.tx.send_replace(true);
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        if !self.fired && !std::thread::panicking() {
            tracing::debug!(service = %self.name, "Ready signal dropped without firing");
        }
    }
}

/// Observes a service's readiness.
#[derive(Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

impl ReadyWaiter {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Resolves once the service has fired its signal.
    ///
    /// Never resolves if the signal is re-armed and dropped before firing.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|ready| *ready).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Fresh, unfired slot.
pub(crate) fn ready_slot() -> Arc<watch::Sender<bool>> {
    Arc::new(watch::channel(false).0)
}
