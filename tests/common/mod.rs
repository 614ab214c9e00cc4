//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use service_registry::{Context, Dependency, ReadySignal, Registry, Service};

/// Observations made by a [`MockService`].
#[derive(Default)]
pub struct Counters {
    pub initialized: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub cleaned: AtomicUsize,
}

impl Counters {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn cleaned(&self) -> usize {
        self.cleaned.load(Ordering::SeqCst)
    }
}

/// Tracks how many initializers run at once across several services.
#[derive(Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A programmable service for lifecycle tests.
pub struct MockService {
    name: String,
    pub counters: Arc<Counters>,
    gauge: Option<Arc<ConcurrencyGauge>>,
    init_delay: Duration,
    init_error: Option<String>,
    ready_delay: Duration,
    never_ready: bool,
    start_error: Option<String>,
    cleanup_error: Option<String>,
    stop_with_cancel_error: bool,
}

impl MockService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counters: Arc::new(Counters::default()),
            gauge: None,
            init_delay: Duration::ZERO,
            init_error: None,
            ready_delay: Duration::ZERO,
            never_ready: false,
            start_error: None,
            cleanup_error: None,
            stop_with_cancel_error: false,
        }
    }

    pub fn init_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn fail_initialize(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub fn fail_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn fail_cleanup(mut self, message: &str) -> Self {
        self.cleanup_error = Some(message.to_string());
        self
    }

    /// Return the context error instead of `Ok` when stopped.
    pub fn stop_with_cancel_error(mut self) -> Self {
        self.stop_with_cancel_error = true;
        self
    }

    /// Wrap for registration, keeping a handle on the counters.
    pub fn build(self) -> (Arc<dyn Service>, Arc<Counters>) {
        let counters = self.counters.clone();
        (Arc::new(self), counters)
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn initialize(
        &self,
        _ctx: &Context,
        _registry: &Registry,
        _dependency: &Dependency,
    ) -> anyhow::Result<()> {
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        match &self.init_error {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    async fn start(&self, ctx: Context, ready: ReadySignal) -> anyhow::Result<()> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.start_error {
            return Err(anyhow::anyhow!("{}", message));
        }

        if !self.never_ready {
            if !self.ready_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.ready_delay) => {}
                    _ = ctx.done() => {
                        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                }
            }
            ready.fire();
        }

        let reason = ctx.done().await;
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        if self.stop_with_cancel_error {
            return Err(reason.into());
        }
        Ok(())
    }

    async fn cleanup(&self, _ctx: &Context, _registry: &Registry) -> anyhow::Result<()> {
        self.counters.cleaned.fetch_add(1, Ordering::SeqCst);
        match &self.cleanup_error {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}

/// A registry with no parent scope.
pub fn registry(name: &str) -> Registry {
    Registry::new(name, None)
}

/// Run `fut` with a generous upper bound so a hung lifecycle fails the test
/// instead of the whole run.
pub async fn bounded<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation timed out")
}
