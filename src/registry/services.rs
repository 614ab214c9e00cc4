//! Service lifecycle state machine.
//!
//! ```text
//! new → initializing → initialized → starting → running → stopping → cleaning → new
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Phase, Registry, RegistryError};
use crate::lifecycle::ready::ready_slot;
use crate::lifecycle::{Context, ContextError, ReadySignal, ReadyWaiter, TaskGroup};
use crate::observability::metrics;
use crate::registry::service::{Dependency, Service, ServiceTag};

/// What a readiness wait needs, captured while the state lock is held.
struct ReadyWatch {
    tag: ServiceTag,
    name: String,
    waiter: ReadyWaiter,
    group: Arc<TaskGroup>,
}

/// Running-phase bookkeeping, present from start until cleanup.
struct Running {
    stop: CancellationToken,
    stop_requested: bool,
    group: Arc<TaskGroup>,
    started_at: Instant,
}

#[derive(Default)]
pub(super) struct ServiceState {
    services: Vec<Arc<dyn Service>>,
    readies: Vec<Arc<watch::Sender<bool>>>,
    initialized: bool,
    started: bool,
    running: Option<Running>,
}

impl Registry {
    /// Register `service` for future lifecycle rounds.
    ///
    /// # Panics
    /// Panics if services have been started and not yet cleaned up.
    pub fn add_service(&self, service: Arc<dyn Service>) -> ServiceTag {
        let mut state = self.lock_services();
        if state.running.is_some() {
            panic!("cannot add services after they have been started");
        }
        let tag = ServiceTag(state.services.len());
        state.services.push(service);
        state.readies.push(ready_slot());
        tag
    }

    /// True from start until cleanup.
    pub(super) fn services_running(&self) -> bool {
        self.lock_services().running.is_some()
    }

    pub fn service_count(&self) -> usize {
        self.lock_services().services.len()
    }

    /// Run `initialize` on every service concurrently.
    ///
    /// The first failure cancels the shared context, waits for the remaining
    /// tasks, runs `cleanup` on every service and is then returned.
    ///
    /// # Panics
    /// Panics if already initialized without an intervening cleanup.
    pub async fn initialize_services(
        &self,
        ctx: &Context,
        dependency: &Dependency,
    ) -> Result<(), RegistryError> {
        let services = {
            let state = self.lock_services();
            if state.initialized {
                panic!("cannot re-initialize services without cleanup");
            }
            state.services.clone()
        };

        tracing::info!(registry = %self.name(), count = services.len(), "Initializing services");
        let started = Instant::now();

        let (group, group_ctx) = TaskGroup::with_context(ctx);
        for service in &services {
            let service = service.clone();
            let ctx = group_ctx.clone();
            let registry = self.clone();
            let dependency = dependency.clone();
            group.spawn(service.name(), async move {
                service.initialize(&ctx, &registry, &dependency).await
            });
        }

        if let Some(failure) = group.wait().await {
            metrics::record_phase(self.name(), Phase::Initialize.as_str(), false, started.into_std());
            if let Err(cleanup_err) = self.cleanup_all(ctx, &services).await {
                tracing::error!(
                    registry = %self.name(),
                    error = %cleanup_err,
                    "Failed to cleanup after failure to initialize"
                );
            }
            return Err(RegistryError::service(failure, Phase::Initialize));
        }

        metrics::record_phase(self.name(), Phase::Initialize.as_str(), true, started.into_std());
        self.lock_services().initialized = true;
        Ok(())
    }

    pub fn services_initialized(&self) -> bool {
        self.lock_services().initialized
    }

    /// Launch `start` for every service and return without waiting.
    ///
    /// # Panics
    /// Panics if not initialized, or if services are already running.
    pub fn start_services(&self, ctx: &Context) {
        let (services, readies, group, run_ctx) = {
            let mut state = self.lock_services();
            if !state.initialized {
                panic!("cannot start services without initializing first");
            }
            if state.started || state.running.is_some() {
                panic!("cannot start services again when they are already running");
            }

            let (stop_ctx, stop) = ctx.with_cancel();
            let (group, run_ctx) = TaskGroup::with_context(&stop_ctx);
            let group = Arc::new(group);
            state.running = Some(Running {
                stop,
                stop_requested: false,
                group: group.clone(),
                started_at: Instant::now(),
            });
            state.started = true;
            (state.services.clone(), state.readies.clone(), group, run_ctx)
        };

        tracing::info!(registry = %self.name(), count = services.len(), "Starting services");
        metrics::set_services_ready(self.name(), 0);

        for (service, slot) in services.into_iter().zip(readies) {
            let name = service.name();
            let ready = ReadySignal::new(slot, name.clone());
            let ctx = run_ctx.clone();
            group.spawn(name, async move { service.start(ctx, ready).await });
        }
    }

    pub fn services_started(&self) -> bool {
        self.lock_services().started
    }

    /// Observe the readiness of one service.
    ///
    /// # Panics
    /// Panics if `tag` did not come from this registry.
    pub fn ready_waiter(&self, tag: ServiceTag) -> ReadyWaiter {
        ReadyWaiter::new(self.lock_services().readies[tag.0].subscribe())
    }

    /// Wait for every service to become ready, in registration order.
    ///
    /// # Panics
    /// Panics if services have not been started.
    pub async fn wait_all_ready(&self, ctx: &Context) -> Result<(), RegistryError> {
        let watches = self
            .ready_watches(|_| true)
            .unwrap_or_else(|| panic!("cannot wait for services to be ready until they have been started"));
        self.wait_all_watches(ctx, watches).await
    }

    /// Like [`Registry::wait_all_ready`], but reports
    /// [`RegistryError::NotStarted`] instead of panicking. For callers such as
    /// request handlers that can race a stop.
    pub async fn try_wait_all_ready(&self, ctx: &Context) -> Result<(), RegistryError> {
        let watches = self.ready_watches(|_| true).ok_or(RegistryError::NotStarted)?;
        self.wait_all_watches(ctx, watches).await
    }

    /// Wait for every service named `name` to become ready.
    ///
    /// # Panics
    /// Panics if services have not been started.
    pub async fn wait_ready_by_name(&self, ctx: &Context, name: &str) -> Result<(), RegistryError> {
        let watches = self
            .ready_watches(|service| service.name() == name)
            .unwrap_or_else(|| panic!("cannot wait for services to be ready until they have been started"));
        if watches.is_empty() {
            return Err(RegistryError::ServiceNotFound(name.to_string()));
        }
        self.wait_watches(ctx, watches).await
    }

    /// Snapshot the readiness of matching services under one state read.
    /// `None` if services are not started.
    fn ready_watches(&self, matches: impl Fn(&dyn Service) -> bool) -> Option<Vec<ReadyWatch>> {
        let state = self.lock_services();
        if !state.started {
            return None;
        }
        let group = state.running.as_ref()?.group.clone();

        let mut watches = Vec::new();
        for (index, (service, slot)) in state.services.iter().zip(&state.readies).enumerate() {
            if !matches(&**service) {
                continue;
            }
            watches.push(ReadyWatch {
                tag: ServiceTag(index),
                name: service.name(),
                waiter: ReadyWaiter::new(slot.subscribe()),
                group: group.clone(),
            });
        }
        Some(watches)
    }

    async fn wait_watches(&self, ctx: &Context, watches: Vec<ReadyWatch>) -> Result<(), RegistryError> {
        for watch in watches {
            self.wait_ready(ctx, watch).await?;
        }
        Ok(())
    }

    async fn wait_all_watches(&self, ctx: &Context, watches: Vec<ReadyWatch>) -> Result<(), RegistryError> {
        for (ready, watch) in watches.into_iter().enumerate() {
            self.wait_ready(ctx, watch).await?;
            metrics::set_services_ready(self.name(), ready + 1);
        }
        Ok(())
    }

    async fn wait_ready(&self, ctx: &Context, watch: ReadyWatch) -> Result<(), RegistryError> {
        let ReadyWatch {
            tag,
            name,
            mut waiter,
            group,
        } = watch;

        let options = self.options();
        let warn_every = options.ready_warn_interval;
        let mut tick = tokio::time::interval_at(Instant::now() + warn_every, warn_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = options.ready_timeout.map(|limit| Instant::now() + limit);
        let timed_out = async move {
            match timeout {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timed_out);

        loop {
            tokio::select! {
                biased;

                _ = waiter.wait() => return Ok(()),

                err = ctx.done() => {
                    if err == ContextError::DeadlineExceeded {
                        tracing::error!(
                            service_tag = tag.0,
                            service = %name,
                            "Timed out waiting for service to be ready"
                        );
                    }
                    return Err(err.into());
                }

                _ = group.cancelled() => {
                    return match group.first_error() {
                        Some(failure) => {
                            tracing::error!(
                                error = %failure.error,
                                service_tag = tag.0,
                                service = %name,
                                "Services failed while waiting for service to be ready"
                            );
                            Err(RegistryError::service(failure, Phase::Start))
                        }
                        None => Err(ContextError::Canceled.into()),
                    };
                }

                _ = &mut timed_out => {
                    tracing::error!(
                        service_tag = tag.0,
                        service = %name,
                        "Gave up waiting for service to be ready"
                    );
                    return Err(RegistryError::ReadyTimeout { service: name });
                }

                _ = tick.tick() => {
                    tracing::warn!(
                        service_tag = tag.0,
                        service = %name,
                        "Service is slow to get ready"
                    );
                }
            }
        }
    }

    /// Wait for every running `start` task to return.
    ///
    /// Failures caused by the stop request are a clean stop. Marks services as
    /// no longer started regardless of outcome.
    pub async fn wait_services(&self) -> Result<(), RegistryError> {
        let running = {
            let state = self.lock_services();
            state
                .running
                .as_ref()
                .map(|running| (running.group.clone(), running.started_at))
        };
        let Some((group, started_at)) = running else {
            return Ok(());
        };

        let failure = group.wait().await;
        self.lock_services().started = false;

        match failure {
            Some(failure) if !ContextError::is_context_error(&failure.error) => {
                metrics::record_phase(self.name(), Phase::Start.as_str(), false, started_at.into_std());
                Err(RegistryError::service(failure, Phase::Start))
            }
            _ => {
                metrics::record_phase(self.name(), Phase::Start.as_str(), true, started_at.into_std());
                Ok(())
            }
        }
    }

    /// True once a stop has been requested for the current round.
    pub fn stop_requested(&self) -> bool {
        self.lock_services()
            .running
            .as_ref()
            .is_some_and(|running| running.stop_requested)
    }

    /// Ask every running service to stop.
    ///
    /// A no-op if services were never initialized; only the first call after
    /// start cancels anything.
    pub fn request_stop_services(&self) {
        let mut state = self.lock_services();
        if !state.initialized {
            return;
        }
        let count = state.services.len();
        if let Some(running) = state.running.as_mut() {
            if !running.stop_requested {
                running.stop_requested = true;
                tracing::info!(registry = %self.name(), count, "Stopping services");
                metrics::record_stop_request(self.name());
                running.stop.cancel();
            }
        }
    }

    /// Run `cleanup` on every service concurrently and reset for a new round.
    ///
    /// A no-op if services were never initialized. Cancellation errors are a
    /// clean result. State is reset even when cleanup fails.
    ///
    /// # Panics
    /// Panics if services are still started.
    pub async fn cleanup_services(&self, ctx: &Context) -> Result<(), RegistryError> {
        let services = {
            let state = self.lock_services();
            if !state.initialized {
                return Ok(());
            }
            if state.started {
                panic!("cannot cleanup when services are still running");
            }
            state.services.clone()
        };

        let result = self.cleanup_all(ctx, &services).await;

        let mut state = self.lock_services();
        state.running = None;
        state.initialized = false;
        for slot in state.readies.iter_mut() {
            *slot = ready_slot();
        }
        result
    }

    async fn cleanup_all(
        &self,
        ctx: &Context,
        services: &[Arc<dyn Service>],
    ) -> Result<(), RegistryError> {
        tracing::info!(registry = %self.name(), count = services.len(), "Cleaning up services");
        let started = Instant::now();

        let ctx = match self.options().cleanup_timeout {
            Some(limit) => ctx.with_timeout(limit),
            None => ctx.clone(),
        };
        let (group, group_ctx) = TaskGroup::with_context(&ctx);
        for service in services {
            let service = service.clone();
            let ctx = group_ctx.clone();
            let registry = self.clone();
            group.spawn(service.name(), async move { service.cleanup(&ctx, &registry).await });
        }

        let result = match group.wait().await {
            Some(failure) if !ContextError::is_context_error(&failure.error) => {
                Err(RegistryError::service(failure, Phase::Cleanup))
            }
            _ => Ok(()),
        };
        metrics::record_phase(self.name(), Phase::Cleanup.as_str(), result.is_ok(), started.into_std());
        result
    }
}
