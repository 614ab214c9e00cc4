//! Lifecycle integration tests.
//!
//! Drives registries of mock services through initialize, start, readiness,
//! stop and cleanup, including the failure paths.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{bounded, registry, ConcurrencyGauge, MockService};
use service_registry::registry::{Initializer, Phase};
use service_registry::{
    get_registry, Context, ContextError, Dependency, Registry, RegistryError, RegistryOptions,
};

/// Stop, join and clean up a started registry.
async fn shutdown(registry: &Registry) {
    registry.request_stop_services();
    bounded(registry.wait_services()).await.unwrap();
    bounded(registry.cleanup_services(&Context::background()))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_initialize_runs_each_service_once_concurrently() {
    let registry = registry("init");
    let gauge = Arc::new(ConcurrencyGauge::default());
    let mut counters = Vec::new();
    for name in ["a", "b", "c"] {
        let (service, c) = MockService::new(name)
            .init_gauge(gauge.clone())
            .init_delay(Duration::from_millis(50))
            .build();
        registry.add_service(service);
        counters.push(c);
    }

    bounded(registry.initialize_services(&Context::background(), &Dependency::none()))
        .await
        .unwrap();

    assert!(registry.services_initialized());
    for c in &counters {
        assert_eq!(c.initialized(), 1);
        assert_eq!(c.started(), 0);
    }
    // every initialize was in flight before the first one finished
    assert_eq!(gauge.peak(), 3);

    bounded(registry.cleanup_services(&Context::background()))
        .await
        .unwrap();
    for c in &counters {
        assert_eq!(c.cleaned(), 1);
    }
    assert!(!registry.services_initialized());
}

#[tokio::test]
async fn test_initialize_failure_cleans_up_every_service() {
    let registry = registry("init-failure");
    let (slow, slow_counters) = MockService::new("slow")
        .init_delay(Duration::from_millis(100))
        .build();
    let (broken, broken_counters) = MockService::new("broken")
        .fail_initialize("database unreachable")
        .build();
    registry.add_service(slow);
    registry.add_service(broken);

    let err = bounded(registry.initialize_services(&Context::background(), &Dependency::none()))
        .await
        .unwrap_err();

    match &err {
        RegistryError::Service { service, phase, .. } => {
            assert_eq!(service, "broken");
            assert_eq!(*phase, Phase::Initialize);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("database unreachable"));

    // the slow initialize still finished before cleanup ran
    assert_eq!(slow_counters.initialized(), 1);
    assert_eq!(slow_counters.cleaned(), 1);
    assert_eq!(broken_counters.cleaned(), 1);
    assert_eq!(slow_counters.started(), 0);
    assert!(!registry.services_initialized());
}

#[tokio::test]
#[should_panic(expected = "until they have been started")]
async fn test_wait_all_ready_before_start_panics() {
    let registry = registry("not-started");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    registry
        .initialize_services(&Context::background(), &Dependency::none())
        .await
        .unwrap();

    let _ = registry.wait_all_ready(&Context::background()).await;
}

#[tokio::test]
#[should_panic(expected = "without initializing first")]
async fn test_start_without_initialize_panics() {
    let registry = registry("not-initialized");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    registry.start_services(&Context::background());
}

#[tokio::test]
#[should_panic(expected = "without cleanup")]
async fn test_double_initialize_panics() {
    let registry = registry("double-init");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    let _ = registry.initialize_services(&ctx, &Dependency::none()).await;
}

#[tokio::test]
#[should_panic(expected = "cannot add services after they have been started")]
async fn test_add_service_after_start_panics() {
    let registry = registry("late-add");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let (late, _) = MockService::new("late").build();
    registry.add_service(late);
}

#[tokio::test]
#[should_panic(expected = "still running")]
async fn test_cleanup_while_running_panics() {
    let registry = registry("early-cleanup");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let _ = registry.cleanup_services(&ctx).await;
}

#[tokio::test]
async fn test_wait_all_ready_waits_for_slow_service() {
    let registry = registry("slow-ready");
    let (fast, _) = MockService::new("fast").build();
    let (slow, slow_counters) = MockService::new("slow")
        .ready_after(Duration::from_millis(50))
        .build();
    registry.add_service(fast);
    registry.add_service(slow);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let wait_ctx = ctx.with_timeout(Duration::from_secs(5));
    let started = Instant::now();
    bounded(registry.wait_all_ready(&wait_ctx)).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(45), "ready too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "ready too late: {elapsed:?}");
    assert_eq!(slow_counters.started(), 1);

    shutdown(&registry).await;
    assert_eq!(slow_counters.stopped(), 1);
    assert_eq!(slow_counters.cleaned(), 1);
}

#[tokio::test]
async fn test_wait_all_ready_honors_context_deadline() {
    let registry = registry("deadline");
    let (stuck, _) = MockService::new("stuck").never_ready().build();
    registry.add_service(stuck);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let err = bounded(registry.wait_all_ready(&ctx.with_timeout(Duration::from_millis(100))))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Context(ContextError::DeadlineExceeded)));
    assert!(err.is_context());

    shutdown(&registry).await;
}

#[tokio::test]
async fn test_ready_timeout_option() {
    let options = RegistryOptions {
        ready_warn_interval: Duration::from_millis(20),
        ready_timeout: Some(Duration::from_millis(100)),
        cleanup_timeout: None,
    };
    let registry = Registry::with_options("ready-timeout", None, options);
    let (stuck, _) = MockService::new("stuck").never_ready().build();
    registry.add_service(stuck);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let err = bounded(registry.wait_all_ready(&ctx)).await.unwrap_err();
    match err {
        RegistryError::ReadyTimeout { service } => assert_eq!(service, "stuck"),
        other => panic!("unexpected error: {other:?}"),
    }

    shutdown(&registry).await;
}

#[tokio::test]
async fn test_start_failure_is_reported_while_waiting_for_ready() {
    let registry = registry("start-failure");
    let (stuck, stuck_counters) = MockService::new("stuck").never_ready().build();
    let (broken, _) = MockService::new("broken").fail_start("port in use").build();
    registry.add_service(stuck);
    registry.add_service(broken);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    let err = bounded(registry.wait_all_ready(&ctx)).await.unwrap_err();
    match &err {
        RegistryError::Service { service, phase, .. } => {
            assert_eq!(service, "broken");
            assert_eq!(*phase, Phase::Start);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the failure cancelled the other service
    let waited = bounded(registry.wait_services()).await.unwrap_err();
    assert!(waited.to_string().contains("port in use"));
    assert_eq!(stuck_counters.stopped(), 1);

    bounded(registry.cleanup_services(&ctx)).await.unwrap();
    assert_eq!(stuck_counters.cleaned(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_stop_is_idempotent() {
    let registry = registry("stop-twice");
    let (a, a_counters) = MockService::new("a").build();
    let (b, b_counters) = MockService::new("b").build();
    registry.add_service(a);
    registry.add_service(b);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);
    bounded(registry.wait_all_ready(&ctx)).await.unwrap();

    assert!(!registry.stop_requested());
    registry.request_stop_services();
    registry.request_stop_services();
    assert!(registry.stop_requested());
    bounded(registry.wait_services()).await.unwrap();
    assert!(!registry.services_started());

    assert_eq!(a_counters.stopped(), 1);
    assert_eq!(b_counters.stopped(), 1);

    bounded(registry.cleanup_services(&ctx)).await.unwrap();
    // stopping after cleanup is harmless too
    registry.request_stop_services();
}

#[tokio::test]
async fn test_request_stop_before_initialize_is_noop() {
    let registry = registry("idle");
    let (service, counters) = MockService::new("a").build();
    registry.add_service(service);

    registry.request_stop_services();
    bounded(registry.wait_services()).await.unwrap();
    bounded(registry.cleanup_services(&Context::background()))
        .await
        .unwrap();

    assert_eq!(counters.initialized(), 0);
    assert_eq!(counters.cleaned(), 0);
}

#[tokio::test]
async fn test_cancellation_is_a_clean_stop() {
    let registry = registry("cancel-error");
    let (service, counters) = MockService::new("a").stop_with_cancel_error().build();
    registry.add_service(service);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);
    bounded(registry.wait_all_ready(&ctx)).await.unwrap();

    shutdown(&registry).await;
    assert_eq!(counters.stopped(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_is_reported_and_state_reset() {
    let registry = registry("cleanup-failure");
    let (ok, ok_counters) = MockService::new("ok").build();
    let (broken, _) = MockService::new("broken").fail_cleanup("flush failed").build();
    registry.add_service(ok);
    registry.add_service(broken);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);
    bounded(registry.wait_all_ready(&ctx)).await.unwrap();
    registry.request_stop_services();
    bounded(registry.wait_services()).await.unwrap();

    let err = bounded(registry.cleanup_services(&ctx)).await.unwrap_err();
    match &err {
        RegistryError::Service { service, phase, .. } => {
            assert_eq!(service, "broken");
            assert_eq!(*phase, Phase::Cleanup);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ok_counters.cleaned(), 1);
    assert!(!registry.services_initialized());
}

#[tokio::test]
async fn test_try_wait_all_ready_reports_not_started() {
    let registry = registry("try-wait");
    let (service, _) = MockService::new("a").build();
    registry.add_service(service);
    let ctx = Context::background();

    let err = registry.try_wait_all_ready(&ctx).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotStarted));

    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);
    bounded(registry.try_wait_all_ready(&ctx)).await.unwrap();

    registry.request_stop_services();
    bounded(registry.wait_services()).await.unwrap();
    // stopped but not cleaned up: no panic, just not running
    let err = registry.try_wait_all_ready(&ctx).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotStarted));

    bounded(registry.cleanup_services(&ctx)).await.unwrap();
    let err = registry.try_wait_all_ready(&ctx).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotStarted));
}

#[tokio::test]
async fn test_wait_ready_by_name() {
    let registry = registry("by-name");
    let (worker, _) = MockService::new("worker")
        .ready_after(Duration::from_millis(20))
        .build();
    let (stuck, _) = MockService::new("stuck").never_ready().build();
    registry.add_service(worker);
    registry.add_service(stuck);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    registry.start_services(&ctx);

    bounded(registry.wait_ready_by_name(&ctx, "worker")).await.unwrap();

    let err = bounded(registry.wait_ready_by_name(&ctx, "missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ServiceNotFound(ref name) if name == "missing"));

    shutdown(&registry).await;
}

#[tokio::test]
async fn test_ready_waiter_observes_one_service() {
    let registry = registry("waiter");
    let (slow, _) = MockService::new("slow")
        .ready_after(Duration::from_millis(30))
        .build();
    let tag = registry.add_service(slow);

    let ctx = Context::background();
    registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
    let mut waiter = registry.ready_waiter(tag);
    assert!(!waiter.is_ready());

    registry.start_services(&ctx);
    bounded(waiter.wait()).await;
    assert!(waiter.is_ready());

    shutdown(&registry).await;
}

#[tokio::test]
async fn test_registry_runs_a_second_round_after_cleanup() {
    let registry = registry("rounds");
    let (service, counters) = MockService::new("a")
        .ready_after(Duration::from_millis(50))
        .build();
    let tag = registry.add_service(service);
    let ctx = Context::background();

    for round in 1..=2 {
        registry.initialize_services(&ctx, &Dependency::none()).await.unwrap();
        assert!(!registry.ready_waiter(tag).is_ready(), "round {round} started ready");
        registry.start_services(&ctx);

        let started = Instant::now();
        bounded(registry.wait_all_ready(&ctx)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(45));

        shutdown(&registry).await;
        assert_eq!(counters.initialized(), round);
        assert_eq!(counters.started(), round);
        assert_eq!(counters.cleaned(), round);
    }

    // services can be added again between rounds
    let (late, _) = MockService::new("late").build();
    registry.add_service(late);
    assert_eq!(registry.service_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_full_round() {
    let registry = registry("run");
    let (a, a_counters) = MockService::new("a").build();
    let (b, b_counters) = MockService::new("b")
        .ready_after(Duration::from_millis(20))
        .build();
    registry.add_service(a);
    let tag = registry.add_service(b);

    let stopper = registry.clone();
    let mut waiter = registry.ready_waiter(tag);
    tokio::spawn(async move {
        waiter.wait().await;
        stopper.request_stop_services();
    });

    bounded(registry.run(&Context::background(), &Dependency::none()))
        .await
        .unwrap();

    for c in [&a_counters, &b_counters] {
        assert_eq!(c.initialized(), 1);
        assert_eq!(c.started(), 1);
        assert_eq!(c.stopped(), 1);
        assert_eq!(c.cleaned(), 1);
    }
    assert!(!registry.services_initialized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_stop_during_startup_is_clean() {
    let registry = registry("early-stop");
    let (fast, fast_counters) = MockService::new("fast").build();
    let (slow, slow_counters) = MockService::new("slow")
        .ready_after(Duration::from_millis(500))
        .build();
    let fast_tag = registry.add_service(fast);
    registry.add_service(slow);

    // stop once the round is running, well before "slow" is ready
    let stopper = registry.clone();
    let mut waiter = registry.ready_waiter(fast_tag);
    tokio::spawn(async move {
        waiter.wait().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.request_stop_services();
    });

    let started = Instant::now();
    bounded(registry.run(&Context::background(), &Dependency::none()))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    for c in [&fast_counters, &slow_counters] {
        assert_eq!(c.stopped(), 1);
        assert_eq!(c.cleaned(), 1);
    }
}

#[tokio::test]
async fn test_run_reports_deadline_during_startup() {
    let registry = registry("startup-deadline");
    let (stuck, counters) = MockService::new("stuck").never_ready().build();
    registry.add_service(stuck);

    let ctx = Context::background().with_timeout(Duration::from_millis(100));
    let err = bounded(registry.run(&ctx, &Dependency::none()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Context(ContextError::DeadlineExceeded)));
    assert_eq!(counters.cleaned(), 1);
}

#[tokio::test]
async fn test_run_returns_initialize_error() {
    let registry = registry("run-init-failure");
    let (a, a_counters) = MockService::new("a").build();
    let (b, _) = MockService::new("b").fail_initialize("bad config").build();
    registry.add_service(a);
    registry.add_service(b);

    let err = bounded(registry.run(&Context::background(), &Dependency::none()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("bad config"));
    assert_eq!(a_counters.started(), 0);
    assert_eq!(a_counters.cleaned(), 1);
}

#[tokio::test]
async fn test_run_stops_everything_after_start_failure() {
    let registry = registry("run-start-failure");
    let (a, a_counters) = MockService::new("a").build();
    let (b, _) = MockService::new("b").fail_start("crashed").build();
    registry.add_service(a);
    registry.add_service(b);

    let err = bounded(registry.run(&Context::background(), &Dependency::none()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("crashed"));
    assert_eq!(a_counters.stopped(), 1);
    assert_eq!(a_counters.cleaned(), 1);
}

#[tokio::test]
async fn test_initializer_runs_steps() {
    let registry = registry("initializer");
    let inits = Arc::new(AtomicUsize::new(0));
    let starts = Arc::new(AtomicUsize::new(0));

    let init_count = inits.clone();
    let start_count = starts.clone();
    let initializer = Initializer::new("setup")
        .on_initialize(move |_ctx, registry: Registry, dependency: Dependency| {
            let init_count = init_count.clone();
            async move {
                assert_eq!(registry.name(), "initializer");
                assert_eq!(dependency.downcast::<String>().as_deref().map(String::as_str), Some("db"));
                init_count.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .on_start(move |_ctx| {
            let start_count = start_count.clone();
            async move {
                start_count.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });
    registry.add_service(Arc::new(initializer));
    let (other, _) = MockService::new("other").build();
    registry.add_service(other);

    let ctx = Context::background();
    registry
        .initialize_services(&ctx, &Dependency::new("db".to_string()))
        .await
        .unwrap();
    registry.start_services(&ctx);
    bounded(registry.wait_all_ready(&ctx)).await.unwrap();

    shutdown(&registry).await;
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_is_reachable_from_values() {
    let registry = registry("lookup");
    let found = get_registry(&registry).expect("registry bound in its own scope");
    assert_eq!(found.name(), "lookup");

    let (service, _) = MockService::new("a").build();
    found.add_service(service);
    assert_eq!(registry.service_count(), 1);
}
