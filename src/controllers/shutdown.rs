//! Remote shutdown endpoints.

use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::Router;

use crate::registry::{Controller, Registry};

/// `POST /server/shutdown` stops every service gracefully.
/// `POST /server/kill` does the same, then exits the process if the app is
/// still alive after a grace period.
pub struct ShutdownController {
    kill_grace: Duration,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            kill_grace: Duration::from_secs(1),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ShutdownState {
    registry: Registry,
    kill_grace: Duration,
}

impl Controller for ShutdownController {
    fn name(&self) -> String {
        "shutdown".to_string()
    }

    fn register(&self, registry: &Registry, router: Router) -> anyhow::Result<Router> {
        let state = ShutdownState {
            registry: registry.clone(),
            kill_grace: self.kill_grace,
        };
        Ok(router.merge(
            Router::new()
                .route("/server/shutdown", post(handle_shutdown))
                .route("/server/kill", post(handle_kill))
                .with_state(state),
        ))
    }
}

async fn handle_shutdown(State(state): State<ShutdownState>) -> &'static str {
    tracing::info!(registry = %state.registry.name(), "Shutdown requested over HTTP");
    // in the background, so this response is still delivered while draining
    tokio::spawn(async move { state.registry.request_stop_services() });
    "Daisy, Daisy, Give me your answer, do!\n"
}

async fn handle_kill(State(state): State<ShutdownState>) -> &'static str {
    tracing::warn!(registry = %state.registry.name(), "Kill requested over HTTP");
    tokio::spawn(async move {
        state.registry.request_stop_services();
        tokio::time::sleep(state.kill_grace).await;
        tracing::info!("Forcing exit after timeout");
        std::process::exit(1);
    });
    "Goodbye cruel world!\n"
}
