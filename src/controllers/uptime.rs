//! Uptime and readiness endpoint.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::lifecycle::Context;
use crate::registry::{Controller, Registry, RegistryError};

/// `GET /` answers once every service is ready; `GET /slow?delay=ms` does the
/// same after sleeping, for exercising graceful shutdown.
pub struct UptimeController {
    version: String,
    start_time: OnceLock<SystemTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeReport {
    /// Seconds since the unix epoch at which the controller was registered.
    pub start_time: u64,
    pub uptime_seconds: u64,
    pub version: String,
}

#[derive(Clone)]
struct UptimeState {
    registry: Registry,
    version: String,
    start_time: SystemTime,
}

impl UptimeController {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            start_time: OnceLock::new(),
        }
    }
}

impl Controller for UptimeController {
    fn name(&self) -> String {
        "uptime".to_string()
    }

    fn register(&self, registry: &Registry, router: Router) -> anyhow::Result<Router> {
        let state = UptimeState {
            registry: registry.clone(),
            version: self.version.clone(),
            start_time: *self.start_time.get_or_init(SystemTime::now),
        };
        Ok(router.merge(
            Router::new()
                .route("/", get(handle_uptime))
                .route("/slow", get(handle_slow))
                .with_state(state),
        ))
    }
}

async fn handle_uptime(State(state): State<UptimeState>) -> Response {
    report_when_ready(&state).await
}

async fn handle_slow(
    State(state): State<UptimeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(delay) = params.get("delay").and_then(|d| d.parse::<u64>().ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            "Must provide 'delay' parameter for slow request",
        )
            .into_response();
    };
    tracing::info!(delay_ms = delay, "Starting slow request");
    tokio::time::sleep(Duration::from_millis(delay)).await;
    tracing::info!(delay_ms = delay, "Finishing slow request");
    report_when_ready(&state).await
}

async fn report_when_ready(state: &UptimeState) -> Response {
    // not answering until services are all started
    match state.registry.try_wait_all_ready(&Context::background()).await {
        Ok(()) => {}
        Err(RegistryError::NotStarted) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "services not running").into_response();
        }
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    }

    let start_time = state
        .start_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let uptime_seconds = state.start_time.elapsed().unwrap_or_default().as_secs();
    Json(UptimeReport {
        start_time,
        uptime_seconds,
        version: state.version.clone(),
    })
    .into_response()
}
