//! Service registry demo application.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────── main (composition root) ───────────────────────────┐
//!   │  config (TOML) ──▶ RootValues[CONFIG_KEY] ──▶ Registry ("/registry/")           │
//!   │                                                 │                               │
//!   │                    services                     │           controllers         │
//!   │          ┌──────────────────────────┐           │     ┌──────────────────────┐  │
//!   │          │ SignalListener           │◀──────────┼────▶│ UptimeController     │  │
//!   │          │ HttpService(port) ───────┼── serves ─┼────▶│ ShutdownController   │  │
//!   │          │ Initializer("startup")   │           │     └──────────────────────┘  │
//!   │          └──────────────────────────┘           │                               │
//!   │                                                 ▼                               │
//!   │         initialize → start → ready → run → stop → cleanup  (Registry::run)      │
//!   └────────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use service_registry::config::{load_config, AppConfig, CONFIG_KEY};
use service_registry::controllers::{ShutdownController, UptimeController};
use service_registry::http::HttpService;
use service_registry::observability::{logging, metrics};
use service_registry::registry::{register_default_signal_listener, Initializer};
use service_registry::{
    Context, Dependency, MutableValues, Registry, RootValues, ValueSource, Values,
};

#[derive(Parser)]
#[command(name = "service-registry")]
#[command(about = "Runs the service registry demo application", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!(
        app = %config.app.name,
        version = %config.app.version,
        port = config.http.port,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let root = Arc::new(RootValues::new());
    root.must_bind(&CONFIG_KEY, ValueSource::constant(config.clone()));
    let parent: Arc<dyn Values> = root;

    let registry = Registry::with_options(
        config.app.name.clone(),
        Some(parent),
        config.lifecycle.registry_options(),
    );

    registry.add_controller(Arc::new(UptimeController::new(config.app.version.clone())));
    registry.add_controller(Arc::new(ShutdownController::new()));

    if config.lifecycle.trap_signals {
        register_default_signal_listener(&registry);
    }
    registry.add_service(Arc::new(HttpService::new()));
    registry.add_service(Arc::new(Initializer::new("startup").on_initialize(
        |_ctx, registry: Registry, _dependency| async move {
            tracing::info!(path = %registry.path(), "Values scope ready");
            anyhow::Ok(())
        },
    )));

    let result = registry.run(&Context::background(), &Dependency::none()).await;

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "Exiting after error");
            std::process::exit(1);
        }
    }
}
