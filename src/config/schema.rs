//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an
//! application built on the registry. All types derive Serde traits for
//! deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::RegistryOptions;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Application identity.
    pub app: AppSection,

    /// HTTP listener settings.
    pub http: HttpConfig,

    /// Service lifecycle tuning.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Application identity, reported by the uptime controller.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    /// Registry and application name.
    pub name: String,

    /// Reported version string.
    pub version: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Host or IP the listener binds to.
    pub bind_host: String,

    /// Base port. `0` picks a random free port. `PORT` in the environment
    /// overrides this value.
    pub port: u16,

    /// Added to the base port, for apps running several listeners.
    pub port_offset: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            port_offset: 0,
        }
    }
}

/// Lifecycle tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How often a slow-to-become-ready warning is logged.
    pub ready_warn_interval_ms: u64,

    /// Hard limit on waiting for readiness. Unset means wait indefinitely.
    pub ready_timeout_secs: Option<u64>,

    /// Upper bound on the cleanup phase.
    pub cleanup_timeout_secs: u64,

    /// Register the SIGINT/SIGTERM listener service.
    pub trap_signals: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ready_warn_interval_ms: 1000,
            ready_timeout_secs: None,
            cleanup_timeout_secs: 30,
            trap_signals: true,
        }
    }
}

impl LifecycleConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    /// Registry options derived from this section.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            ready_warn_interval: Duration::from_millis(self.ready_warn_interval_ms),
            ready_timeout: self.ready_timeout_secs.map(Duration::from_secs),
            cleanup_timeout: Some(self.cleanup_timeout()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
