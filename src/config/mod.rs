//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → bound into the root Values under CONFIG_KEY
//!     → services resolve it through the Values API
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

use std::sync::LazyLock;

use crate::values::Key;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AppConfig, AppSection, HttpConfig, LifecycleConfig, LogFormat, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};

/// Where the composition root binds the loaded [`AppConfig`].
pub static CONFIG_KEY: LazyLock<Key<AppConfig>> = LazyLock::new(|| Key::new("config"));
