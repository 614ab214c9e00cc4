//! Service registry: lifecycle orchestration with a hierarchical values container.

pub mod config;
pub mod controllers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod values;

pub use config::AppConfig;
pub use lifecycle::{Context, ContextError, ReadySignal, ReadyWaiter};
pub use registry::{
    get_registry, Controller, Dependency, Registry, RegistryError, RegistryOptions, Service,
    ServiceTag, REGISTRY_KEY,
};
pub use values::{CachedValues, ChildValues, Key, MutableValues, RootValues, ValueSource, Values};
