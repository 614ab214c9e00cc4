//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! HttpService::initialize
//!     → bind TcpListener (port from config / PORT / offset)
//!     → registry.register_controllers(Router) → middleware layers
//!     → registry.start_controllers
//! HttpService::start
//!     → fire ready → axum::serve until the running context is done
//! request
//!     → request ID → trace → metrics → controller handler
//!       (Extension<Registry>, Extension<RequestValues>)
//! HttpService::cleanup
//!     → registry.shutdown_controllers
//! ```

pub mod server;

use std::sync::{Arc, LazyLock};

use crate::registry::ServerInfo;
use crate::values::{Key, Values};

pub use server::{resolve_port, HttpService};

/// Bound in each listener's values scope.
pub static SERVER_INFO_KEY: LazyLock<Key<ServerInfo>> = LazyLock::new(|| Key::new("http.server"));

/// The values scope of the listener serving a request, as an axum extension.
#[derive(Clone)]
pub struct RequestValues(pub Arc<dyn Values>);

impl RequestValues {
    pub fn values(&self) -> &dyn Values {
        self.0.as_ref()
    }

    /// The listener this request arrived on.
    pub fn server(&self) -> Option<ServerInfo> {
        SERVER_INFO_KEY.cloned(self.values())
    }
}
