//! Common controllers every app can mount.
//!
//! - [`UptimeController`]: readiness-gated uptime report, plus a slow variant
//! - [`ShutdownController`]: remote graceful stop and forced kill

pub mod shutdown;
pub mod uptime;

pub use shutdown::ShutdownController;
pub use uptime::{UptimeController, UptimeReport};
