//! Lifecycle primitives shared by the registry and its services.
//!
//! # Data Flow
//! ```text
//! Context (context.rs):
//!     background → with_cancel / with_timeout → passed to every lifecycle call
//!
//! TaskGroup (group.rs):
//!     spawn(name, fut) × N → first Err cancels the group context → wait()
//!
//! Ready (ready.rs):
//!     ReadySignal::fire() → every ReadyWaiter resolves
//!
//! Signals (signals.rs):
//!     ShutdownSignals::install() → recv() resolves on SIGINT / SIGTERM
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative: tasks observe `Context::done()`
//! - Deadline expiry and cancellation are distinct errors

pub mod context;
pub mod group;
pub mod ready;
pub mod signals;

pub use context::{Context, ContextError};
pub use group::{SharedError, TaskFailure, TaskGroup};
pub use ready::{ReadySignal, ReadyWaiter};
pub use signals::{ShutdownSignal, ShutdownSignals};
