//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry phases, HTTP service:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the HTTP layer into request logs
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
