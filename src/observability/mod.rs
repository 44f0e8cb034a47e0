//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields instead of formatted strings where values matter
//! - Each sync cycle runs inside a span carrying a cycle ID
//! - Systemic failures carry an `alert` field for external alerting

pub mod logging;
pub mod metrics;
