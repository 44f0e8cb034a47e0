//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → limiter → client → cache/query → ledger → orchestrator → sync
//!     → spawn cleanup, cache sweep, sync loop, pending sweep, admin server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → tasks leave their loops → ledger persisted
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Shutdown waits a bounded time per task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, start_with_connector, Services, StartupError};
