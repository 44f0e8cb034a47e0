//! Read cache for chain queries.
//!
//! # Data Flow
//! ```text
//! QueryService accessor
//!     → ttl.rs get (hit: return, miss: fall through to chain)
//!     → ttl.rs set with an accessor-specific TTL
//!
//! EventSyncEngine applies an event
//!     → delete / delete_by_pattern for the affected keys
//!
//! Background sweep
//!     → purge_expired on a fixed interval
//! ```
//!
//! # Design Decisions
//! - Expiry is checked on every read; the sweep only bounds memory
//! - LRU order is a global access sequence, not wall time, so ties cannot occur
//! - Eviction is approximate under concurrent inserts

pub mod ttl;

pub use ttl::{CacheEntry, CacheStats, TtlCache};
