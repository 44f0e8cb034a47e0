//! Cached chain reads.
//!
//! # Data Flow
//! ```text
//! get_plan_info / get_member_info / get_system_stats
//!     → TtlCache lookup
//!     → on miss: rate-limited ChainClient reads
//!     → assemble view, format amounts with token decimals
//!     → TtlCache set with accessor-specific TTL
//! ```
//!
//! # Design Decisions
//! - Plan static fields and cycle counters are cached under separate keys
//! - Balances and allowances are never cached; they gate paid actions
//! - Unregistered members are not cached so a fresh registration shows up at once

pub mod service;
pub mod types;

pub use service::QueryService;
pub use types::{format_token_amount, CachedValue, MemberInfo, PlanInfo, SystemStats};
