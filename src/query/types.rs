//! Display-ready views of contract state.

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use serde::Serialize;

/// A membership plan with its current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanInfo {
    pub plan_id: u64,
    /// Price in token minor units.
    pub price: U256,
    pub price_display: String,
    pub name: String,
    pub cycle_capacity: u64,
    pub active: bool,
    pub current_cycle: u64,
    pub members_in_cycle: u64,
}

/// A registered member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub wallet: Address,
    pub upline: Address,
    pub referral_count: u64,
    /// Earnings in token minor units.
    pub earnings: U256,
    pub earnings_display: String,
    pub plan_id: u64,
    pub cycle_number: u64,
    /// Unix seconds.
    pub registered_at: u64,
    pub has_nft: bool,
}

/// Platform-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub total_members: u64,
    pub total_volume: U256,
    pub total_volume_display: String,
    pub total_referral_paid: U256,
    pub total_referral_paid_display: String,
}

/// Static plan fields; cached for a long time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStatic {
    pub price: U256,
    pub name: String,
    pub cycle_capacity: u64,
    pub active: bool,
}

/// Plan cycle counters; cached briefly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCycle {
    pub current_cycle: u64,
    pub members_in_cycle: u64,
}

/// Everything the query cache can hold.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Plan(PlanStatic),
    Cycle(PlanCycle),
    Member(MemberInfo),
    Stats(SystemStats),
    Decimals(u8),
}

/// Render a fixed-point token amount, dropping trailing fractional zeros.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let formatted = match format_units(amount, decimals) {
        Ok(s) => s,
        Err(_) => return amount.to_string(),
    };

    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}
