//! Cached read accessors over the membership and token contracts.

use alloy::primitives::{Address, U256};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, TtlCache};
use crate::chain::contracts::{IMembership, IERC20};
use crate::chain::{ChainClient, ChainResult};
use crate::config::CacheConfig;
use crate::query::types::{
    format_token_amount, CachedValue, MemberInfo, PlanCycle, PlanInfo, PlanStatic, SystemStats,
};
use crate::resilience::RateScope;

static PLAN_CYCLE_KEYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^plan:\d+:cycle$").expect("Invalid plan cycle regex"));

const STATS_KEY: &str = "stats";
const DECIMALS_KEY: &str = "token:decimals";

fn plan_key(plan_id: u64) -> String {
    format!("plan:{}", plan_id)
}

fn cycle_key(plan_id: u64) -> String {
    format!("plan:{}:cycle", plan_id)
}

fn member_key(wallet: Address) -> String {
    format!("member:{}", wallet.to_string().to_lowercase())
}

/// Read-side facade used by presentation code and the orchestrator.
///
/// The plain accessors never fail: a chain error is logged and reported as
/// `None`. The `try_*` variants keep the error for callers that must tell
/// absence from failure.
pub struct QueryService {
    client: Arc<ChainClient>,
    cache: TtlCache<CachedValue>,
    config: CacheConfig,
    membership: Address,
    token: Address,
    scope: RateScope,
}

impl QueryService {
    pub fn new(
        client: Arc<ChainClient>,
        cache: TtlCache<CachedValue>,
        config: CacheConfig,
        membership: Address,
        token: Address,
    ) -> Self {
        Self {
            client,
            cache,
            config,
            membership,
            token,
            scope: RateScope::named("query"),
        }
    }

    pub fn membership_address(&self) -> Address {
        self.membership
    }

    pub fn token_address(&self) -> Address {
        self.token
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn get_plan_info(&self, plan_id: u64) -> Option<PlanInfo> {
        self.try_get_plan_info(plan_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(plan_id, error = %e, "Plan lookup failed");
                None
            })
    }

    pub async fn get_member_info(&self, wallet: Address) -> Option<MemberInfo> {
        self.try_get_member_info(wallet)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(wallet = %wallet, error = %e, "Member lookup failed");
                None
            })
    }

    pub async fn get_system_stats(&self) -> Option<SystemStats> {
        match self.try_get_system_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "System stats lookup failed");
                None
            }
        }
    }

    pub async fn token_decimals(&self) -> Option<u8> {
        match self.try_token_decimals().await {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                tracing::warn!(error = %e, "Token decimals lookup failed");
                None
            }
        }
    }

    /// Plan with current cycle; `Ok(None)` when the plan does not exist.
    pub async fn try_get_plan_info(&self, plan_id: u64) -> ChainResult<Option<PlanInfo>> {
        let Some(plan) = self.plan_static(plan_id).await? else {
            return Ok(None);
        };
        let cycle = self.plan_cycle(plan_id).await?;
        let decimals = self.try_token_decimals().await?;

        Ok(Some(PlanInfo {
            plan_id,
            price: plan.price,
            price_display: format_token_amount(plan.price, decimals),
            name: plan.name,
            cycle_capacity: plan.cycle_capacity,
            active: plan.active,
            current_cycle: cycle.current_cycle,
            members_in_cycle: cycle.members_in_cycle,
        }))
    }

    /// Member record; `Ok(None)` when the wallet is not registered.
    pub async fn try_get_member_info(&self, wallet: Address) -> ChainResult<Option<MemberInfo>> {
        let key = member_key(wallet);
        if let Some(CachedValue::Member(member)) = self.cache.get(&key) {
            return Ok(Some(member));
        }

        let call = IMembership::getMemberCall { wallet };
        let raw = self
            .client
            .read_contract(&self.scope, self.membership, &call)
            .await?;

        if !raw.registered {
            return Ok(None);
        }

        let decimals = self.try_token_decimals().await?;
        let member = MemberInfo {
            wallet,
            upline: raw.upline,
            referral_count: raw.referralCount.saturating_to(),
            earnings: raw.earnings,
            earnings_display: format_token_amount(raw.earnings, decimals),
            plan_id: raw.planId.saturating_to(),
            cycle_number: raw.cycleNumber.saturating_to(),
            registered_at: raw.registeredAt.saturating_to(),
            has_nft: raw.hasNft,
        };

        self.cache.set(
            key,
            CachedValue::Member(member.clone()),
            Duration::from_secs(self.config.member_ttl_secs),
        );
        Ok(Some(member))
    }

    pub async fn try_get_system_stats(&self) -> ChainResult<SystemStats> {
        if let Some(CachedValue::Stats(stats)) = self.cache.get(STATS_KEY) {
            return Ok(stats);
        }

        let raw = self
            .client
            .read_contract(&self.scope, self.membership, &IMembership::getSystemStatsCall {})
            .await?;
        let decimals = self.try_token_decimals().await?;

        let stats = SystemStats {
            total_members: raw.totalMembers.saturating_to(),
            total_volume: raw.totalVolume,
            total_volume_display: format_token_amount(raw.totalVolume, decimals),
            total_referral_paid: raw.totalReferralPaid,
            total_referral_paid_display: format_token_amount(raw.totalReferralPaid, decimals),
        };

        self.cache.set(
            STATS_KEY,
            CachedValue::Stats(stats.clone()),
            Duration::from_secs(self.config.stats_ttl_secs),
        );
        Ok(stats)
    }

    /// Token precision, read once and kept for a long time.
    pub async fn try_token_decimals(&self) -> ChainResult<u8> {
        if let Some(CachedValue::Decimals(decimals)) = self.cache.get(DECIMALS_KEY) {
            return Ok(decimals);
        }

        let decimals = self
            .client
            .read_contract(&self.scope, self.token, &IERC20::decimalsCall {})
            .await?;

        self.cache.set(
            DECIMALS_KEY,
            CachedValue::Decimals(decimals),
            Duration::from_secs(self.config.decimals_ttl_secs),
        );
        Ok(decimals)
    }

    /// Payment token balance of `owner`. Never cached.
    pub async fn token_balance(&self, owner: Address) -> ChainResult<U256> {
        self.client
            .read_contract(&self.scope, self.token, &IERC20::balanceOfCall { owner })
            .await
    }

    /// Amount `owner` has approved the membership contract to spend. Never cached.
    pub async fn token_allowance(&self, owner: Address) -> ChainResult<U256> {
        let call = IERC20::allowanceCall {
            owner,
            spender: self.membership,
        };
        self.client.read_contract(&self.scope, self.token, &call).await
    }

    pub fn invalidate_member(&self, wallet: Address) -> bool {
        self.cache.delete(&member_key(wallet))
    }

    pub fn invalidate_plan_cycles(&self) -> usize {
        self.cache.delete_by_pattern(&PLAN_CYCLE_KEYS)
    }

    pub fn invalidate_stats(&self) -> bool {
        self.cache.delete(STATS_KEY)
    }

    async fn plan_static(&self, plan_id: u64) -> ChainResult<Option<PlanStatic>> {
        let key = plan_key(plan_id);
        if let Some(CachedValue::Plan(plan)) = self.cache.get(&key) {
            return Ok(Some(plan));
        }

        let call = IMembership::getPlanCall {
            planId: U256::from(plan_id),
        };
        let raw = self
            .client
            .read_contract(&self.scope, self.membership, &call)
            .await?;

        // Unknown plan ids come back zeroed.
        if raw.price.is_zero() && raw.name.is_empty() {
            return Ok(None);
        }

        let plan = PlanStatic {
            price: raw.price,
            name: raw.name,
            cycle_capacity: raw.cycleCapacity.saturating_to(),
            active: raw.active,
        };
        self.cache.set(
            key,
            CachedValue::Plan(plan.clone()),
            Duration::from_secs(self.config.plan_ttl_secs),
        );
        Ok(Some(plan))
    }

    async fn plan_cycle(&self, plan_id: u64) -> ChainResult<PlanCycle> {
        let key = cycle_key(plan_id);
        if let Some(CachedValue::Cycle(cycle)) = self.cache.get(&key) {
            return Ok(cycle);
        }

        let call = IMembership::getPlanCycleCall {
            planId: U256::from(plan_id),
        };
        let raw = self
            .client
            .read_contract(&self.scope, self.membership, &call)
            .await?;

        let cycle = PlanCycle {
            current_cycle: raw.currentCycle.saturating_to(),
            members_in_cycle: raw.membersInCycle.saturating_to(),
        };
        self.cache.set(
            key,
            CachedValue::Cycle(cycle),
            Duration::from_secs(self.config.cycle_ttl_secs),
        );
        Ok(cycle)
    }
}
