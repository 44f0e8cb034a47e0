//! Cached reads through the query service.

mod common;

use alloy::primitives::U256;
use std::sync::Arc;

use common::{start, test_config, wallet, MockChain, MockConnector, MockMember};
use referral_sync::Services;

async fn services(chain: &Arc<MockChain>) -> Services {
    let connector = MockConnector::new(chain, 1);
    start(test_config(1), &connector, None).await
}

#[tokio::test]
async fn test_plan_info_combines_static_and_cycle_fields() {
    let chain = MockChain::new();
    chain.update(|s| s.decimals = 6);
    chain.set_plan(1, U256::from(25_500_000u64), true);
    chain.update(|s| {
        let plan = s.plans.get_mut(&1).unwrap();
        plan.current_cycle = 4;
        plan.members_in_cycle = 7;
    });
    let services = services(&chain).await;

    let plan = services.query.get_plan_info(1).await.unwrap();

    assert_eq!(plan.plan_id, 1);
    assert_eq!(plan.name, "Plan 1");
    assert_eq!(plan.price, U256::from(25_500_000u64));
    assert_eq!(plan.price_display, "25.5");
    assert_eq!(plan.cycle_capacity, 10);
    assert!(plan.active);
    assert_eq!(plan.current_cycle, 4);
    assert_eq!(plan.members_in_cycle, 7);
}

#[tokio::test]
async fn test_repeat_reads_are_served_from_cache() {
    let chain = MockChain::new();
    chain.set_plan(2, common::tokens(50), true);
    let services = services(&chain).await;

    let before = chain.calls();
    let first = services.query.get_plan_info(2).await.unwrap();
    // Plan, cycle and token decimals.
    assert_eq!(chain.calls() - before, 3);

    let before = chain.calls();
    let second = services.query.get_plan_info(2).await.unwrap();
    assert_eq!(chain.calls(), before);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_cycle_invalidation_refetches_only_cycle() {
    let chain = MockChain::new();
    chain.set_plan(1, common::tokens(10), true);
    let services = services(&chain).await;
    services.query.get_plan_info(1).await.unwrap();

    chain.update(|s| s.plans.get_mut(&1).unwrap().members_in_cycle = 3);
    assert_eq!(services.query.invalidate_plan_cycles(), 1);

    let before = chain.calls();
    let plan = services.query.get_plan_info(1).await.unwrap();
    assert_eq!(chain.calls() - before, 1);
    assert_eq!(plan.members_in_cycle, 3);
}

#[tokio::test]
async fn test_decimals_fetched_once() {
    let chain = MockChain::new();
    chain.set_plan(1, common::tokens(10), true);
    chain.set_member(wallet(0x11), 1);
    let services = services(&chain).await;

    services.query.get_plan_info(1).await.unwrap();
    let before = chain.calls();
    services.query.get_member_info(wallet(0x11)).await.unwrap();
    services.query.get_system_stats().await.unwrap();

    // One member read and one stats read, no further decimals lookups.
    assert_eq!(chain.calls() - before, 2);
    assert_eq!(services.query.token_decimals().await, Some(18));
    assert_eq!(chain.calls() - before, 2);
}

#[tokio::test]
async fn test_member_info_formats_earnings() {
    let chain = MockChain::new();
    let member = wallet(0x12);
    chain.update(|s| {
        s.members.insert(
            member,
            MockMember {
                upline: wallet(0x01),
                plan_id: 3,
                cycle_number: 2,
                referral_count: 4,
                earnings: U256::from(1_250_000_000_000_000_000u128),
            },
        );
    });
    let services = services(&chain).await;

    let info = services.query.get_member_info(member).await.unwrap();

    assert_eq!(info.upline, wallet(0x01));
    assert_eq!(info.plan_id, 3);
    assert_eq!(info.referral_count, 4);
    assert_eq!(info.earnings_display, "1.25");
    assert!(services.query.get_member_info(wallet(0x13)).await.is_none());
}

#[tokio::test]
async fn test_system_stats() {
    let chain = MockChain::new();
    chain.set_member(wallet(1), 1);
    chain.set_member(wallet(2), 2);
    chain.update(|s| {
        s.total_volume = common::tokens(300);
        s.total_referral_paid = U256::from(45_000_000_000_000_000_000u128);
    });
    let services = services(&chain).await;

    let stats = services.query.get_system_stats().await.unwrap();

    assert_eq!(stats.total_members, 2);
    assert_eq!(stats.total_volume_display, "300");
    assert_eq!(stats.total_referral_paid_display, "45");

    chain.set_member(wallet(3), 1);
    assert_eq!(services.query.get_system_stats().await.unwrap().total_members, 2);
    services.query.invalidate_stats();
    assert_eq!(services.query.get_system_stats().await.unwrap().total_members, 3);
}

#[tokio::test]
async fn test_failed_reads_return_none() {
    let chain = MockChain::new();
    chain.set_plan(1, common::tokens(10), true);
    chain.set_member(wallet(0x14), 1);
    let connector = MockConnector::new(&chain, 1);
    let services = start(test_config(1), &connector, None).await;
    connector.endpoint(0).set_up(false);

    assert!(services.query.get_plan_info(1).await.is_none());
    assert!(services.query.get_member_info(wallet(0x14)).await.is_none());
    assert!(services.query.get_system_stats().await.is_none());
    assert!(services.query.try_get_plan_info(1).await.is_err());
}

#[tokio::test]
async fn test_unknown_plan_is_none() {
    let chain = MockChain::new();
    let services = services(&chain).await;

    assert_eq!(services.query.try_get_plan_info(9).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_expires_before_static_plan() {
    let chain = MockChain::new();
    chain.set_plan(1, common::tokens(10), true);
    let config = test_config(1);
    let cycle_ttl = config.cache.cycle_ttl_secs;
    assert!(cycle_ttl < config.cache.plan_ttl_secs);
    let connector = MockConnector::new(&chain, 1);
    let services = start(config, &connector, None).await;
    services.query.get_plan_info(1).await.unwrap();

    tokio::time::advance(std::time::Duration::from_secs(cycle_ttl + 1)).await;

    let before = chain.calls();
    services.query.get_plan_info(1).await.unwrap();
    assert_eq!(chain.calls() - before, 1);
}
