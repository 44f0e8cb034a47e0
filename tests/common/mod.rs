//! Scripted in-memory chain shared by the integration tests.
#![allow(dead_code)]

use alloy::primitives::{address, Address, Bytes, Log as PrimitiveLog, TxHash, B256, U256};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use referral_sync::chain::contracts::{IMembership, IERC20};
use referral_sync::chain::{
    ChainError, ChainResult, ChainRpc, Connector, LogQuery, ProviderEndpoint,
};
use referral_sync::config::SyncConfig;
use referral_sync::lifecycle::{start_with_connector, Services};

pub const CHAIN_ID: u64 = 56;
pub const MEMBERSHIP: Address = address!("00000000000000000000000000000000000000c0");
pub const TOKEN: Address = address!("00000000000000000000000000000000000000d0");
pub const OPERATOR: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

pub fn wallet(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn tx_hash(n: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    TxHash::from(bytes)
}

/// 1 token with 18 decimals.
pub fn tokens(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone, Default)]
pub struct MockPlan {
    pub price: U256,
    pub name: String,
    pub capacity: u64,
    pub active: bool,
    pub current_cycle: u64,
    pub members_in_cycle: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MockMember {
    pub upline: Address,
    pub plan_id: u64,
    pub cycle_number: u64,
    pub referral_count: u64,
    pub earnings: U256,
}

/// Contract and node state seen through every endpoint.
#[derive(Debug)]
pub struct ChainState {
    pub head: u64,
    pub logs: Vec<Log>,
    /// Each entry rate-limits one `get_logs` call for that topic.
    pub rate_limited_topics: Vec<B256>,
    pub receipts: HashMap<TxHash, bool>,
    pub plans: HashMap<u64, MockPlan>,
    pub members: HashMap<Address, MockMember>,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<Address, U256>,
    pub decimals: u8,
    pub total_volume: U256,
    pub total_referral_paid: U256,
    pub gas_estimate: u64,
    pub sent: Vec<TransactionRequest>,
    pub log_queries: Vec<LogQuery>,
    pub block_delay: Option<Duration>,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            head: 0,
            logs: Vec::new(),
            rate_limited_topics: Vec::new(),
            receipts: HashMap::new(),
            plans: HashMap::new(),
            members: HashMap::new(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            decimals: 18,
            total_volume: U256::ZERO,
            total_referral_paid: U256::ZERO,
            gas_estimate: 100_000,
            sent: Vec::new(),
            log_queries: Vec::new(),
            block_delay: None,
        }
    }
}

/// Programmable chain with call accounting.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    calls: AtomicU32,
    send_attempts: AtomicU32,
    next_tx: AtomicU64,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(&self, f: impl FnOnce(&mut ChainState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChainState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    /// RPC calls made through any endpoint, liveness checks included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn send_attempts(&self) -> u32 {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn set_plan(&self, id: u64, price: U256, active: bool) {
        self.update(|s| {
            s.plans.insert(
                id,
                MockPlan {
                    price,
                    name: format!("Plan {}", id),
                    capacity: 10,
                    active,
                    current_cycle: 1,
                    members_in_cycle: 0,
                },
            );
        });
    }

    pub fn set_member(&self, who: Address, plan_id: u64) {
        self.update(|s| {
            s.members.insert(
                who,
                MockMember {
                    plan_id,
                    cycle_number: 1,
                    ..Default::default()
                },
            );
        });
    }

    pub fn fund(&self, who: Address, balance: U256, allowance: U256) {
        self.update(|s| {
            s.balances.insert(who, balance);
            s.allowances.insert(who, allowance);
        });
    }

    pub fn push_log(&self, log: Log) {
        self.update(|s| s.logs.push(log));
    }

    fn answer_call(&self, input: &[u8]) -> ChainResult<Bytes> {
        if input.len() < 4 {
            return Err(ChainError::Rpc("execution reverted: empty calldata".into()));
        }
        let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];
        let decode_err = |e: alloy::sol_types::Error| ChainError::Rpc(e.to_string());
        let state = self.state.lock().unwrap();

        let encoded = if selector == IMembership::getPlanCall::SELECTOR {
            let call = IMembership::getPlanCall::abi_decode(input).map_err(decode_err)?;
            let plan = state
                .plans
                .get(&call.planId.to::<u64>())
                .cloned()
                .unwrap_or_default();
            IMembership::getPlanCall::abi_encode_returns(&IMembership::getPlanReturn {
                price: plan.price,
                name: plan.name,
                cycleCapacity: U256::from(plan.capacity),
                active: plan.active,
            })
        } else if selector == IMembership::getPlanCycleCall::SELECTOR {
            let call = IMembership::getPlanCycleCall::abi_decode(input).map_err(decode_err)?;
            let plan = state
                .plans
                .get(&call.planId.to::<u64>())
                .cloned()
                .unwrap_or_default();
            IMembership::getPlanCycleCall::abi_encode_returns(&IMembership::getPlanCycleReturn {
                currentCycle: U256::from(plan.current_cycle),
                membersInCycle: U256::from(plan.members_in_cycle),
            })
        } else if selector == IMembership::getMemberCall::SELECTOR {
            let call = IMembership::getMemberCall::abi_decode(input).map_err(decode_err)?;
            let member = state.members.get(&call.wallet);
            let m = member.cloned().unwrap_or_default();
            IMembership::getMemberCall::abi_encode_returns(&IMembership::getMemberReturn {
                registered: member.is_some(),
                upline: m.upline,
                referralCount: U256::from(m.referral_count),
                earnings: m.earnings,
                planId: U256::from(m.plan_id),
                cycleNumber: U256::from(m.cycle_number),
                registeredAt: U256::from(1_700_000_000u64),
                hasNft: false,
            })
        } else if selector == IMembership::getSystemStatsCall::SELECTOR {
            IMembership::getSystemStatsCall::abi_encode_returns(
                &IMembership::getSystemStatsReturn {
                    totalMembers: U256::from(state.members.len() as u64),
                    totalVolume: state.total_volume,
                    totalReferralPaid: state.total_referral_paid,
                },
            )
        } else if selector == IERC20::balanceOfCall::SELECTOR {
            let call = IERC20::balanceOfCall::abi_decode(input).map_err(decode_err)?;
            let balance = state.balances.get(&call.owner).copied().unwrap_or_default();
            IERC20::balanceOfCall::abi_encode_returns(&balance)
        } else if selector == IERC20::allowanceCall::SELECTOR {
            let call = IERC20::allowanceCall::abi_decode(input).map_err(decode_err)?;
            let allowance = if call.spender == MEMBERSHIP {
                state.allowances.get(&call.owner).copied().unwrap_or_default()
            } else {
                U256::ZERO
            };
            IERC20::allowanceCall::abi_encode_returns(&allowance)
        } else if selector == IERC20::decimalsCall::SELECTOR {
            IERC20::decimalsCall::abi_encode_returns(&state.decimals)
        } else {
            return Err(ChainError::Rpc("execution reverted: unknown selector".into()));
        };

        Ok(encoded.into())
    }
}

/// One node URL in front of the shared chain.
#[derive(Debug)]
pub struct MockEndpoint {
    chain: Arc<MockChain>,
    up: AtomicBool,
    chain_id: AtomicU64,
    calls: AtomicU32,
    dropped: AtomicU32,
}

impl MockEndpoint {
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` non-handshake calls while staying reachable.
    pub fn drop_next_calls(&self, n: u32) {
        self.dropped.store(n, Ordering::SeqCst);
    }

    fn check_call(&self) -> ChainResult<()> {
        self.check()?;
        let dropped = self
            .dropped
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match dropped {
            Ok(_) => Err(ChainError::Transport("connection reset".into())),
            Err(_) => Ok(()),
        }
    }

    fn check(&self) -> ChainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.chain.calls.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChainError::Transport("connection refused".into()))
        }
    }
}

#[async_trait]
impl ChainRpc for MockEndpoint {
    async fn chain_id(&self) -> ChainResult<u64> {
        self.check()?;
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.check_call()?;
        let delay = self.chain.read(|s| s.block_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.chain.read(|s| s.head))
    }

    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        self.check_call()?;
        let input = tx.input.input().cloned().unwrap_or_default();
        self.chain.answer_call(&input)
    }

    async fn estimate_gas(&self, _tx: TransactionRequest) -> ChainResult<u64> {
        self.check_call()?;
        Ok(self.chain.read(|s| s.gas_estimate))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> ChainResult<TxHash> {
        self.chain.send_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_call()?;
        let n = self.chain.next_tx.fetch_add(1, Ordering::SeqCst) + 1;
        self.chain.update(|s| s.sent.push(tx));
        Ok(tx_hash(1_000 + n))
    }

    async fn get_logs(&self, query: &LogQuery) -> ChainResult<Vec<Log>> {
        self.check_call()?;
        let mut state = self.chain.state.lock().unwrap();
        state.log_queries.push(*query);

        if let Some(pos) = state.rate_limited_topics.iter().position(|t| *t == query.topic0) {
            state.rate_limited_topics.remove(pos);
            return Err(ChainError::RateLimited("429 Too Many Requests".into()));
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                log.inner.address == query.address
                    && log.inner.data.topics().first() == Some(&query.topic0)
                    && block >= query.from_block
                    && block <= query.to_block
            })
            .cloned()
            .collect())
    }

    async fn transaction_status(&self, hash: TxHash) -> ChainResult<Option<bool>> {
        self.check_call()?;
        Ok(self.chain.read(|s| s.receipts.get(&hash).copied()))
    }
}

/// Hands out endpoints by pool ordinal.
pub struct MockConnector {
    endpoints: Vec<Arc<MockEndpoint>>,
}

impl MockConnector {
    pub fn new(chain: &Arc<MockChain>, count: usize) -> Arc<Self> {
        let endpoints = (0..count)
            .map(|_| {
                Arc::new(MockEndpoint {
                    chain: Arc::clone(chain),
                    up: AtomicBool::new(true),
                    chain_id: AtomicU64::new(CHAIN_ID),
                    calls: AtomicU32::new(0),
                    dropped: AtomicU32::new(0),
                })
            })
            .collect();
        Arc::new(Self { endpoints })
    }

    pub fn endpoint(&self, ordinal: usize) -> &Arc<MockEndpoint> {
        &self.endpoints[ordinal]
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &ProviderEndpoint) -> ChainResult<Arc<dyn ChainRpc>> {
        match self.endpoints.get(endpoint.ordinal) {
            Some(node) => Ok(Arc::clone(node) as Arc<dyn ChainRpc>),
            None => Err(ChainError::Transport(format!("no such node {}", endpoint))),
        }
    }
}

/// Encode `event` as a mined log of the membership contract.
pub fn event_log<E: SolEvent>(event: &E, block: u64, log_index: u64, tx: TxHash) -> Log {
    Log {
        inner: PrimitiveLog {
            address: MEMBERSHIP,
            data: event.encode_log_data(),
        },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// Config pointing at `endpoints` mock nodes, with limits out of the way.
pub fn test_config(endpoints: usize) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.chain.endpoints = (0..endpoints)
        .map(|i| format!("http://node-{}.test:8545", i))
        .collect();
    config.chain.chain_id = CHAIN_ID;
    config.chain.rpc_timeout_secs = 5;
    config.contracts.membership = MEMBERSHIP.to_string();
    config.contracts.token = TOKEN.to_string();
    config.rate_limit.max_requests = 10_000;
    config.sync.enabled = false;
    config.sync.window_blocks = 5;
    config.sync.start_block = None;
    config
}

/// Start the full service graph against `connector`. Background sync is off.
pub async fn start(
    config: SyncConfig,
    connector: &Arc<MockConnector>,
    signer: Option<Address>,
) -> Services {
    let connector: Arc<dyn Connector> = connector.clone();
    start_with_connector(config, connector, signer)
        .await
        .expect("services start")
}
