//! In-process fakes for the contract gateway and the social metrics source.
//!
//! Both record every call and can be scripted to fail, so component tests run
//! deterministically without a relayer or a social API.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::*;

use crate::gateway::{ContractGateway, HeatReading, HeatUpdate, SaleState, TokenMeta, TxReceipt};
use crate::social::{EngagementCounters, SocialMetricsSource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Contract Gateway
// ============================================================================

#[derive(Default)]
struct GatewayState {
    sales: HashMap<FairLaunchId, SaleState>,
    sale_errors: HashSet<FairLaunchId>,
    metas: HashMap<FairLaunchId, TokenMeta>,
    deploy_failures: u32,
    deploy_delay: Option<Duration>,
    deploy_calls: Vec<FairLaunchId>,
    heat: HashMap<Address, HeatReading>,
    heat_batches: Vec<Vec<HeatUpdate>>,
    heat_batch_failures: u32,
    heat_read_failures: HashSet<Address>,
    roots: HashMap<(Address, u64), B256>,
    root_failures: u32,
    root_calls: usize,
    battles: Vec<BattleId>,
    battle_failures: HashSet<BattleId>,
    battle_list_fails: bool,
    resolved_battles: Vec<BattleId>,
    nonce: u64,
}

impl GatewayState {
    fn receipt(&mut self) -> TxReceipt {
        self.nonce += 1;
        TxReceipt {
            tx_hash: keccak256(self.nonce.to_be_bytes()),
            block_number: Some(self.nonce),
        }
    }
}

/// Scriptable [`ContractGateway`]
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the fake deploys a fair launch's token at
    pub fn token_for(id: FairLaunchId) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xde;
        bytes[12..].copy_from_slice(&id.to_be_bytes());
        Address::from(bytes)
    }

    pub fn set_sale(&self, id: FairLaunchId, completable: bool, refundable: bool) {
        lock(&self.state).sales.insert(id, SaleState { completable, refundable });
    }

    pub fn fail_sale_state(&self, id: FairLaunchId) {
        lock(&self.state).sale_errors.insert(id);
    }

    pub fn set_meta(&self, meta: TokenMeta) {
        lock(&self.state).metas.insert(meta.fair_launch_id, meta);
    }

    /// Make the next `count` deploy calls fail with a transient error
    pub fn fail_deploys(&self, count: u32) {
        lock(&self.state).deploy_failures = count;
    }

    pub fn delay_deploys(&self, delay: Duration) {
        lock(&self.state).deploy_delay = Some(delay);
    }

    pub fn deploy_calls(&self) -> Vec<FairLaunchId> {
        lock(&self.state).deploy_calls.clone()
    }

    pub fn set_heat(&self, token: Address, heat: u64, last_update: DateTime<Utc>) {
        lock(&self.state).heat.insert(
            token,
            HeatReading {
                heat,
                last_update,
                last_boost: 0,
            },
        );
    }

    pub fn heat_of(&self, token: &Address) -> Option<HeatReading> {
        lock(&self.state).heat.get(token).copied()
    }

    pub fn fail_heat_batches(&self, count: u32) {
        lock(&self.state).heat_batch_failures = count;
    }

    pub fn fail_heat_reads(&self, token: Address) {
        lock(&self.state).heat_read_failures.insert(token);
    }

    pub fn heat_batches(&self) -> Vec<Vec<HeatUpdate>> {
        lock(&self.state).heat_batches.clone()
    }

    /// Make the next `count` root submissions fail as if called too early
    pub fn fail_roots(&self, count: u32) {
        lock(&self.state).root_failures = count;
    }

    pub fn root_of(&self, token: &Address, index: u64) -> Option<B256> {
        lock(&self.state).roots.get(&(*token, index)).copied()
    }

    /// Pretend a root landed on-chain without the keeper seeing the receipt
    pub fn preset_root(&self, token: Address, index: u64, root: B256) {
        lock(&self.state).roots.insert((token, index), root);
    }

    pub fn root_calls(&self) -> usize {
        lock(&self.state).root_calls
    }

    pub fn set_resolvable_battles(&self, ids: Vec<BattleId>) {
        lock(&self.state).battles = ids;
    }

    /// Make every `resolve_battle(id)` call revert
    pub fn fail_battle(&self, id: BattleId) {
        lock(&self.state).battle_failures.insert(id);
    }

    pub fn allow_battle(&self, id: BattleId) {
        lock(&self.state).battle_failures.remove(&id);
    }

    pub fn fail_battle_listing(&self, fail: bool) {
        lock(&self.state).battle_list_fails = fail;
    }

    pub fn resolved_battles(&self) -> Vec<BattleId> {
        lock(&self.state).resolved_battles.clone()
    }
}

#[async_trait]
impl ContractGateway for FakeGateway {
    async fn get_sale_state(&self, id: FairLaunchId) -> LaunchpadResult<SaleState> {
        let state = lock(&self.state);
        if state.sale_errors.contains(&id) {
            return Err(LaunchpadError::rpc_error("sale state unavailable", Some(503)));
        }
        Ok(state.sales.get(&id).copied().unwrap_or_default())
    }

    async fn get_token_meta(&self, id: FairLaunchId) -> LaunchpadResult<Option<TokenMeta>> {
        Ok(lock(&self.state).metas.get(&id).cloned())
    }

    async fn deploy(&self, meta: &TokenMeta) -> LaunchpadResult<Address> {
        let delay = {
            let mut state = lock(&self.state);
            state.deploy_calls.push(meta.fair_launch_id);
            if state.deploy_failures > 0 {
                state.deploy_failures -= 1;
                return Err(LaunchpadError::rpc_error("replacement transaction underpriced", None));
            }
            state.deploy_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Self::token_for(meta.fair_launch_id))
    }

    async fn submit_heat_batch(&self, updates: &[HeatUpdate]) -> LaunchpadResult<TxReceipt> {
        let mut state = lock(&self.state);
        if state.heat_batch_failures > 0 {
            state.heat_batch_failures -= 1;
            return Err(LaunchpadError::transaction_failed("execution reverted", None));
        }

        let now = Utc::now();
        for update in updates {
            let reading = state.heat.entry(update.token).or_insert(HeatReading {
                heat: 0,
                last_update: now,
                last_boost: 0,
            });
            reading.heat += update.heat;
            reading.last_update = now;
            reading.last_boost = update.heat;
        }
        state.heat_batches.push(updates.to_vec());
        Ok(state.receipt())
    }

    async fn get_heat(&self, token: &Address) -> LaunchpadResult<HeatReading> {
        let state = lock(&self.state);
        if state.heat_read_failures.contains(token) {
            return Err(LaunchpadError::rpc_error("heat read failed", Some(502)));
        }
        state
            .heat
            .get(token)
            .copied()
            .ok_or_else(|| LaunchpadError::not_found("token heat", &token.to_string()))
    }

    async fn submit_merkle_root(&self, token: &Address, root: B256, index: u64) -> LaunchpadResult<TxReceipt> {
        let mut state = lock(&self.state);
        state.root_calls += 1;
        if state.root_failures > 0 {
            state.root_failures -= 1;
            return Err(LaunchpadError::transaction_failed("Too soon to set", None));
        }
        if state.roots.contains_key(&(*token, index)) {
            return Err(LaunchpadError::RootAlreadySet { token: *token, index });
        }
        state.roots.insert((*token, index), root);
        Ok(state.receipt())
    }

    async fn get_battles_to_resolve(&self) -> LaunchpadResult<Vec<BattleId>> {
        let state = lock(&self.state);
        if state.battle_list_fails {
            return Err(LaunchpadError::rpc_error("battle list unavailable", Some(503)));
        }
        Ok(state.battles.clone())
    }

    async fn resolve_battle(&self, id: BattleId) -> LaunchpadResult<TxReceipt> {
        let mut state = lock(&self.state);
        if state.battle_failures.contains(&id) {
            return Err(LaunchpadError::transaction_failed("execution reverted", None));
        }
        state.battles.retain(|pending| *pending != id);
        state.resolved_battles.push(id);
        Ok(state.receipt())
    }
}

// ============================================================================
// Social Metrics
// ============================================================================

#[derive(Default)]
struct SocialState {
    followers: HashMap<SocialAccount, Vec<Address>>,
    engagement: HashMap<SocialAccount, EngagementCounters>,
    failing: HashSet<SocialAccount>,
    engagement_calls: Vec<(SocialAccount, DateTime<Utc>)>,
}

/// Scriptable [`SocialMetricsSource`]
#[derive(Default)]
pub struct FakeSocialSource {
    state: Mutex<SocialState>,
}

impl FakeSocialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_followers(&self, account: SocialAccount, followers: Vec<Address>) {
        lock(&self.state).followers.insert(account, followers);
    }

    pub fn set_engagement(&self, account: SocialAccount, counters: EngagementCounters) {
        lock(&self.state).engagement.insert(account, counters);
    }

    pub fn fail(&self, account: SocialAccount) {
        lock(&self.state).failing.insert(account);
    }

    /// `since` values passed to `get_engagement_since`, in call order
    pub fn engagement_calls(&self) -> Vec<(SocialAccount, DateTime<Utc>)> {
        lock(&self.state).engagement_calls.clone()
    }
}

#[async_trait]
impl SocialMetricsSource for FakeSocialSource {
    async fn get_followers(&self, account: &SocialAccount) -> LaunchpadResult<Vec<Address>> {
        let state = lock(&self.state);
        if state.failing.contains(account) {
            return Err(LaunchpadError::social(&account.platform.to_string(), "rate limited"));
        }
        Ok(state.followers.get(account).cloned().unwrap_or_default())
    }

    async fn get_engagement_since(
        &self,
        account: &SocialAccount,
        since: DateTime<Utc>,
    ) -> LaunchpadResult<EngagementCounters> {
        let mut state = lock(&self.state);
        if state.failing.contains(account) {
            return Err(LaunchpadError::social(&account.platform.to_string(), "rate limited"));
        }
        state.engagement_calls.push((account.clone(), since));
        Ok(state.engagement.get(account).copied().unwrap_or_default())
    }
}
