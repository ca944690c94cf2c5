//! In-process store.
//!
//! All records sit behind one async mutex, which makes every conditional
//! operation trivially atomic. State does not survive a restart.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::*;
use tokio::sync::Mutex;

use super::{apply_transition, sort_oldest_first, ClaimOutcome, ClaimQuery, EnqueueOutcome, RoundRecord, Store};

#[derive(Default)]
struct MemoryState {
    launches: BTreeMap<FairLaunchId, FairLaunch>,
    jobs: BTreeMap<FairLaunchId, DeploymentJob>,
    watermarks: HashMap<Address, HeatWatermark>,
    rounds: BTreeMap<(Address, u64), RoundRecord>,
    applied_claims: HashMap<B256, AllocationKey>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_fair_launch(&self, launch: &FairLaunch) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        if state.launches.contains_key(&launch.id) {
            return Ok(false);
        }
        state.launches.insert(launch.id, launch.clone());
        Ok(true)
    }

    async fn get_fair_launch(&self, id: FairLaunchId) -> LaunchpadResult<Option<FairLaunch>> {
        Ok(self.state.lock().await.launches.get(&id).cloned())
    }

    async fn find_fair_launch_by_token(&self, token: &Address) -> LaunchpadResult<Option<FairLaunch>> {
        let state = self.state.lock().await;
        Ok(state
            .launches
            .values()
            .find(|launch| launch.token_address.as_ref() == Some(token))
            .cloned())
    }

    async fn list_fair_launches(&self, status: FairLaunchStatus) -> LaunchpadResult<Vec<FairLaunch>> {
        let state = self.state.lock().await;
        Ok(state.launches.values().filter(|l| l.status == status).cloned().collect())
    }

    async fn transition_fair_launch(
        &self,
        id: FairLaunchId,
        from: &[FairLaunchStatus],
        to: FairLaunchStatus,
        token_address: Option<Address>,
    ) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        match state.launches.get_mut(&id) {
            Some(launch) => apply_transition(launch, from, to, token_address),
            None => Ok(false),
        }
    }

    async fn enqueue_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<EnqueueOutcome> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.jobs.get(&id) {
            if existing.state.is_live() {
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
        }
        state.jobs.insert(id, DeploymentJob::new(id, now));
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn get_job(&self, id: FairLaunchId) -> LaunchpadResult<Option<DeploymentJob>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> LaunchpadResult<Option<DeploymentJob>> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .values()
            .filter(|job| job.is_ready(now))
            .min_by_key(|job| (job.run_at, job.fair_launch_id))
            .map(|job| job.fair_launch_id);

        let Some(id) = next else {
            return Ok(None);
        };
        let job = match state.jobs.get_mut(&id) {
            Some(job) => job,
            None => return Ok(None),
        };
        job.state = JobState::Active;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn save_job(&self, job: &DeploymentJob) -> LaunchpadResult<()> {
        self.state.lock().await.jobs.insert(job.fair_launch_id, job.clone());
        Ok(())
    }

    async fn list_jobs(&self, state_filter: JobState) -> LaunchpadResult<Vec<DeploymentJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.values().filter(|job| job.state == state_filter).cloned().collect())
    }

    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> LaunchpadResult<usize> {
        let mut state = self.state.lock().await;
        let mut reclaimed = 0;
        for job in state
            .jobs
            .values_mut()
            .filter(|job| job.state == JobState::Active && job.updated_at < stale_before)
        {
            job.state = JobState::Waiting;
            job.run_at = now;
            job.updated_at = now;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn requeue_failed_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Failed => {
                job.state = JobState::Waiting;
                job.attempts = 0;
                job.failure = None;
                job.run_at = now;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_watermark(&self, token: &Address) -> LaunchpadResult<Option<HeatWatermark>> {
        Ok(self.state.lock().await.watermarks.get(token).cloned())
    }

    async fn put_watermark(&self, watermark: &HeatWatermark) -> LaunchpadResult<()> {
        self.state.lock().await.watermarks.insert(watermark.token, watermark.clone());
        Ok(())
    }

    async fn remove_watermark(&self, token: &Address) -> LaunchpadResult<()> {
        self.state.lock().await.watermarks.remove(token);
        Ok(())
    }

    async fn insert_round(&self, round: &AirdropRound) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        let key = (round.token, round.index);
        if state.rounds.contains_key(&key) {
            return Ok(false);
        }
        state.rounds.insert(key, RoundRecord::new(round.clone()));
        Ok(true)
    }

    async fn get_round(&self, token: &Address, index: u64) -> LaunchpadResult<Option<AirdropRound>> {
        let state = self.state.lock().await;
        Ok(state.rounds.get(&(*token, index)).map(|record| record.round.clone()))
    }

    async fn count_rounds(&self, token: &Address) -> LaunchpadResult<usize> {
        let state = self.state.lock().await;
        Ok(state.rounds.keys().filter(|(t, _)| t == token).count())
    }

    async fn list_unprocessed_rounds(&self) -> LaunchpadResult<Vec<AirdropRound>> {
        let state = self.state.lock().await;
        let mut rounds: Vec<AirdropRound> = state
            .rounds
            .values()
            .filter(|record| !record.round.processed)
            .map(|record| record.round.clone())
            .collect();
        rounds.sort_by_key(|round| (round.created_at, round.index));
        Ok(rounds)
    }

    async fn stage_round(
        &self,
        token: &Address,
        index: u64,
        root: B256,
        allocations: Vec<RewardAllocation>,
    ) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        match state.rounds.get_mut(&(*token, index)) {
            Some(record) => Ok(record.stage(root, allocations)),
            None => Err(LaunchpadError::not_found("airdrop round", &format!("{}#{}", token, index))),
        }
    }

    async fn mark_round_processed(&self, token: &Address, index: u64) -> LaunchpadResult<bool> {
        let mut state = self.state.lock().await;
        match state.rounds.get_mut(&(*token, index)) {
            Some(record) if record.round.processed => Ok(false),
            Some(record) => {
                record.round.processed = true;
                Ok(true)
            }
            None => Err(LaunchpadError::not_found("airdrop round", &format!("{}#{}", token, index))),
        }
    }

    async fn allocations_for_round(&self, token: &Address, index: u64) -> LaunchpadResult<Vec<RewardAllocation>> {
        let state = self.state.lock().await;
        Ok(state
            .rounds
            .get(&(*token, index))
            .map(|record| record.allocations.clone())
            .unwrap_or_default())
    }

    async fn allocations_for_recipient(&self, recipient: &Address) -> LaunchpadResult<Vec<RewardAllocation>> {
        let state = self.state.lock().await;
        let mut allocations: Vec<RewardAllocation> = state
            .rounds
            .values()
            .flat_map(|record| record.allocations.iter())
            .filter(|allocation| &allocation.recipient == recipient)
            .cloned()
            .collect();
        sort_oldest_first(&mut allocations);
        Ok(allocations)
    }

    async fn find_unclaimed(&self, query: &ClaimQuery) -> LaunchpadResult<Vec<RewardAllocation>> {
        let state = self.state.lock().await;
        let mut matches: Vec<RewardAllocation> = state
            .rounds
            .values()
            .filter(|record| record.round.index == query.round_index)
            .flat_map(|record| record.allocations.iter())
            .filter(|allocation| query.matches(allocation))
            .cloned()
            .collect();
        sort_oldest_first(&mut matches);
        Ok(matches)
    }

    async fn claimed_by_transaction(&self, tx_hash: &B256) -> LaunchpadResult<Option<AllocationKey>> {
        Ok(self.state.lock().await.applied_claims.get(tx_hash).copied())
    }

    async fn claim_allocation(&self, key: &AllocationKey, tx_hash: B256) -> LaunchpadResult<ClaimOutcome> {
        let mut state = self.state.lock().await;
        if state.applied_claims.contains_key(&tx_hash) {
            return Ok(ClaimOutcome::TransactionAlreadyApplied);
        }

        let allocation = state
            .rounds
            .get_mut(&(key.token, key.round_index))
            .and_then(|record| record.allocations.iter_mut().find(|a| a.position == key.position));

        let outcome = match allocation {
            None => ClaimOutcome::NotFound,
            Some(allocation) if allocation.claimed => ClaimOutcome::AlreadyClaimed,
            Some(allocation) => {
                allocation.claimed = true;
                allocation.transaction_hash = Some(tx_hash);
                ClaimOutcome::Claimed
            }
        };

        if outcome == ClaimOutcome::Claimed {
            state.applied_claims.insert(tx_hash, *key);
        }
        Ok(outcome)
    }
}
