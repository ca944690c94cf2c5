//! Persistent state port.
//!
//! Every mutating operation is a single conditional step (create-if-absent or
//! compare-and-set) evaluated by the backend, so idempotency holds with several
//! keeper processes sharing one store.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::*;

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Result of a conditional job insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A Waiting or Active job already exists for the fair launch
    AlreadyQueued,
}

/// Result of applying a claim to an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
    /// The transaction hash was already applied to some allocation
    TransactionAlreadyApplied,
    NotFound,
}

/// Filter for unclaimed allocations matching a claim notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimQuery {
    pub recipient: Address,
    pub amount: U256,
    pub round_index: u64,
    /// Narrows the match when the notification names its token
    pub token: Option<Address>,
}

impl ClaimQuery {
    pub fn matches(&self, allocation: &RewardAllocation) -> bool {
        !allocation.claimed
            && allocation.recipient == self.recipient
            && allocation.amount == self.amount
            && allocation.round_index == self.round_index
            && self.token.map_or(true, |token| token == allocation.token)
    }
}

/// Storage port for every record the keeper owns
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Fair launches
    // ------------------------------------------------------------------

    /// Insert unless a record with the same id exists; returns whether inserted
    async fn insert_fair_launch(&self, launch: &FairLaunch) -> LaunchpadResult<bool>;

    async fn get_fair_launch(&self, id: FairLaunchId) -> LaunchpadResult<Option<FairLaunch>>;

    async fn find_fair_launch_by_token(&self, token: &Address) -> LaunchpadResult<Option<FairLaunch>>;

    async fn list_fair_launches(&self, status: FairLaunchStatus) -> LaunchpadResult<Vec<FairLaunch>>;

    /// Move to `to` if the current status is one of `from`. The token address
    /// is set when moving to Deployed and cleared otherwise.
    async fn transition_fair_launch(
        &self,
        id: FairLaunchId,
        from: &[FairLaunchStatus],
        to: FairLaunchStatus,
        token_address: Option<Address>,
    ) -> LaunchpadResult<bool>;

    // ------------------------------------------------------------------
    // Deployment jobs
    // ------------------------------------------------------------------

    /// Insert a Waiting job unless a live one exists for the fair launch
    async fn enqueue_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<EnqueueOutcome>;

    async fn get_job(&self, id: FairLaunchId) -> LaunchpadResult<Option<DeploymentJob>>;

    /// Atomically move the earliest ready Waiting job to Active
    async fn claim_next_job(&self, now: DateTime<Utc>) -> LaunchpadResult<Option<DeploymentJob>>;

    async fn save_job(&self, job: &DeploymentJob) -> LaunchpadResult<()>;

    async fn list_jobs(&self, state: JobState) -> LaunchpadResult<Vec<DeploymentJob>>;

    /// Move Active jobs last touched before `stale_before` back to Waiting.
    /// A job still inside its lease belongs to a live worker and is left alone.
    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> LaunchpadResult<usize>;

    /// Reset a Failed job to Waiting with zero attempts
    async fn requeue_failed_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<bool>;

    // ------------------------------------------------------------------
    // Heat watermarks
    // ------------------------------------------------------------------

    async fn get_watermark(&self, token: &Address) -> LaunchpadResult<Option<HeatWatermark>>;

    async fn put_watermark(&self, watermark: &HeatWatermark) -> LaunchpadResult<()>;

    async fn remove_watermark(&self, token: &Address) -> LaunchpadResult<()>;

    // ------------------------------------------------------------------
    // Airdrop rounds and allocations
    // ------------------------------------------------------------------

    /// Insert unless a round exists for `(token, index)`
    async fn insert_round(&self, round: &AirdropRound) -> LaunchpadResult<bool>;

    async fn get_round(&self, token: &Address, index: u64) -> LaunchpadResult<Option<AirdropRound>>;

    async fn count_rounds(&self, token: &Address) -> LaunchpadResult<usize>;

    async fn list_unprocessed_rounds(&self) -> LaunchpadResult<Vec<AirdropRound>>;

    /// Set the root and persist the allocations, only if no root is set yet
    async fn stage_round(
        &self,
        token: &Address,
        index: u64,
        root: B256,
        allocations: Vec<RewardAllocation>,
    ) -> LaunchpadResult<bool>;

    /// Flag the round processed; false if it already was
    async fn mark_round_processed(&self, token: &Address, index: u64) -> LaunchpadResult<bool>;

    async fn allocations_for_round(&self, token: &Address, index: u64) -> LaunchpadResult<Vec<RewardAllocation>>;

    async fn allocations_for_recipient(&self, recipient: &Address) -> LaunchpadResult<Vec<RewardAllocation>>;

    /// Unclaimed allocations matching the query, oldest first
    async fn find_unclaimed(&self, query: &ClaimQuery) -> LaunchpadResult<Vec<RewardAllocation>>;

    /// Allocation a claim transaction was applied to, if any
    async fn claimed_by_transaction(&self, tx_hash: &B256) -> LaunchpadResult<Option<AllocationKey>>;

    /// Flip `claimed` false to true, recording the transaction hash once
    async fn claim_allocation(&self, key: &AllocationKey, tx_hash: B256) -> LaunchpadResult<ClaimOutcome>;

    /// Persist buffered writes; called on shutdown
    async fn flush(&self) -> LaunchpadResult<()> {
        Ok(())
    }
}

/// A round held together with its allocations
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoundRecord {
    pub round: AirdropRound,
    pub allocations: Vec<RewardAllocation>,
}

impl RoundRecord {
    pub fn new(round: AirdropRound) -> Self {
        Self {
            round,
            allocations: Vec::new(),
        }
    }

    /// Set root and allocations once
    pub fn stage(&mut self, root: B256, allocations: Vec<RewardAllocation>) -> bool {
        if self.round.merkle_root.is_some() {
            return false;
        }
        self.round.merkle_root = Some(root);
        self.allocations = allocations;
        true
    }
}

/// Oldest first, ties broken by round and leaf position
pub(crate) fn sort_oldest_first(allocations: &mut [RewardAllocation]) {
    allocations.sort_by(|a, b| a.age_order().cmp(&b.age_order()));
}

/// Apply a status transition to a record, keeping address and status in step
pub(crate) fn apply_transition(
    launch: &mut FairLaunch,
    from: &[FairLaunchStatus],
    to: FairLaunchStatus,
    token_address: Option<Address>,
) -> LaunchpadResult<bool> {
    if !from.contains(&launch.status) {
        return Ok(false);
    }
    if to == FairLaunchStatus::Deployed && token_address.is_none() {
        return Err(LaunchpadError::invalid_parameter("token_address", "none", "deployed token address"));
    }
    launch.status = to;
    launch.token_address = if to == FairLaunchStatus::Deployed { token_address } else { None };
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_transition_keeps_address_invariant() {
        let mut launch = FairLaunch::new(1, Address::ZERO, "Heat", "HEAT", Utc::now());
        let token = Address::repeat_byte(0xaa);

        assert!(!apply_transition(&mut launch, &[FairLaunchStatus::Deploying], FairLaunchStatus::Deployed, Some(token)).unwrap());
        assert!(apply_transition(&mut launch, &[FairLaunchStatus::Pending], FairLaunchStatus::Deploying, Some(token)).unwrap());
        assert_eq!(launch.token_address, None);

        assert!(apply_transition(&mut launch, &[FairLaunchStatus::Deploying], FairLaunchStatus::Deployed, Some(token)).unwrap());
        assert_eq!(launch.token_address, Some(token));
        assert!(launch.is_consistent());
    }

    #[test]
    fn test_deployed_requires_address() {
        let mut launch = FairLaunch::new(1, Address::ZERO, "Heat", "HEAT", Utc::now());
        let result = apply_transition(&mut launch, &[FairLaunchStatus::Pending], FairLaunchStatus::Deployed, None);
        assert!(result.is_err());
        assert_eq!(launch.status, FairLaunchStatus::Pending);
    }
}
