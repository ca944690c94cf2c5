use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use launchpad_types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::merkle::{reward_leaf, verify_proof, MerkleTree};
use crate::config::AirdropConfig;
use crate::gateway::{with_timeout, ContractGateway};
use crate::social::SocialMetricsSource;
use crate::store::Store;

/// Why a round was left for a later sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No Deployed fair launch owns the token yet
    TokenNotDeployed,
    InsufficientFollowers { followers: usize, required: usize },
    /// `max_amount` split across the recipients rounds down to zero
    AmountTooSmall,
}

/// Result of driving one round towards an on-chain root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Submitted { root: B256, recipients: usize, tx_hash: B256 },
    /// The contract already held a root for this round
    AlreadySet { root: B256 },
    AlreadyProcessed,
    Skipped(SkipReason),
}

/// Counters for one sweep over unprocessed rounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Builds reward trees, anchors their roots on-chain and serves proofs
pub struct AirdropEngine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ContractGateway>,
    social: Arc<dyn SocialMetricsSource>,
    config: AirdropConfig,
    rpc_timeout: Duration,
}

/// Uniform sample without replacement once the pool exceeds `limit`
pub fn select_recipients<R: Rng + ?Sized>(candidates: Vec<Address>, limit: usize, rng: &mut R) -> Vec<Address> {
    if candidates.len() <= limit {
        return candidates;
    }
    candidates.choose_multiple(rng, limit).copied().collect()
}

/// Equal split of `max_amount`, one leaf per recipient in the given order.
/// Returns `None` when the share rounds down to zero.
pub fn build_allocations(
    token: &Address,
    index: u64,
    recipients: &[Address],
    max_amount: U256,
    now: DateTime<Utc>,
) -> Option<(MerkleTree, Vec<RewardAllocation>)> {
    if recipients.is_empty() {
        return None;
    }
    let amount = max_amount / U256::from(recipients.len());
    if amount.is_zero() {
        return None;
    }

    let leaves: Vec<B256> = recipients
        .iter()
        .map(|recipient| reward_leaf(token, recipient, amount, index))
        .collect();
    let tree = MerkleTree::new(leaves);

    let allocations = recipients
        .iter()
        .enumerate()
        .map(|(position, recipient)| RewardAllocation {
            token: *token,
            round_index: index,
            position: position as u32,
            recipient: *recipient,
            amount,
            leaf: tree.leaves()[position],
            proof: tree.proof(position).unwrap_or_default(),
            claimed: false,
            transaction_hash: None,
            created_at: now,
        })
        .collect();

    Some((tree, allocations))
}

impl AirdropEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ContractGateway>,
        social: Arc<dyn SocialMetricsSource>,
        config: AirdropConfig,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            social,
            config,
            rpc_timeout,
        }
    }

    /// Stage the round's tree if needed and submit its root.
    ///
    /// A staged round keeps its root across retries, so a submission that
    /// landed before a crash is recognised through the contract's
    /// already-set rejection.
    pub async fn open_round(&self, token: &Address, index: u64, now: DateTime<Utc>) -> LaunchpadResult<RoundOutcome> {
        let round = self
            .store
            .get_round(token, index)
            .await?
            .ok_or_else(|| LaunchpadError::not_found("airdrop round", &format!("{}#{}", token, index)))?;

        if round.processed {
            debug!(token = %token, index, "Round already processed");
            return Ok(RoundOutcome::AlreadyProcessed);
        }

        let (root, recipients) = match round.merkle_root {
            Some(root) => {
                let staged = self.store.allocations_for_round(token, index).await?;
                (root, staged.len())
            }
            None => match self.stage(&round, now).await? {
                Ok(staged) => staged,
                Err(reason) => {
                    info!(token = %token, index, ?reason, "Skipping airdrop round");
                    return Ok(RoundOutcome::Skipped(reason));
                }
            },
        };

        let submission = with_timeout(
            "submit_merkle_root",
            self.rpc_timeout,
            self.gateway.submit_merkle_root(token, root, index),
        )
        .await;

        match submission {
            Ok(receipt) => {
                self.store.mark_round_processed(token, index).await?;
                info!(token = %token, index, root = %root, recipients, tx = %receipt.tx_hash, "Merkle root submitted");
                Ok(RoundOutcome::Submitted {
                    root,
                    recipients,
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(e) if e.is_duplicate() => {
                self.store.mark_round_processed(token, index).await?;
                info!(token = %token, index, "Merkle root already set on-chain, round marked processed");
                Ok(RoundOutcome::AlreadySet { root })
            }
            Err(e) => {
                warn!(token = %token, index, "Merkle root submission failed: {}", e);
                Err(e)
            }
        }
    }

    /// Select recipients, build the tree and persist it with the round.
    /// The inner `Err` carries the reason a round cannot be distributed yet.
    async fn stage(
        &self,
        round: &AirdropRound,
        now: DateTime<Utc>,
    ) -> LaunchpadResult<Result<(B256, usize), SkipReason>> {
        // The opening event can overtake the deployment's own bookkeeping
        let launch = match self.store.find_fair_launch_by_token(&round.token).await? {
            Some(launch) if launch.status == FairLaunchStatus::Deployed => launch,
            _ => return Ok(Err(SkipReason::TokenNotDeployed)),
        };

        let mut followers = BTreeSet::new();
        for account in &launch.socials {
            followers.extend(self.social.get_followers(account).await?);
        }

        if followers.len() < self.config.min_followers {
            return Ok(Err(SkipReason::InsufficientFollowers {
                followers: followers.len(),
                required: self.config.min_followers,
            }));
        }

        let limit = round.limit.min(self.config.round_limit) as usize;
        let recipients = select_recipients(followers.into_iter().collect(), limit, &mut rand::thread_rng());

        let Some((tree, allocations)) = build_allocations(&round.token, round.index, &recipients, round.max_amount, now)
        else {
            return Ok(Err(SkipReason::AmountTooSmall));
        };

        let root = tree.root();
        let count = allocations.len();
        if !self.store.stage_round(&round.token, round.index, root, allocations).await? {
            // Raced with another sweep; use whatever it staged
            let staged = self
                .store
                .get_round(&round.token, round.index)
                .await?
                .and_then(|r| r.merkle_root)
                .ok_or_else(|| LaunchpadError::inconsistency("round lost its staged root"))?;
            let recipients = self.store.allocations_for_round(&round.token, round.index).await?.len();
            return Ok(Ok((staged, recipients)));
        }

        debug!(token = %round.token, index = round.index, root = %root, recipients = count, "Staged airdrop round");
        Ok(Ok((root, count)))
    }

    /// Retry every round that has no confirmed root yet
    pub async fn process_pending_rounds(&self, now: DateTime<Utc>) -> LaunchpadResult<SweepReport> {
        let mut report = SweepReport::default();

        for round in self.store.list_unprocessed_rounds().await? {
            match self.open_round(&round.token, round.index, now).await {
                Ok(RoundOutcome::Skipped(_)) => report.skipped += 1,
                Ok(_) => report.processed += 1,
                Err(e) => {
                    error!(token = %round.token, index = round.index, "Failed to process airdrop round: {}", e);
                    report.failed += 1;
                    // Continue with other rounds
                }
            }
        }

        Ok(report)
    }

    /// The user's unclaimed allocation in a round, checked against the root
    pub async fn claim_for(&self, token: &Address, user: &Address, index: u64) -> LaunchpadResult<Option<RewardAllocation>> {
        let Some(round) = self.store.get_round(token, index).await? else {
            return Ok(None);
        };
        let Some(root) = round.merkle_root else {
            return Ok(None);
        };

        let allocation = self
            .store
            .allocations_for_round(token, index)
            .await?
            .into_iter()
            .find(|a| &a.recipient == user && !a.claimed);

        match allocation {
            Some(allocation) if !verify_proof(&allocation.leaf, &allocation.proof, &root) => Err(LaunchpadError::inconsistency(
                &format!("stored proof for {} does not verify against round root", allocation.key()),
            )),
            other => Ok(other),
        }
    }

    /// Every allocation held by a user, oldest first
    pub async fn rewards_for(&self, user: &Address) -> LaunchpadResult<Vec<RewardAllocation>> {
        self.store.allocations_for_recipient(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn addresses(count: u8) -> Vec<Address> {
        (1..=count).map(Address::repeat_byte).collect()
    }

    #[test]
    fn test_select_keeps_everyone_under_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select_recipients(addresses(3), 5, &mut rng), addresses(3));
    }

    #[test]
    fn test_select_samples_without_replacement() {
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_recipients(addresses(50), 10, &mut rng);
        assert_eq!(selected.len(), 10);

        let unique: BTreeSet<_> = selected.iter().collect();
        assert_eq!(unique.len(), 10);
        assert!(selected.iter().all(|a| addresses(50).contains(a)));
    }

    #[test]
    fn test_equal_split() {
        let token = Address::repeat_byte(0x11);
        let (tree, allocations) = build_allocations(&token, 1, &addresses(4), U256::from(1000), Utc::now()).unwrap();

        assert_eq!(allocations.len(), 4);
        for allocation in &allocations {
            assert_eq!(allocation.amount, U256::from(250));
            assert_eq!(allocation.proof.len(), 2);
            assert!(verify_proof(&allocation.leaf, &allocation.proof, &tree.root()));
        }
    }

    #[test]
    fn test_split_rounding_down_to_zero() {
        let token = Address::repeat_byte(0x11);
        assert!(build_allocations(&token, 1, &addresses(4), U256::from(3), Utc::now()).is_none());
        assert!(build_allocations(&token, 1, &[], U256::from(1000), Utc::now()).is_none());
    }
}
