/// Airdrop round and reward allocation records

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Airdrop Round
// ============================================================================

/// Kind of reward round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundType {
    /// First round of a token
    Initial,
    /// Every later round, funded by engagement
    Engagement,
}

impl fmt::Display for RoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundType::Initial => f.write_str("initial"),
            RoundType::Engagement => f.write_str("engagement"),
        }
    }
}

/// One Merkle-anchored batch of rewards for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirdropRound {
    pub token: Address,
    pub index: u64,
    pub round_type: RoundType,
    /// Maximum recipients sampled into the round
    pub limit: u32,
    pub max_amount: U256,
    /// Set once, together with the round's allocations
    pub merkle_root: Option<B256>,
    /// The contract holds a root for this round
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl AirdropRound {
    pub fn new(
        token: Address,
        index: u64,
        round_type: RoundType,
        limit: u32,
        max_amount: U256,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            index,
            round_type,
            limit,
            max_amount,
            merkle_root: None,
            processed: false,
            created_at: now,
        }
    }

    /// Tree built and persisted but not yet confirmed on-chain
    pub fn is_staged(&self) -> bool {
        self.merkle_root.is_some() && !self.processed
    }
}

// ============================================================================
// Reward Allocation
// ============================================================================

/// Identity of an allocation: its round and its leaf position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationKey {
    pub token: Address,
    pub round_index: u64,
    pub position: u32,
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.token, self.round_index, self.position)
    }
}

/// A recipient's share of a round with its inclusion proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardAllocation {
    pub token: Address,
    pub round_index: u64,
    /// Leaf position in the round's tree
    pub position: u32,
    pub recipient: Address,
    pub amount: U256,
    pub leaf: B256,
    /// Sibling hashes from leaf to root
    pub proof: Vec<B256>,
    pub claimed: bool,
    pub transaction_hash: Option<B256>,
    pub created_at: DateTime<Utc>,
}

impl RewardAllocation {
    pub fn key(&self) -> AllocationKey {
        AllocationKey {
            token: self.token,
            round_index: self.round_index,
            position: self.position,
        }
    }

    /// Ordering used to break ties between equal claim candidates: oldest first
    pub fn age_order(&self) -> (DateTime<Utc>, AllocationKey) {
        (self.created_at, self.key())
    }
}
