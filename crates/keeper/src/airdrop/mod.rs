//! Merkle reward rounds.

pub mod engine;
pub mod merkle;

pub use engine::{build_allocations, select_recipients, AirdropEngine, RoundOutcome, SkipReason, SweepReport};
pub use merkle::{hash_pair, reward_leaf, verify_proof, MerkleTree};
