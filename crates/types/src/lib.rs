/// Shared types for the fair-launch keeper
///
/// This crate provides the persisted records, protocol constants and the
/// error taxonomy used by the keeper, its store backends and its adapters.

pub mod codec;
pub mod constants;
pub mod errors;
pub mod launch;
pub mod rewards;

// Re-export all public types
pub use constants::*;
pub use errors::*;
pub use launch::*;
pub use rewards::*;

pub use alloy_primitives::{Address, B256, U256};

/// Result type alias using the shared error type
pub type LaunchpadResult<T> = std::result::Result<T, LaunchpadError>;
