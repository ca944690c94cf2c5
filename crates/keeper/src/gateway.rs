//! Contract gateway capability.
//!
//! Every read or write against the factory and airdrop contracts goes through
//! [`ContractGateway`], injected into the components that need it so they can
//! run against a relayer in production and a fake in tests.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::{BattleId, FairLaunchId, LaunchpadError, LaunchpadResult};
use serde::{Deserialize, Serialize};

/// Sale classification reported by the factory contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleState {
    pub completable: bool,
    pub refundable: bool,
}

/// Token parameters needed to deploy a fair launch's contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMeta {
    pub fair_launch_id: FairLaunchId,
    pub name: String,
    pub ticker: String,
    pub creator: Address,
}

/// One entry of a batched heat write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatUpdate {
    pub token: Address,
    pub heat: u64,
}

/// On-chain heat state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatReading {
    pub heat: u64,
    pub last_update: DateTime<Utc>,
    pub last_boost: u64,
}

/// Confirmation of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Reads and writes against the launch contracts
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Completable/refundable classification of a sale
    async fn get_sale_state(&self, id: FairLaunchId) -> LaunchpadResult<SaleState>;

    /// Token metadata recorded by the factory, `None` if it has none
    async fn get_token_meta(&self, id: FairLaunchId) -> LaunchpadResult<Option<TokenMeta>>;

    /// Deploy the token contracts and register them with the factory
    async fn deploy(&self, meta: &TokenMeta) -> LaunchpadResult<Address>;

    /// Apply heat increments for several tokens in one transaction
    async fn submit_heat_batch(&self, updates: &[HeatUpdate]) -> LaunchpadResult<TxReceipt>;

    async fn get_heat(&self, token: &Address) -> LaunchpadResult<HeatReading>;

    /// Set the round root; fails with [`LaunchpadError::RootAlreadySet`] if the
    /// contract already holds one for `(token, index)`
    async fn submit_merkle_root(&self, token: &Address, root: B256, index: u64) -> LaunchpadResult<TxReceipt>;

    /// Battles whose outcome can be settled now
    async fn get_battles_to_resolve(&self) -> LaunchpadResult<Vec<BattleId>>;

    async fn resolve_battle(&self, id: BattleId) -> LaunchpadResult<TxReceipt>;
}

/// Bound an upstream call; an elapsed deadline counts as a failure
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> LaunchpadResult<T>
where
    F: Future<Output = LaunchpadResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LaunchpadError::timeout(operation, timeout.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let result: LaunchpadResult<()> = with_timeout("deploy", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(LaunchpadError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "deploy");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_passes_through_result() {
        let result = with_timeout("get_heat", Duration::from_secs(1), async { Ok(7u64) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
