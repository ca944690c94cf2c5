//! Battle settlement

use std::sync::Arc;
use std::time::Duration;

use launchpad_types::*;
use tracing::{debug, error, info};

use crate::gateway::{with_timeout, ContractGateway};

/// Per-cycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub pending: usize,
    pub resolved: Vec<BattleId>,
    pub errors: usize,
}

/// Settles every battle the resolver contract reports as due
pub struct BattleResolver {
    gateway: Arc<dyn ContractGateway>,
    rpc_timeout: Duration,
}

impl BattleResolver {
    pub fn new(gateway: Arc<dyn ContractGateway>, rpc_timeout: Duration) -> Self {
        Self { gateway, rpc_timeout }
    }

    /// One pass over the due battles. A battle that fails to resolve is
    /// reported again by the contract and retried next cycle.
    pub async fn run_cycle(&self) -> LaunchpadResult<ResolveReport> {
        let pending = with_timeout("get_battles_to_resolve", self.rpc_timeout, self.gateway.get_battles_to_resolve()).await?;
        let mut report = ResolveReport {
            pending: pending.len(),
            ..ResolveReport::default()
        };

        for id in pending {
            match with_timeout("resolve_battle", self.rpc_timeout, self.gateway.resolve_battle(id)).await {
                Ok(receipt) => {
                    debug!(battle_id = id, tx = %receipt.tx_hash, "Battle resolved");
                    report.resolved.push(id);
                }
                Err(e) => {
                    error!(battle_id = id, "Failed to resolve battle: {}", e);
                    report.errors += 1;
                    // Continue with other battles
                }
            }
        }

        if report.pending > 0 {
            info!(
                pending = report.pending,
                resolved = report.resolved.len(),
                errors = report.errors,
                "Battle resolution complete"
            );
        }

        Ok(report)
    }
}
