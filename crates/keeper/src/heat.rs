//! Heat aggregation.
//!
//! Engagement on a token's linked social accounts is weighted into a single
//! heat delta. All tokens that clear the threshold go out in one batched
//! write, and watermarks are refreshed from the contract afterwards.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use launchpad_types::*;
use tracing::{debug, error, info, warn};

use crate::config::HeatConfig;
use crate::gateway::{with_timeout, ContractGateway, HeatUpdate};
use crate::social::SocialMetricsSource;
use crate::store::Store;

/// Per-cycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeatReport {
    pub tokens: usize,
    pub submitted: usize,
    pub below_threshold: usize,
    pub errors: usize,
    pub tx_hash: Option<B256>,
}

pub struct HeatAggregator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ContractGateway>,
    social: Arc<dyn SocialMetricsSource>,
    config: HeatConfig,
    rpc_timeout: Duration,
}

impl HeatAggregator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ContractGateway>,
        social: Arc<dyn SocialMetricsSource>,
        config: HeatConfig,
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

    /// Weighted engagement across every linked account since `since`
    pub async fn compute_delta(&self, launch: &FairLaunch, since: DateTime<Utc>) -> LaunchpadResult<u64> {
        let mut delta = 0u64;
        for account in &launch.socials {
            let counters = self.social.get_engagement_since(account, since).await?;
            let score = self.config.weights.for_platform(account.platform).score(&counters);
            debug!(account = %account, score, "Engagement scored");
            delta = delta.saturating_add(score);
        }
        Ok(delta)
    }

    /// Whether a delta may be committed against the watermark at `now`
    pub fn should_commit(&self, delta: u64, watermark: &HeatWatermark, now: DateTime<Utc>) -> bool {
        delta > self.config.min_heat_update
            && now > watermark.last_heat_update
            && (now - watermark.last_heat_update).num_seconds() >= self.config.min_update_interval_secs
    }

    /// Stored watermark, or one seeded from the contract
    async fn watermark(&self, token: &Address) -> LaunchpadResult<HeatWatermark> {
        if let Some(watermark) = self.store.get_watermark(token).await? {
            return Ok(watermark);
        }
        let watermark = self.read_chain(token).await?;
        self.store.put_watermark(&watermark).await?;
        Ok(watermark)
    }

    async fn read_chain(&self, token: &Address) -> LaunchpadResult<HeatWatermark> {
        let reading = with_timeout("get_heat", self.rpc_timeout, self.gateway.get_heat(token)).await?;
        Ok(HeatWatermark {
            token: *token,
            heat: reading.heat,
            last_heat_update: reading.last_update,
            last_engagement_boost: reading.last_boost,
        })
    }

    async fn candidate(&self, launch: &FairLaunch, token: &Address, now: DateTime<Utc>) -> LaunchpadResult<Option<u64>> {
        let watermark = self.watermark(token).await?;
        let delta = self.compute_delta(launch, watermark.last_heat_update).await?;
        if self.should_commit(delta, &watermark, now) {
            Ok(Some(delta))
        } else {
            debug!(token = %token, delta, "Heat delta below threshold or watermark not passed");
            Ok(None)
        }
    }

    /// One aggregation pass over every deployed token.
    ///
    /// A failing token is left out of the batch; a failing batch write fails
    /// the cycle and leaves every watermark untouched.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> LaunchpadResult<HeatReport> {
        let mut report = HeatReport::default();
        let mut updates = Vec::new();

        for launch in self.store.list_fair_launches(FairLaunchStatus::Deployed).await? {
            let Some(token) = launch.token_address else {
                continue;
            };
            report.tokens += 1;

            match self.candidate(&launch, &token, now).await {
                Ok(Some(heat)) => updates.push(HeatUpdate { token, heat }),
                Ok(None) => report.below_threshold += 1,
                Err(e) => {
                    error!(fair_launch_id = launch.id, token = %token, "Failed to compute heat: {}", e);
                    report.errors += 1;
                    // Continue with other tokens
                }
            }
        }

        if updates.is_empty() {
            debug!(tokens = report.tokens, "No heat updates to submit");
            return Ok(report);
        }

        let receipt = with_timeout("submit_heat_batch", self.rpc_timeout, self.gateway.submit_heat_batch(&updates)).await?;
        report.submitted = updates.len();
        report.tx_hash = Some(receipt.tx_hash);
        info!(tokens = updates.len(), tx = %receipt.tx_hash, "Heat batch submitted");

        for update in &updates {
            match self.read_chain(&update.token).await {
                Ok(watermark) => self.store.put_watermark(&watermark).await?,
                Err(e) => {
                    // Re-seed from the contract next cycle rather than trust a local value
                    warn!(token = %update.token, "Failed to refresh heat watermark: {}", e);
                    self.store.remove_watermark(&update.token).await?;
                }
            }
        }

        Ok(report)
    }
}
