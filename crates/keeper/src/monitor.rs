//! Sale lifecycle monitor

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use launchpad_types::*;
use tracing::{debug, error, info};

use crate::deployment::DeploymentQueue;
use crate::gateway::{with_timeout, ContractGateway};
use crate::store::{EnqueueOutcome, Store};

/// How one due sale was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleDecision {
    Enqueued,
    AlreadyQueued,
    Refunded,
    StillPending,
    /// A previous deployment job failed permanently and awaits an operator
    Held,
}

/// Per-scan counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub enqueued: usize,
    pub already_queued: usize,
    pub refunded: usize,
    pub still_pending: usize,
    pub held: usize,
    pub errors: usize,
}

/// Classifies ended sales and routes them to deployment or refund
pub struct SaleMonitor {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ContractGateway>,
    queue: Arc<DeploymentQueue>,
    rpc_timeout: Duration,
}

impl SaleMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ContractGateway>,
        queue: Arc<DeploymentQueue>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            queue,
            rpc_timeout,
        }
    }

    /// Check every Pending sale whose end time has passed
    pub async fn scan(&self, now: DateTime<Utc>) -> LaunchpadResult<ScanReport> {
        let mut report = ScanReport::default();

        let due: Vec<FairLaunch> = self
            .store
            .list_fair_launches(FairLaunchStatus::Pending)
            .await?
            .into_iter()
            .filter(|launch| launch.is_due(now))
            .collect();

        for launch in &due {
            report.scanned += 1;
            match self.check(launch, now).await {
                Ok(SaleDecision::Enqueued) => report.enqueued += 1,
                Ok(SaleDecision::AlreadyQueued) => report.already_queued += 1,
                Ok(SaleDecision::Refunded) => report.refunded += 1,
                Ok(SaleDecision::StillPending) => report.still_pending += 1,
                Ok(SaleDecision::Held) => report.held += 1,
                Err(e) => {
                    error!(fair_launch_id = launch.id, "Failed to check sale: {}", e);
                    report.errors += 1;
                    // Continue with other sales
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                enqueued = report.enqueued,
                refunded = report.refunded,
                errors = report.errors,
                "Sale scan complete"
            );
        }

        Ok(report)
    }

    async fn check(&self, launch: &FairLaunch, now: DateTime<Utc>) -> LaunchpadResult<SaleDecision> {
        let id = launch.id;

        if let Some(job) = self.store.get_job(id).await? {
            if job.state == JobState::Failed {
                debug!(fair_launch_id = id, "Deployment job failed permanently, waiting for requeue");
                return Ok(SaleDecision::Held);
            }
        }

        let state = with_timeout("get_sale_state", self.rpc_timeout, self.gateway.get_sale_state(id)).await?;

        if state.completable {
            let outcome = self.queue.enqueue(id, now).await?;
            self.store
                .transition_fair_launch(id, &[FairLaunchStatus::Pending], FairLaunchStatus::Completable, None)
                .await?;
            return Ok(match outcome {
                EnqueueOutcome::Enqueued => SaleDecision::Enqueued,
                EnqueueOutcome::AlreadyQueued => SaleDecision::AlreadyQueued,
            });
        }

        if state.refundable {
            if self
                .store
                .transition_fair_launch(id, &[FairLaunchStatus::Pending], FairLaunchStatus::Failed, None)
                .await?
            {
                info!(fair_launch_id = id, "Sale refundable, marked failed");
            }
            return Ok(SaleDecision::Refunded);
        }

        debug!(fair_launch_id = id, "Sale not yet classified");
        Ok(SaleDecision::StillPending)
    }
}
