//! Deployment job queue and worker pool.
//!
//! Jobs live in the store keyed by fair-launch id, so at most one live job
//! exists per sale and every worker over the same store shares the queue.
//! A worker claims the earliest ready job, runs the deployment, and either
//! completes it, schedules a retry with exponential backoff, or fails it
//! permanently for an operator to inspect and requeue.
//!
//! A claimed job holds a lease covering one full attempt (metadata read plus
//! deployment). Only jobs whose lease has lapsed are reclaimed, so recovery
//! never takes a job from a worker that is still running it.

use std::sync::Arc;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use launchpad_types::*;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DeploymentConfig;
use crate::gateway::{with_timeout, ContractGateway};
use crate::store::{EnqueueOutcome, Store};

/// What a single `process_next` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// No job was ready
    Idle,
    Deployed { fair_launch_id: FairLaunchId, token: Address },
    /// The fair launch was deployed by an earlier execution
    AlreadyDeployed { fair_launch_id: FairLaunchId },
    Retrying { fair_launch_id: FairLaunchId, attempts: u32, run_at: DateTime<Utc> },
    Failed { fair_launch_id: FairLaunchId, reason: String },
}

/// Durable at-least-once deployment queue
pub struct DeploymentQueue {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ContractGateway>,
    config: DeploymentConfig,
    rpc_timeout: std::time::Duration,
    wake: Notify,
}

impl DeploymentQueue {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ContractGateway>,
        config: DeploymentConfig,
        rpc_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            rpc_timeout,
            wake: Notify::new(),
        }
    }

    /// Insert a Waiting job unless one is already Waiting or Active
    pub async fn enqueue(&self, fair_launch_id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<EnqueueOutcome> {
        let outcome = self.store.enqueue_job(fair_launch_id, now).await?;
        match outcome {
            EnqueueOutcome::Enqueued => {
                info!(fair_launch_id, "Deployment job enqueued");
                self.wake.notify_waiters();
            }
            EnqueueOutcome::AlreadyQueued => {
                debug!(fair_launch_id, "Deployment job already queued");
            }
        }
        Ok(outcome)
    }

    /// How long a claimed job belongs to its worker
    pub fn lease(&self) -> std::time::Duration {
        self.config.timeout() + self.rpc_timeout
    }

    /// Claim and execute the earliest job whose `run_at` has passed
    pub async fn process_next(&self, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        let Some(job) = self.store.claim_next_job(now).await? else {
            return Ok(JobOutcome::Idle);
        };

        debug!(fair_launch_id = job.fair_launch_id, attempts = job.attempts, "Executing deployment job");
        self.execute(job, now).await
    }

    async fn execute(&self, mut job: DeploymentJob, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        let id = job.fair_launch_id;

        let Some(launch) = self.store.get_fair_launch(id).await? else {
            let error = LaunchpadError::inconsistency(&format!("fair launch {} no longer exists", id));
            return self.fail(job, &error, now).await;
        };

        if launch.status == FairLaunchStatus::Deployed {
            job.state = JobState::Completed;
            job.token_address = launch.token_address;
            job.updated_at = now;
            self.store.save_job(&job).await?;
            info!(fair_launch_id = id, "Fair launch already deployed, completing job");
            return Ok(JobOutcome::AlreadyDeployed { fair_launch_id: id });
        }

        let claimable = [FairLaunchStatus::Pending, FairLaunchStatus::Completable, FairLaunchStatus::Deploying];
        if !self
            .store
            .transition_fair_launch(id, &claimable, FairLaunchStatus::Deploying, None)
            .await?
        {
            let error = LaunchpadError::inconsistency(&format!("fair launch {} is {}", id, launch.status));
            return self.fail(job, &error, now).await;
        }

        match self.deploy(id).await {
            Ok(token) => self.complete(job, token, now).await,
            Err(e) if e.is_transient() => self.retry(job, &e, now).await,
            Err(e) => self.fail(job, &e, now).await,
        }
    }

    /// Fetch metadata and run the deploy calls, each under its own deadline
    async fn deploy(&self, id: FairLaunchId) -> LaunchpadResult<Address> {
        let meta = with_timeout("get_token_meta", self.rpc_timeout, self.gateway.get_token_meta(id))
            .await?
            .ok_or_else(|| LaunchpadError::inconsistency(&format!("token metadata missing for fair launch {}", id)))?;

        with_timeout("deploy", self.config.timeout(), self.gateway.deploy(&meta)).await
    }

    async fn complete(&self, mut job: DeploymentJob, token: Address, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        let id = job.fair_launch_id;
        let recorded = self
            .store
            .transition_fair_launch(id, &[FairLaunchStatus::Deploying], FairLaunchStatus::Deployed, Some(token))
            .await?;

        job.token_address = Some(token);
        job.updated_at = now;

        if !recorded {
            if let Some(launch) = self.store.get_fair_launch(id).await? {
                if launch.status == FairLaunchStatus::Deployed {
                    if launch.token_address != Some(token) {
                        warn!(
                            fair_launch_id = id,
                            token = %token,
                            recorded = ?launch.token_address,
                            "Fair launch was deployed by another attempt"
                        );
                    }
                    job.state = JobState::Completed;
                    job.token_address = launch.token_address;
                    job.failure = None;
                    self.store.save_job(&job).await?;
                    return Ok(JobOutcome::AlreadyDeployed { fair_launch_id: id });
                }
            }

            // Contracts exist on-chain but the record moved; needs an operator
            let reason = format!("deployed {} but fair launch {} left Deploying", token, id);
            error!(fair_launch_id = id, token = %token, "{}", reason);
            job.state = JobState::Failed;
            job.failure = Some(reason.clone());
            self.store.save_job(&job).await?;
            return Ok(JobOutcome::Failed { fair_launch_id: id, reason });
        }

        job.state = JobState::Completed;
        job.failure = None;
        self.store.save_job(&job).await?;
        info!(fair_launch_id = id, token = %token, "Fair launch deployed");
        Ok(JobOutcome::Deployed { fair_launch_id: id, token })
    }

    async fn retry(&self, mut job: DeploymentJob, error: &LaunchpadError, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        job.attempts += 1;
        if job.attempts >= self.config.retry.max_attempts {
            return self.exhaust(job, error, now).await;
        }

        let id = job.fair_launch_id;
        let run_at = now + self.config.retry.delay_after_failures(job.attempts);
        job.state = JobState::Waiting;
        job.run_at = run_at;
        job.failure = Some(error.to_string());
        job.updated_at = now;
        self.store.save_job(&job).await?;

        self.store
            .transition_fair_launch(id, &[FairLaunchStatus::Deploying], FairLaunchStatus::Completable, None)
            .await?;

        warn!(
            fair_launch_id = id,
            attempts = job.attempts,
            retry_at = %run_at,
            "Deployment attempt failed: {}", error
        );
        Ok(JobOutcome::Retrying {
            fair_launch_id: id,
            attempts: job.attempts,
            run_at,
        })
    }

    /// Permanent failure without consuming the retry budget
    async fn fail(&self, mut job: DeploymentJob, error: &LaunchpadError, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        job.attempts += 1;
        self.exhaust(job, error, now).await
    }

    /// Mark the job Failed and hand the sale back as Pending
    async fn exhaust(&self, mut job: DeploymentJob, error: &LaunchpadError, now: DateTime<Utc>) -> LaunchpadResult<JobOutcome> {
        let id = job.fair_launch_id;
        let reason = error.to_string();
        job.state = JobState::Failed;
        job.failure = Some(reason.clone());
        job.updated_at = now;
        self.store.save_job(&job).await?;

        self.store
            .transition_fair_launch(
                id,
                &[FairLaunchStatus::Deploying, FairLaunchStatus::Completable],
                FairLaunchStatus::Pending,
                None,
            )
            .await?;

        error!(fair_launch_id = id, attempts = job.attempts, "Deployment job failed permanently: {}", reason);
        Ok(JobOutcome::Failed { fair_launch_id: id, reason })
    }

    /// Return Active jobs whose lease lapsed (their worker died) to Waiting
    pub async fn recover_stale_jobs(&self, now: DateTime<Utc>) -> LaunchpadResult<usize> {
        let lease = chrono::Duration::from_std(self.lease())
            .map_err(|e| LaunchpadError::invalid_config("deployment", &e.to_string()))?;
        let reclaimed = self.store.reclaim_stale_jobs(now - lease, now).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed stale deployment jobs");
            self.wake.notify_waiters();
        }
        Ok(reclaimed)
    }

    /// Operator remediation: reset a Failed job to Waiting with a fresh budget
    pub async fn requeue(&self, fair_launch_id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<bool> {
        let requeued = self.store.requeue_failed_job(fair_launch_id, now).await?;
        if requeued {
            info!(fair_launch_id, "Failed deployment job requeued");
            self.wake.notify_waiters();
        }
        Ok(requeued)
    }

    pub async fn job(&self, fair_launch_id: FairLaunchId) -> LaunchpadResult<Option<DeploymentJob>> {
        self.store.get_job(fair_launch_id).await
    }

    pub async fn jobs(&self, state: JobState) -> LaunchpadResult<Vec<DeploymentJob>> {
        self.store.list_jobs(state).await
    }

    pub async fn failed_jobs(&self) -> LaunchpadResult<Vec<DeploymentJob>> {
        self.jobs(JobState::Failed).await
    }

    /// Spawn the configured number of workers
    pub fn run_workers(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|worker_id| tokio::spawn(self.clone().worker(worker_id, shutdown.clone())))
            .collect()
    }

    /// Shutdown interrupts an in-flight attempt; its job stays Active until its
    /// lease lapses and recovery reclaims it
    async fn worker(self: Arc<Self>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id, "Deployment worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.process_next(Utc::now()) => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(JobOutcome::Idle) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval()) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(outcome) => debug!(worker_id, ?outcome, "Deployment job processed"),
                Err(e) => {
                    error!(worker_id, "Deployment worker error: {}", e);
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }

        info!(worker_id, "Deployment worker stopped");
    }
}
