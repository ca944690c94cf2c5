use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use launchpad_types::*;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::{HttpSocialSource, RelayerGateway};
use crate::airdrop::AirdropEngine;
use crate::battle::BattleResolver;
use crate::config::KeeperConfig;
use crate::deployment::DeploymentQueue;
use crate::dispatch::{drive, ticker};
use crate::gateway::ContractGateway;
use crate::heat::HeatAggregator;
use crate::monitor::SaleMonitor;
use crate::social::SocialMetricsSource;
use crate::store::{MemoryStore, SledStore, Store};
use crate::webhook::{router, ApiState, Delivery, WebhookReconciler};

/// Job queue snapshot for operators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub waiting_jobs: usize,
    pub active_jobs: usize,
    pub failed_jobs: usize,
    pub unprocessed_rounds: usize,
}

/// Keeper runtime wiring every component to one store and one gateway
pub struct Keeper {
    /// Keeper configuration
    config: KeeperConfig,

    /// Shared persistent state
    store: Arc<dyn Store>,

    /// Deployment job queue and worker pool
    queue: Arc<DeploymentQueue>,

    /// Periodic sale classifier
    monitor: Arc<SaleMonitor>,

    /// Periodic heat batcher
    heat: Arc<HeatAggregator>,

    /// Merkle round builder
    engine: Arc<AirdropEngine>,

    /// Notification consumer
    reconciler: Arc<WebhookReconciler>,

    /// Periodic battle settlement
    battles: Arc<BattleResolver>,
}

impl Keeper {
    /// Wire components over injected capabilities
    pub fn new(
        config: KeeperConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn ContractGateway>,
        social: Arc<dyn SocialMetricsSource>,
    ) -> Self {
        let rpc_timeout = config.rpc_timeout();

        let queue = Arc::new(DeploymentQueue::new(
            store.clone(),
            gateway.clone(),
            config.deployment.clone(),
            rpc_timeout,
        ));
        let monitor = Arc::new(SaleMonitor::new(store.clone(), gateway.clone(), queue.clone(), rpc_timeout));
        let heat = Arc::new(HeatAggregator::new(
            store.clone(),
            gateway.clone(),
            social.clone(),
            config.heat.clone(),
            rpc_timeout,
        ));
        let battles = Arc::new(BattleResolver::new(gateway.clone(), rpc_timeout));
        let engine = Arc::new(AirdropEngine::new(
            store.clone(),
            gateway,
            social,
            config.airdrop.clone(),
            rpc_timeout,
        ));
        let reconciler = Arc::new(WebhookReconciler::new(store.clone(), engine.clone(), config.airdrop.clone()));

        Self {
            config,
            store,
            queue,
            monitor,
            heat,
            engine,
            reconciler,
            battles,
        }
    }

    /// Build the production store and HTTP adapters from configuration
    pub fn from_config(config: KeeperConfig) -> LaunchpadResult<Self> {
        let store: Arc<dyn Store> = match &config.storage.path {
            Some(path) => {
                info!("Using sled store at {}", path.display());
                Arc::new(SledStore::open(path)?)
            }
            None => {
                warn!("No storage path configured, state will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let request_timeout = Duration::from_secs(config.upstream.request_timeout_secs);
        let gateway = Arc::new(RelayerGateway::new(&config.upstream.relayer_url, request_timeout)?);
        let social = Arc::new(HttpSocialSource::new(&config.upstream.social_url, request_timeout)?);

        Ok(Self::new(config, store, gateway, social))
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn queue(&self) -> Arc<DeploymentQueue> {
        self.queue.clone()
    }

    pub fn monitor(&self) -> Arc<SaleMonitor> {
        self.monitor.clone()
    }

    pub fn heat(&self) -> Arc<HeatAggregator> {
        self.heat.clone()
    }

    pub fn engine(&self) -> Arc<AirdropEngine> {
        self.engine.clone()
    }

    pub fn reconciler(&self) -> Arc<WebhookReconciler> {
        self.reconciler.clone()
    }

    pub fn battles(&self) -> Arc<BattleResolver> {
        self.battles.clone()
    }

    /// Shared state for the HTTP router, feeding notifications into `events`
    pub fn api_state(&self, secret: Vec<u8>, events: mpsc::Sender<Delivery>) -> ApiState {
        ApiState {
            secret: Arc::new(secret),
            events,
            store: self.store.clone(),
            queue: self.queue.clone(),
            engine: self.engine.clone(),
        }
    }

    /// Health check
    pub async fn health_check(&self) -> LaunchpadResult<HealthReport> {
        let report = HealthReport {
            waiting_jobs: self.queue.jobs(JobState::Waiting).await?.len(),
            active_jobs: self.queue.jobs(JobState::Active).await?.len(),
            failed_jobs: self.queue.failed_jobs().await?.len(),
            unprocessed_rounds: self.store.list_unprocessed_rounds().await?.len(),
        };

        if report.failed_jobs > 0 {
            warn!(failed_jobs = report.failed_jobs, "Deployment jobs need operator attention");
        }
        Ok(report)
    }

    /// Run every component until `shutdown` flips to true
    pub async fn run(self, secret: Vec<u8>, mut shutdown: watch::Receiver<bool>) -> LaunchpadResult<()> {
        self.queue.recover_stale_jobs(Utc::now()).await?;

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        // Sale lifecycle scan
        let (ticks, handle) = ticker(Duration::from_secs(self.config.sale_scan_interval_secs), shutdown.clone());
        handles.push(handle);
        let monitor = self.monitor.clone();
        handles.push(tokio::spawn(drive("Sale monitor", ticks, shutdown.clone(), move |tick| {
            let monitor = monitor.clone();
            async move {
                if let Err(e) = monitor.scan(tick.at).await {
                    error!(seq = tick.seq, "Sale scan failed: {}", e);
                }
            }
        })));

        // Heat aggregation
        let (ticks, handle) = ticker(Duration::from_secs(self.config.heat_interval_secs), shutdown.clone());
        handles.push(handle);
        let heat = self.heat.clone();
        handles.push(tokio::spawn(drive("Heat aggregator", ticks, shutdown.clone(), move |tick| {
            let heat = heat.clone();
            async move {
                match heat.run_cycle(tick.at).await {
                    Ok(report) => debug!(seq = tick.seq, ?report, "Heat cycle complete"),
                    Err(e) => error!(seq = tick.seq, "Heat cycle failed: {}", e),
                }
            }
        })));

        // Pending airdrop rounds
        let (ticks, handle) = ticker(Duration::from_secs(self.config.reward_sweep_interval_secs), shutdown.clone());
        handles.push(handle);
        let engine = self.engine.clone();
        handles.push(tokio::spawn(drive("Reward sweep", ticks, shutdown.clone(), move |tick| {
            let engine = engine.clone();
            async move {
                match engine.process_pending_rounds(tick.at).await {
                    Ok(report) => debug!(seq = tick.seq, ?report, "Reward sweep complete"),
                    Err(e) => error!(seq = tick.seq, "Reward sweep failed: {}", e),
                }
            }
        })));

        // Battle settlement
        let (ticks, handle) = ticker(Duration::from_secs(self.config.battle_resolve_interval_secs), shutdown.clone());
        handles.push(handle);
        let battles = self.battles.clone();
        handles.push(tokio::spawn(drive("Battle resolver", ticks, shutdown.clone(), move |tick| {
            let battles = battles.clone();
            async move {
                if let Err(e) = battles.run_cycle().await {
                    error!(seq = tick.seq, "Battle resolution failed: {}", e);
                }
            }
        })));

        // Jobs whose worker died mid-attempt
        let (ticks, handle) = ticker(self.queue.lease(), shutdown.clone());
        handles.push(handle);
        let queue = self.queue.clone();
        handles.push(tokio::spawn(drive("Stale job recovery", ticks, shutdown.clone(), move |tick| {
            let queue = queue.clone();
            async move {
                if let Err(e) = queue.recover_stale_jobs(tick.at).await {
                    error!(seq = tick.seq, "Stale job recovery failed: {}", e);
                }
            }
        })));

        // Deployment workers
        handles.extend(self.queue.run_workers(shutdown.clone()));

        // Notifications
        let (events_tx, events_rx) = mpsc::channel(self.config.webhook.queue_capacity);
        handles.push(tokio::spawn(self.reconciler.clone().run(events_rx, shutdown.clone())));

        let app = router(self.api_state(secret, events_tx), &self.config.webhook.path);
        let listener = TcpListener::bind(&self.config.webhook.bind_address)
            .await
            .map_err(|e| LaunchpadError::invalid_config("webhook", &format!("cannot bind {}: {}", self.config.webhook.bind_address, e)))?;
        info!("Webhook server listening on {}", self.config.webhook.bind_address);

        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        });
        if let Err(e) = server.await {
            error!("Webhook server error: {}", e);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Keeper task ended abnormally: {}", e);
            }
        }

        self.store.flush().await?;
        info!("Keeper stopped");
        Ok(())
    }
}
