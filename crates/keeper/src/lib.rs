pub mod adapters;
pub mod airdrop;
pub mod battle;
pub mod config;
pub mod deployment;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod heat;
pub mod keeper;
pub mod monitor;
pub mod social;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod webhook;

pub use keeper::{HealthReport, Keeper};
pub use airdrop::{AirdropEngine, MerkleTree, RoundOutcome};
pub use battle::{BattleResolver, ResolveReport};
pub use config::{AirdropConfig, DeploymentConfig, HeatConfig, KeeperConfig, RetryConfig, WebhookConfig};
pub use deployment::{DeploymentQueue, JobOutcome};
pub use error::KeeperError;
pub use gateway::ContractGateway;
pub use heat::{HeatAggregator, HeatReport};
pub use monitor::{SaleDecision, SaleMonitor, ScanReport};
pub use social::{EngagementCounters, SocialMetricsSource};
pub use store::{MemoryStore, SledStore, Store};
pub use webhook::{Delivery, ReconcileOutcome, WebhookEvent, WebhookReconciler};
