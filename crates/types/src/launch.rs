/// Fair-launch, deployment job and heat watermark records

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a fair launch by the factory contract
pub type FairLaunchId = u64;

/// Battle identifier assigned by the battle resolver contract
pub type BattleId = u64;

// ============================================================================
// Fair Launch
// ============================================================================

/// Lifecycle status of a fair launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FairLaunchStatus {
    /// Sale open or ended but not yet classified
    Pending,
    /// Sale reached its target; a deployment job exists
    Completable,
    /// Sale missed its target
    Refundable,
    /// A worker is executing the deployment
    Deploying,
    /// Contracts minted; `token_address` is set
    Deployed,
    /// Sale refunded or abandoned
    Failed,
}

impl FairLaunchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deployed | Self::Failed)
    }
}

impl fmt::Display for FairLaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Completable => "completable",
            Self::Refundable => "refundable",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Social platforms engagement and followers are sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Lens,
    Instagram,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Lens => f.write_str("lens"),
            Platform::Instagram => f.write_str("instagram"),
        }
    }
}

/// A creator account linked to a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocialAccount {
    pub platform: Platform,
    pub handle: String,
}

impl SocialAccount {
    pub fn new(platform: Platform, handle: &str) -> Self {
        Self {
            platform,
            handle: handle.to_string(),
        }
    }
}

impl fmt::Display for SocialAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.handle)
    }
}

/// A timed token sale tracked by the keeper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairLaunch {
    pub id: FairLaunchId,
    pub creator: Address,
    pub name: String,
    pub ticker: String,
    pub status: FairLaunchStatus,
    /// Deployed token contract, present iff `status == Deployed`
    pub token_address: Option<Address>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub socials: Vec<SocialAccount>,
}

impl FairLaunch {
    /// Create a pending fair launch
    pub fn new(id: FairLaunchId, creator: Address, name: &str, ticker: &str, end_time: DateTime<Utc>) -> Self {
        Self {
            id,
            creator,
            name: name.to_string(),
            ticker: ticker.to_string(),
            status: FairLaunchStatus::Pending,
            token_address: None,
            end_time,
            socials: Vec::new(),
        }
    }

    pub fn with_social(mut self, account: SocialAccount) -> Self {
        self.socials.push(account);
        self
    }

    /// Sale window closed and no classification applied yet
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == FairLaunchStatus::Pending && self.end_time <= now
    }

    /// Address and status agree
    pub fn is_consistent(&self) -> bool {
        self.token_address.is_some() == (self.status == FairLaunchStatus::Deployed)
    }
}

// ============================================================================
// Deployment Job
// ============================================================================

/// State of a deployment job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Waiting or Active jobs block another enqueue for the same fair launch
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Active)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Deployment task keyed by fair-launch id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentJob {
    pub fair_launch_id: FairLaunchId,
    /// Failed executions so far
    pub attempts: u32,
    pub state: JobState,
    /// Earliest time a worker may pick the job up
    pub run_at: DateTime<Utc>,
    pub token_address: Option<Address>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentJob {
    pub fn new(fair_launch_id: FairLaunchId, now: DateTime<Utc>) -> Self {
        Self {
            fair_launch_id,
            attempts: 0,
            state: JobState::Waiting,
            run_at: now,
            token_address: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.run_at <= now
    }
}

// ============================================================================
// Heat Watermark
// ============================================================================

/// Last committed heat state for a deployed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatWatermark {
    pub token: Address,
    /// Authoritative heat read back from the contract
    pub heat: u64,
    pub last_heat_update: DateTime<Utc>,
    pub last_engagement_boost: u64,
}
