//! Social metrics capability consumed by the heat aggregator and the
//! airdrop engine.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::{LaunchpadResult, SocialAccount};
use serde::{Deserialize, Serialize};

/// Engagement accumulated on an account's posts since a watermark
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementCounters {
    pub reactions: u64,
    pub reposts: u64,
    pub quotes: u64,
    pub comments: u64,
    pub bookmarks: u64,
    pub collects: u64,
}

impl EngagementCounters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-platform follower and engagement source
#[async_trait]
pub trait SocialMetricsSource: Send + Sync {
    /// Wallet addresses following the account
    async fn get_followers(&self, account: &SocialAccount) -> LaunchpadResult<Vec<Address>>;

    /// Engagement deltas recorded after `since`
    async fn get_engagement_since(
        &self,
        account: &SocialAccount,
        since: DateTime<Utc>,
    ) -> LaunchpadResult<EngagementCounters>;
}
