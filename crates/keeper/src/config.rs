use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use launchpad_types::*;

use crate::social::EngagementCounters;

/// Keeper configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Seconds between sale lifecycle scans
    pub sale_scan_interval_secs: u64,

    /// Seconds between heat aggregation batches
    pub heat_interval_secs: u64,

    /// Seconds between sweeps over unprocessed airdrop rounds
    pub reward_sweep_interval_secs: u64,

    /// Seconds between battle resolution passes
    pub battle_resolve_interval_secs: u64,

    /// Deadline for a single read or write against the contracts
    pub rpc_timeout_secs: u64,

    /// Deployment job queue configuration
    pub deployment: DeploymentConfig,

    /// Heat aggregation policy
    pub heat: HeatConfig,

    /// Airdrop round policy
    pub airdrop: AirdropConfig,

    /// Inbound webhook server
    pub webhook: WebhookConfig,

    /// Persistent store
    pub storage: StorageConfig,

    /// Relayer and social metrics endpoints
    pub upstream: UpstreamConfig,
}

/// Deployment worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Concurrent workers
    pub workers: usize,

    /// How often idle workers look for delayed jobs (milliseconds)
    pub poll_interval_ms: u64,

    /// Deadline for one deployment attempt, covering every chained call
    pub timeout_secs: u64,

    /// Retry configuration
    pub retry: RetryConfig,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before a job fails permanently
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

/// Heat aggregation policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeatConfig {
    /// Deltas at or below this value are not written on-chain
    pub min_heat_update: u64,

    /// Minimum seconds between two heat writes for the same token
    pub min_update_interval_secs: i64,

    /// Per-platform engagement weights
    pub weights: PlatformWeights,
}

/// Engagement weights per platform
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformWeights {
    pub lens: EngagementWeights,
    pub instagram: EngagementWeights,
}

/// Weight applied to each engagement counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngagementWeights {
    pub reaction: u64,
    pub repost: u64,
    pub quote: u64,
    pub comment: u64,
    pub bookmark: u64,
    pub collect: u64,
}

/// Airdrop round policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AirdropConfig {
    /// Maximum recipients per round
    pub round_limit: u32,

    /// Followers required before a round is distributed
    pub min_followers: usize,
}

/// Inbound webhook server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind_address: String,

    /// Route receiving contract event notifications
    pub path: String,

    /// Environment variable holding the shared HMAC secret
    pub secret_env: String,

    /// Notifications buffered between the server and the reconciler
    pub queue_capacity: usize,
}

/// Persistent store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Embedded database directory; state is kept in memory when absent
    pub path: Option<PathBuf>,
}

/// Upstream collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Transaction relayer fronting the factory and airdrop contracts
    pub relayer_url: String,

    /// Social metrics service
    pub social_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> LaunchpadResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| LaunchpadError::generic(&format!("Failed to read config file {}: {}", path, e)))?;

        let config: KeeperConfig = toml::from_str(&content)
            .map_err(|e| LaunchpadError::invalid_config("keeper", &format!("Failed to parse config file {}: {}", path, e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> LaunchpadResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LaunchpadError::serialization(&format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| LaunchpadError::generic(&format!("Failed to write config file {}: {}", path, e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> LaunchpadResult<()> {
        for (name, value) in [
            ("sale_scan_interval_secs", self.sale_scan_interval_secs),
            ("heat_interval_secs", self.heat_interval_secs),
            ("reward_sweep_interval_secs", self.reward_sweep_interval_secs),
            ("battle_resolve_interval_secs", self.battle_resolve_interval_secs),
            ("rpc_timeout_secs", self.rpc_timeout_secs),
        ] {
            if value == 0 {
                return Err(LaunchpadError::invalid_parameter(name, "0", "greater than 0"));
            }
        }

        self.deployment.validate()?;
        self.heat.validate()?;
        self.airdrop.validate()?;
        self.webhook.validate()?;

        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl DeploymentConfig {
    fn validate(&self) -> LaunchpadResult<()> {
        if self.workers == 0 {
            return Err(LaunchpadError::invalid_parameter("deployment.workers", "0", "greater than 0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(LaunchpadError::invalid_parameter("deployment.poll_interval_ms", "0", "greater than 0"));
        }

        if self.timeout_secs == 0 {
            return Err(LaunchpadError::invalid_parameter("deployment.timeout_secs", "0", "greater than 0"));
        }

        self.retry.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> LaunchpadResult<()> {
        if self.max_attempts == 0 {
            return Err(LaunchpadError::invalid_parameter("max_attempts", "0", "greater than 0"));
        }

        if self.base_delay_ms == 0 {
            return Err(LaunchpadError::invalid_parameter("base_delay_ms", "0", "greater than 0"));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(LaunchpadError::invalid_parameter("max_delay_ms", &self.max_delay_ms.to_string(), &format!("greater than or equal to base_delay_ms ({})", self.base_delay_ms)));
        }

        if self.backoff_multiplier <= 1.0 {
            return Err(LaunchpadError::invalid_parameter("backoff_multiplier", &self.backoff_multiplier.to_string(), "greater than 1.0"));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }

    /// Delay to apply after the given number of failed executions
    pub fn delay_after_failures(&self, failures: u32) -> chrono::Duration {
        let ms = self.delay_for_attempt(failures.saturating_sub(1));
        chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
    }
}

impl HeatConfig {
    fn validate(&self) -> LaunchpadResult<()> {
        if self.min_update_interval_secs < 0 {
            return Err(LaunchpadError::invalid_parameter("heat.min_update_interval_secs", &self.min_update_interval_secs.to_string(), "zero or positive"));
        }
        Ok(())
    }
}

impl PlatformWeights {
    pub fn for_platform(&self, platform: Platform) -> &EngagementWeights {
        match platform {
            Platform::Lens => &self.lens,
            Platform::Instagram => &self.instagram,
        }
    }
}

impl EngagementWeights {
    /// Weighted sum of a set of counters
    pub fn score(&self, counters: &EngagementCounters) -> u64 {
        [
            (counters.reactions, self.reaction),
            (counters.reposts, self.repost),
            (counters.quotes, self.quote),
            (counters.comments, self.comment),
            (counters.bookmarks, self.bookmark),
            (counters.collects, self.collect),
        ]
        .iter()
        .fold(0u64, |acc, (count, weight)| acc.saturating_add(count.saturating_mul(*weight)))
    }
}

impl AirdropConfig {
    fn validate(&self) -> LaunchpadResult<()> {
        if self.round_limit == 0 {
            return Err(LaunchpadError::invalid_parameter("airdrop.round_limit", "0", "greater than 0"));
        }
        if self.min_followers == 0 {
            return Err(LaunchpadError::invalid_parameter("airdrop.min_followers", "0", "at least 1"));
        }
        Ok(())
    }
}

impl WebhookConfig {
    fn validate(&self) -> LaunchpadResult<()> {
        if !self.path.starts_with('/') {
            return Err(LaunchpadError::invalid_parameter("webhook.path", &self.path, "an absolute route starting with '/'"));
        }
        if self.secret_env.is_empty() {
            return Err(LaunchpadError::invalid_parameter("webhook.secret_env", "empty", "environment variable name"));
        }
        if self.queue_capacity == 0 {
            return Err(LaunchpadError::invalid_parameter("webhook.queue_capacity", "0", "greater than 0"));
        }
        Ok(())
    }

    /// Read the shared secret from the configured environment variable
    pub fn load_secret(&self) -> LaunchpadResult<Vec<u8>> {
        match std::env::var(&self.secret_env) {
            Ok(secret) if !secret.is_empty() => Ok(secret.into_bytes()),
            _ => Err(LaunchpadError::invalid_config("webhook", &format!("environment variable {} is not set", self.secret_env))),
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            sale_scan_interval_secs: 60,
            heat_interval_secs: 3600,
            reward_sweep_interval_secs: 60,
            battle_resolve_interval_secs: 60,
            rpc_timeout_secs: 60,
            deployment: DeploymentConfig::default(),
            heat: HeatConfig::default(),
            airdrop: AirdropConfig::default(),
            webhook: WebhookConfig::default(),
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DEPLOY_WORKERS,
            poll_interval_ms: 1_000,
            timeout_secs: 600,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_DEPLOY_ATTEMPTS,
            base_delay_ms: DEFAULT_DEPLOY_BACKOFF_MS,
            max_delay_ms: DEFAULT_DEPLOY_MAX_BACKOFF_MS,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            min_heat_update: MIN_HEAT_UPDATE,
            min_update_interval_secs: 0,
            weights: PlatformWeights::default(),
        }
    }
}

impl Default for PlatformWeights {
    fn default() -> Self {
        Self {
            lens: EngagementWeights::default(),
            instagram: EngagementWeights::default(),
        }
    }
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            reaction: DEFAULT_REACTION_WEIGHT,
            repost: DEFAULT_REPOST_WEIGHT,
            quote: DEFAULT_QUOTE_WEIGHT,
            comment: DEFAULT_COMMENT_WEIGHT,
            bookmark: DEFAULT_BOOKMARK_WEIGHT,
            collect: DEFAULT_COLLECT_WEIGHT,
        }
    }
}

impl Default for AirdropConfig {
    fn default() -> Self {
        Self {
            round_limit: DEFAULT_ROUND_LIMIT,
            min_followers: DEFAULT_MIN_FOLLOWERS,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            path: "/api/webhook".to_string(),
            secret_env: DEFAULT_WEBHOOK_SECRET_ENV.to_string(),
            queue_capacity: 1024,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            relayer_url: "http://127.0.0.1:8545".to_string(),
            social_url: "http://127.0.0.1:8600".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> LaunchpadResult<()> {
    let example_config = KeeperConfig {
        heat_interval_secs: 120,
        storage: StorageConfig {
            path: Some(PathBuf::from("./data/keeper")),
        },
        upstream: UpstreamConfig {
            relayer_url: "https://relayer.example.org".to_string(),
            social_url: "https://social.example.org".to_string(),
            request_timeout_secs: 30,
        },
        ..KeeperConfig::default()
    };

    example_config.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = KeeperConfig::default();
        assert!(config.validate().is_ok());

        // Test invalid worker pool
        config.deployment.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_calculation() {
        let retry_config = RetryConfig::default();

        assert_eq!(retry_config.delay_for_attempt(0), 5_000);
        assert_eq!(retry_config.delay_for_attempt(1), 10_000);
        assert_eq!(retry_config.delay_for_attempt(2), 20_000);

        // Should cap at max_delay_ms
        assert_eq!(retry_config.delay_for_attempt(10), 300_000);
    }

    #[test]
    fn test_delay_after_failures() {
        let retry_config = RetryConfig::default();
        assert_eq!(retry_config.delay_after_failures(1), chrono::Duration::seconds(5));
        assert_eq!(retry_config.delay_after_failures(2), chrono::Duration::seconds(10));
        assert_eq!(retry_config.delay_after_failures(3), chrono::Duration::seconds(20));
    }

    #[test]
    fn test_engagement_score() {
        let weights = EngagementWeights::default();
        let counters = EngagementCounters {
            reactions: 4,
            reposts: 1,
            comments: 2,
            ..EngagementCounters::default()
        };
        // 4*1 + 1*2 + 2*5
        assert_eq!(weights.score(&counters), 16);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: KeeperConfig = toml::from_str(
            r#"
sale_scan_interval_secs = 30

[deployment.retry]
max_attempts = 5
"#,
        )
        .unwrap();

        assert_eq!(config.sale_scan_interval_secs, 30);
        assert_eq!(config.deployment.retry.max_attempts, 5);
        assert_eq!(config.deployment.retry.base_delay_ms, DEFAULT_DEPLOY_BACKOFF_MS);
        assert_eq!(config.heat.min_heat_update, MIN_HEAT_UPDATE);
        assert!(config.validate().is_ok());
    }
}
