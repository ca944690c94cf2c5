/// Protocol constants used across the keeper

// ============================================================================
// Heat Constants
// ============================================================================

/// Minimum weighted engagement delta that justifies an on-chain heat write
pub const MIN_HEAT_UPDATE: u64 = 10;

/// Default weight of a reaction (upvote, like)
pub const DEFAULT_REACTION_WEIGHT: u64 = 1;

/// Default weight of a repost
pub const DEFAULT_REPOST_WEIGHT: u64 = 2;

/// Default weight of a quote
pub const DEFAULT_QUOTE_WEIGHT: u64 = 3;

/// Default weight of a comment
pub const DEFAULT_COMMENT_WEIGHT: u64 = 5;

/// Default weight of a bookmark
pub const DEFAULT_BOOKMARK_WEIGHT: u64 = 1;

/// Default weight of a collect
pub const DEFAULT_COLLECT_WEIGHT: u64 = 2;

// ============================================================================
// Deployment Constants
// ============================================================================

/// Attempts allowed for a deployment job before it fails permanently
pub const DEFAULT_MAX_DEPLOY_ATTEMPTS: u32 = 3;

/// First retry delay of a deployment job (5 seconds)
pub const DEFAULT_DEPLOY_BACKOFF_MS: u64 = 5_000;

/// Upper bound on a single retry delay (5 minutes)
pub const DEFAULT_DEPLOY_MAX_BACKOFF_MS: u64 = 300_000;

/// Concurrent deployment workers
pub const DEFAULT_DEPLOY_WORKERS: usize = 2;

// ============================================================================
// Airdrop Constants
// ============================================================================

/// Maximum recipients sampled into a single round
pub const DEFAULT_ROUND_LIMIT: u32 = 5_000;

/// Followers a token needs before a round is distributed
pub const DEFAULT_MIN_FOLLOWERS: usize = 1;

// ============================================================================
// Webhook Constants
// ============================================================================

/// Header carrying the hex HMAC-SHA256 of the raw request body
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Environment variable holding the shared webhook secret
pub const DEFAULT_WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";
