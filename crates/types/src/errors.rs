use alloy_primitives::Address;
use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Error taxonomy shared by every keeper component
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchpadError {
    // ========================================================================
    // Upstream Errors (transient, retried with backoff)
    // ========================================================================

    /// RPC or relayer communication error
    #[error("RPC error (code {code:?}): {message}")]
    RpcError { message: String, code: Option<u16> },

    /// A submitted transaction reverted or was dropped
    #[error("Transaction failed ({tx_hash:?}): {error}")]
    TransactionFailed { error: String, tx_hash: Option<String> },

    /// Upstream call exceeded its deadline
    #[error("Upstream timeout after {timeout_ms}ms in '{operation}'")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Social platform client failure
    #[error("Social source '{platform}' failed: {reason}")]
    SocialSource { platform: String, reason: String },

    // ========================================================================
    // Idempotent Duplicates (treated as success by callers)
    // ========================================================================

    /// The contract already holds a root for this round
    #[error("Merkle root already set for token {token} round {index}")]
    RootAlreadySet { token: Address, index: u64 },

    // ========================================================================
    // Data Errors (permanent, never retried)
    // ========================================================================

    /// Referenced entity does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// Persisted records disagree with each other or with the chain
    #[error("Data inconsistency: {reason}")]
    DataInconsistency { reason: String },

    /// Invalid parameter
    #[error("Invalid parameter '{parameter}': got '{value}', expected '{expected}'")]
    InvalidParameter { parameter: String, value: String, expected: String },

    // ========================================================================
    // Authentication Errors
    // ========================================================================

    /// Inbound request failed authentication
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// Store backend failure
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    /// Encoding or decoding failure
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Invalid configuration
    #[error("Invalid configuration for '{component}': {reason}")]
    InvalidConfiguration { component: String, reason: String },

    /// Generic error with optional context
    #[error("Error: {message}")]
    Generic { message: String, context: Option<String> },
}

impl LaunchpadError {
    /// Create an RPC error
    pub fn rpc_error(message: &str, code: Option<u16>) -> Self {
        Self::RpcError {
            message: message.to_string(),
            code,
        }
    }

    /// Create a transaction failure
    pub fn transaction_failed(error: &str, tx_hash: Option<&str>) -> Self {
        Self::TransactionFailed {
            error: error.to_string(),
            tx_hash: tx_hash.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            timeout_ms,
        }
    }

    /// Create a social source error
    pub fn social(platform: &str, reason: &str) -> Self {
        Self::SocialSource {
            platform: platform.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Create a data inconsistency error
    pub fn inconsistency(reason: &str) -> Self {
        Self::DataInconsistency {
            reason: reason.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, value: &str, expected: &str) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: &str) -> Self {
        Self::Unauthorized {
            reason: reason.to_string(),
        }
    }

    /// Create a storage error
    pub fn storage(reason: &str) -> Self {
        Self::Storage {
            reason: reason.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: &str) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(component: &str, reason: &str) -> Self {
        Self::InvalidConfiguration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a generic error
    pub fn generic(message: &str) -> Self {
        Self::Generic {
            message: message.to_string(),
            context: None,
        }
    }

    /// Upstream and storage failures that a later attempt may not repeat
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RpcError { .. }
                | Self::TransactionFailed { .. }
                | Self::Timeout { .. }
                | Self::SocialSource { .. }
                | Self::Storage { .. }
        )
    }

    /// Errors that signal work already done elsewhere
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::RootAlreadySet { .. })
    }
}

impl From<serde_json::Error> for LaunchpadError {
    fn from(err: serde_json::Error) -> Self {
        LaunchpadError::serialization(&err.to_string())
    }
}
