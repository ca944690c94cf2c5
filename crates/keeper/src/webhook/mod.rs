//! Contract event notifications.
//!
//! The event relayer posts `{ "type": .., "data": { .. } }` envelopes signed
//! with a shared secret. [`server`] authenticates and decodes them, and
//! [`reconciler`] applies them to the store before the server answers, so a
//! failed delivery is redelivered by the relayer.

pub mod reconciler;
pub mod server;

use alloy_primitives::{Address, B256, U256};
use hmac::{Hmac, Mac};
use launchpad_types::codec::{u256_dec, u64_flex};
use launchpad_types::{LaunchpadError, LaunchpadResult};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub use reconciler::{Delivery, ReconcileOutcome, WebhookReconciler};
pub use server::{router, ApiState};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Events
// ============================================================================

/// Notification envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WebhookEvent {
    RewardOpened(RewardOpened),
    Claimed(Claimed),
}

/// The airdrop contract opened round `index` for `token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOpened {
    pub token: Address,
    #[serde(with = "u256_dec", alias = "userAmount")]
    pub max_amount: U256,
    #[serde(with = "u64_flex")]
    pub index: u64,
}

/// A recipient claimed `amount` from round `index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claimed {
    pub user_address: Address,
    #[serde(with = "u256_dec")]
    pub amount: U256,
    #[serde(with = "u64_flex")]
    pub index: u64,
    pub transaction_hash: B256,
    /// Emitting token contract, when the relayer includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::RewardOpened(_) => "RewardOpened",
            WebhookEvent::Claimed(_) => "Claimed",
        }
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// Lowercase hex HMAC-SHA256 of `body`
pub fn sign(secret: &[u8], body: &[u8]) -> LaunchpadResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| LaunchpadError::invalid_config("webhook", &format!("unusable secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over the raw body
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"type":"Claimed"}"#;
        let signature = sign(b"secret", body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(b"secret", body, &signature));
        assert!(verify_signature(b"secret", body, &signature.to_uppercase()));
    }

    #[test]
    fn test_signature_rejections() {
        let body = br#"{"type":"Claimed"}"#;
        let signature = sign(b"secret", body).unwrap();

        assert!(!verify_signature(b"other", body, &signature));
        assert!(!verify_signature(b"secret", br#"{"type":"Claimed "}"#, &signature));
        assert!(!verify_signature(b"secret", body, "not-hex"));
        assert!(!verify_signature(b"secret", body, &signature[..32]));
    }

    #[test]
    fn test_decode_reward_opened() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "type": "RewardOpened",
                "data": {
                    "token": "0x1111111111111111111111111111111111111111",
                    "userAmount": "1000000000000000000000",
                    "index": "3"
                }
            }"#,
        )
        .unwrap();

        match event {
            WebhookEvent::RewardOpened(opened) => {
                assert_eq!(opened.token, Address::repeat_byte(0x11));
                assert_eq!(opened.max_amount, U256::from(10u64).pow(U256::from(21)));
                assert_eq!(opened.index, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_claimed() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "type": "Claimed",
                "data": {
                    "userAddress": "0x2222222222222222222222222222222222222222",
                    "amount": 250,
                    "index": 1,
                    "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            event,
            WebhookEvent::Claimed(Claimed {
                user_address: Address::repeat_byte(0x22),
                amount: U256::from(250),
                index: 1,
                transaction_hash: B256::repeat_byte(0x33),
                token: None,
            })
        );
        assert_eq!(event.kind(), "Claimed");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = serde_json::from_str::<WebhookEvent>(r#"{"type":"Transfer","data":{}}"#);
        assert!(result.is_err());
    }
}
