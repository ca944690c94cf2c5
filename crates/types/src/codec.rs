//! Serde helpers for notification payloads.
//!
//! Event relayers emit `uint256` values either as decimal strings, `0x` hex
//! strings or plain JSON numbers; these modules accept all three.

use alloy_primitives::U256;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Flexible {
    Number(u64),
    Text(String),
}

/// Parse a decimal or `0x`-prefixed hex string into a `U256`
pub fn parse_u256(value: &str) -> Result<U256, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty integer".to_string());
    }
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| format!("invalid uint256 '{}': {}", value, e))
}

/// `U256` as a decimal string
pub mod u256_dec {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Flexible::deserialize(deserializer)? {
            Flexible::Number(n) => Ok(U256::from(n)),
            Flexible::Text(s) => parse_u256(&s).map_err(de::Error::custom),
        }
    }
}

/// `u64` written as a number, read from a number or a numeric string
pub mod u64_flex {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Flexible::deserialize(deserializer)? {
            Flexible::Number(n) => Ok(n),
            Flexible::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| de::Error::custom(format!("invalid index '{}': {}", s, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Payload {
        #[serde(with = "u256_dec")]
        amount: U256,
        #[serde(with = "u64_flex")]
        index: u64,
    }

    #[test]
    fn test_parse_u256_forms() {
        assert_eq!(parse_u256("1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_u256("0x3e8").unwrap(), U256::from(1000u64));
        assert!(parse_u256("").is_err());
        assert!(parse_u256("12abc").is_err());
    }

    #[test]
    fn test_payload_accepts_strings_and_numbers() {
        let from_strings: Payload = serde_json::from_str(r#"{"amount":"250","index":"3"}"#).unwrap();
        let from_numbers: Payload = serde_json::from_str(r#"{"amount":250,"index":3}"#).unwrap();
        assert_eq!(from_strings, from_numbers);

        let encoded = serde_json::to_string(&from_strings).unwrap();
        assert_eq!(encoded, r#"{"amount":"250","index":3}"#);
    }
}
