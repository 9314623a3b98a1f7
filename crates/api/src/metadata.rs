//! Bank metadata API client.
//!
//! Bank metadata (token name and symbol per bank) is published as a JSON
//! array. It is display-only: a missing entry never blocks a decision.

use alloy::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Metadata of one bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankMetadata {
    pub bank_address: Address,
    pub token_address: Address,
    #[serde(default)]
    pub token_name: String,
    pub token_symbol: String,
}

/// Bank address -> metadata.
pub type BankMetadataMap = HashMap<Address, BankMetadata>;

/// Bank metadata HTTP client.
#[derive(Debug, Clone)]
pub struct BankMetadataClient {
    client: reqwest::Client,
    url: String,
}

impl BankMetadataClient {
    /// Create a client for the given metadata URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and index the metadata list.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<BankMetadataMap> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let map = parse_metadata(&body)?;
        debug!(banks = map.len(), "Fetched bank metadata");
        Ok(map)
    }
}

/// Parse a metadata document, skipping entries that fail to decode.
pub fn parse_metadata(body: &str) -> Result<BankMetadataMap> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let mut map = HashMap::with_capacity(entries.len());

    for entry in entries {
        match serde_json::from_value::<BankMetadata>(entry) {
            Ok(metadata) => {
                map.insert(metadata.bank_address, metadata);
            }
            Err(e) => warn!(error = %e, "Skipping malformed bank metadata entry"),
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let body = r#"[
            {
                "bankAddress": "0x0101010101010101010101010101010101010101",
                "tokenAddress": "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1",
                "tokenName": "USD Coin",
                "tokenSymbol": "USDC"
            },
            {
                "bankAddress": "not-an-address",
                "tokenAddress": "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2",
                "tokenSymbol": "BROKEN"
            },
            {
                "bankAddress": "0x0202020202020202020202020202020202020202",
                "tokenAddress": "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2",
                "tokenSymbol": "SOL"
            }
        ]"#;

        let map = parse_metadata(body).unwrap();
        assert_eq!(map.len(), 2);
        let usdc = &map[&Address::repeat_byte(0x01)];
        assert_eq!(usdc.token_symbol, "USDC");
        assert_eq!(usdc.token_name, "USD Coin");
        assert_eq!(map[&Address::repeat_byte(0x02)].token_name, "");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_metadata(r#"{"bankAddress": "x"}"#).is_err());
    }
}
