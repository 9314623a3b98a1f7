//! JSON snapshot format for seeding a [`SimulatedLedger`].

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::SimulatedLedger;
use crate::model::{Account, Bank, PriceInfo};
use liquidator_api::{BankMetadata, BankMetadataMap};

/// A bank with its oracle price and optional display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankEntry {
    pub bank: Bank,
    pub price: PriceInfo,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Full ledger state: group, accounts and the liquidator's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The liquidator's lending account
    pub liquidator: Address,
    /// Owner of the liquidator account and wallet
    pub owner: Address,
    #[serde(default)]
    pub swap_fee_bps: u16,
    pub banks: Vec<BankEntry>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Mint -> UI balance
    #[serde(default)]
    pub wallet: HashMap<Address, f64>,
}

impl LedgerSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse ledger snapshot")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger snapshot {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Bank metadata for every entry that carries a symbol.
    pub fn metadata(&self) -> BankMetadataMap {
        self.banks
            .iter()
            .filter_map(|entry| {
                let symbol = entry.symbol.clone()?;
                Some((
                    entry.bank.address,
                    BankMetadata {
                        bank_address: entry.bank.address,
                        token_address: entry.bank.mint,
                        token_name: entry.name.clone().unwrap_or_default(),
                        token_symbol: symbol,
                    },
                ))
            })
            .collect()
    }
}

impl SimulatedLedger {
    /// Load a ledger from a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_snapshot(LedgerSnapshot::load(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LedgerQuery, TokenWallet};

    const SNAPSHOT: &str = r#"{
        "liquidator": "0xf0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0",
        "owner": "0xf1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1",
        "banks": [
            {
                "bank": {
                    "address": "0x0101010101010101010101010101010101010101",
                    "mint": "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1",
                    "mint_decimals": 6
                },
                "price": { "price": 1.0 },
                "symbol": "USDC"
            },
            {
                "bank": {
                    "address": "0x0202020202020202020202020202020202020202",
                    "mint": "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2",
                    "mint_decimals": 9,
                    "config": {
                        "asset_weight_init": 0.5,
                        "asset_weight_maint": 0.6,
                        "liability_weight_init": 1.25,
                        "liability_weight_maint": 1.1
                    }
                },
                "price": { "price": 100.0, "confidence": 0.5 }
            }
        ],
        "accounts": [
            {
                "address": "0x7777777777777777777777777777777777777777",
                "authority": "0x7878787878787878787878787878787878787878",
                "balances": [
                    { "bank": "0x0202020202020202020202020202020202020202", "asset_shares": 1000000000.0 }
                ]
            }
        ],
        "wallet": { "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2": 1.0 }
    }"#;

    #[tokio::test]
    async fn test_load_snapshot() {
        let snapshot = LedgerSnapshot::from_json(SNAPSHOT).unwrap();
        let metadata = snapshot.metadata();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[&Address::repeat_byte(0x01)].token_symbol, "USDC");

        let ledger = SimulatedLedger::from_snapshot(snapshot);
        let group = ledger.load_group().await.unwrap();
        assert_eq!(group.len(), 2);
        let sol = group.bank(&Address::repeat_byte(0x02)).unwrap();
        assert_eq!(sol.config.liability_weight_init, 1.25);

        // Liquidator account is created even when not listed
        assert_eq!(ledger.all_accounts().await.unwrap().len(), 2);

        let sol = ledger.token_balance(Address::repeat_byte(0xa2)).await.unwrap();
        assert_eq!(sol, 1.0);
    }

    #[tokio::test]
    async fn test_paper_fixture_has_one_underwater_account() {
        let snapshot =
            LedgerSnapshot::from_json(include_str!("../../../../fixtures/paper-ledger.json")).unwrap();
        assert_eq!(snapshot.metadata().len(), 3);

        let ledger = SimulatedLedger::from_snapshot(snapshot);
        let group = ledger.load_group().await.unwrap();
        let underwater: Vec<_> = ledger
            .all_accounts()
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.can_be_liquidated(&group))
            .map(|a| a.address)
            .collect();
        assert_eq!(underwater, vec![Address::repeat_byte(0x77)]);
    }

    #[test]
    fn test_rejects_missing_banks() {
        let err = LedgerSnapshot::from_json(r#"{"liquidator": "0x0000000000000000000000000000000000000001"}"#);
        assert!(err.is_err());
    }
}
