//! Process-wide bank metadata cache.
//!
//! Readers take a cheap `Arc` snapshot of the whole map; a single refresh
//! task swaps in a new map wholesale. Metadata is display-only, so a
//! stale or missing entry never affects a decision.

use alloy::primitives::Address;
use liquidator_api::{BankMetadataClient, BankMetadataMap};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct BankMetadataCache {
    inner: RwLock<Arc<BankMetadataMap>>,
}

impl BankMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: BankMetadataMap) -> Self {
        Self {
            inner: RwLock::new(Arc::new(metadata)),
        }
    }

    /// Current map. The lock is released before the caller uses it.
    pub fn snapshot(&self) -> Arc<BankMetadataMap> {
        self.inner.read().clone()
    }

    pub fn replace(&self, metadata: BankMetadataMap) {
        *self.inner.write() = Arc::new(metadata);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token symbol of a bank, or a shortened mint address when unknown.
    pub fn symbol_for(&self, bank: &Address, mint: &Address) -> String {
        match self.snapshot().get(bank) {
            Some(metadata) => metadata.token_symbol.clone(),
            None => {
                debug!(bank = %bank, "No metadata for bank");
                shorten(mint)
            }
        }
    }

    /// Fetch once and replace the cached map.
    pub async fn refresh(&self, client: &BankMetadataClient) -> anyhow::Result<usize> {
        let metadata = client.fetch().await?;
        let count = metadata.len();
        self.replace(metadata);
        Ok(count)
    }

    /// Refresh on a fixed interval. The first refresh happens immediately;
    /// failures keep the previous map.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        client: BankMetadataClient,
        interval: Duration,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.refresh(&client).await {
                    Ok(count) => info!(banks = count, "Bank metadata refreshed"),
                    Err(e) => warn!(error = %e, url = client.url(), "Bank metadata refresh failed"),
                }
            }
        })
    }
}

fn shorten(address: &Address) -> String {
    let full = address.to_string();
    if full.len() <= 10 {
        return full;
    }
    format!("{}..{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_api::BankMetadata;

    fn metadata(bank: Address, symbol: &str) -> BankMetadata {
        BankMetadata {
            bank_address: bank,
            token_address: Address::repeat_byte(0xaa),
            token_name: String::new(),
            token_symbol: symbol.to_string(),
        }
    }

    #[test]
    fn test_symbol_lookup_and_fallback() {
        let bank = Address::repeat_byte(0x01);
        let cache = BankMetadataCache::new();
        assert!(cache.is_empty());

        let mint = Address::repeat_byte(0x12);
        assert_eq!(cache.symbol_for(&bank, &mint), "0x1212..1212");

        cache.replace(BankMetadataMap::from([(bank, metadata(bank, "USDC"))]));
        assert_eq!(cache.symbol_for(&bank, &mint), "USDC");
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let bank = Address::repeat_byte(0x01);
        let cache = BankMetadataCache::with_metadata(BankMetadataMap::from([(bank, metadata(bank, "OLD"))]));

        let before = cache.snapshot();
        cache.replace(BankMetadataMap::new());

        assert_eq!(before[&bank].token_symbol, "OLD");
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_map() {
        let bank = Address::repeat_byte(0x01);
        let cache = BankMetadataCache::with_metadata(BankMetadataMap::from([(bank, metadata(bank, "SOL"))]));

        // Nothing listens on the discard port
        let client = BankMetadataClient::new("http://127.0.0.1:9/banks.json");
        assert!(cache.refresh(&client).await.is_err());
        assert_eq!(cache.len(), 1);
    }
}
