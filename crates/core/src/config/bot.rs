//! Configuration management with profile support.
//!
//! Provides the agent's runtime parameters with support for different
//! profiles (testing, production), TOML files and environment overrides.

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure containing all agent parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Loop timing and liquidation thresholds
    #[serde(default)]
    pub liquidator: LiquidatorSettings,

    /// Candidate account filtering
    #[serde(default)]
    pub accounts: AccountListConfig,

    /// Reference and native currencies
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Bank metadata source
    #[serde(default)]
    pub metadata: MetadataConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Loop timing and liquidation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatorSettings {
    /// Pause between idle scans (milliseconds)
    #[serde(default = "default_sleep_interval")]
    pub sleep_interval_ms: u64,

    /// Smallest liability or seize value worth liquidating (USD)
    #[serde(default = "default_min_liquidation_amount")]
    pub min_liquidation_amount_usd: f64,

    /// Ignore balances in isolated banks when picking targets
    #[serde(default)]
    pub exclude_isolated_banks: bool,

    /// Slippage tolerance for rebalancing swaps (basis points)
    #[serde(default = "default_swap_slippage")]
    pub swap_slippage_bps: u16,

    /// Native token kept in the wallet for fees (UI units)
    #[serde(default = "default_min_native_balance")]
    pub min_native_balance: f64,
}

fn default_sleep_interval() -> u64 {
    5_000
}
fn default_min_liquidation_amount() -> f64 {
    1.0
}
fn default_swap_slippage() -> u16 {
    10_000
}
fn default_min_native_balance() -> f64 {
    0.05
}

impl Default for LiquidatorSettings {
    fn default() -> Self {
        Self {
            sleep_interval_ms: default_sleep_interval(),
            min_liquidation_amount_usd: default_min_liquidation_amount(),
            exclude_isolated_banks: false,
            swap_slippage_bps: default_swap_slippage(),
            min_native_balance: default_min_native_balance(),
        }
    }
}

impl LiquidatorSettings {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }
}

/// Allow-list and deny-list for candidate accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountListConfig {
    /// Only these accounts are considered (takes precedence)
    #[serde(default)]
    pub whitelist: Option<Vec<Address>>,

    /// These accounts are never considered
    #[serde(default)]
    pub blacklist: Option<Vec<Address>>,
}

/// Currencies the agent treats specially.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Mint everything is converted into
    #[serde(default)]
    pub reference_mint: Address,

    /// Native fee currency, never swept and subject to the fee reserve
    #[serde(default)]
    pub native_mint: Option<Address>,
}

/// Bank metadata source and refresh cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    600
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: None,
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl MetadataConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            liquidator: LiquidatorSettings::default(),
            accounts: AccountListConfig::default(),
            assets: AssetsConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        Ok(config)
    }

    /// Create a testing profile: fast loop, no minimum size.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            liquidator: LiquidatorSettings {
                sleep_interval_ms: 1_000,
                min_liquidation_amount_usd: 0.0001, // allow dust targets
                exclude_isolated_banks: false,
                swap_slippage_bps: default_swap_slippage(),
                min_native_balance: 0.01,
            },
            metadata: MetadataConfig {
                url: None,
                refresh_interval_secs: 60,
            },
            ..Default::default()
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            liquidator: LiquidatorSettings {
                sleep_interval_ms: 10_000,
                min_liquidation_amount_usd: 5.0,
                exclude_isolated_banks: true,
                swap_slippage_bps: 100, // 1%
                min_native_balance: 0.1,
            },
            ..Default::default()
        }
    }

    /// Get profile from environment variable BOT_PROFILE, or default.
    /// Supported values: testing, production
    pub fn from_profile_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Resolve the effective configuration: the TOML file named by
    /// LIQUIDATOR_CONFIG (or the BOT_PROFILE profile), then environment
    /// overrides, then validation.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("LIQUIDATOR_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::from_profile_env(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup` (environment variable names).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SLEEP_INTERVAL") {
            self.liquidator.sleep_interval_ms = parse_var("SLEEP_INTERVAL", &v)?;
        }
        if let Some(v) = get("MIN_LIQUIDATION_AMOUNT_USD_UI") {
            self.liquidator.min_liquidation_amount_usd = parse_var("MIN_LIQUIDATION_AMOUNT_USD_UI", &v)?;
        }
        if let Some(v) = get("EXCLUDE_ISOLATED_BANKS") {
            self.liquidator.exclude_isolated_banks = parse_var("EXCLUDE_ISOLATED_BANKS", &v)?;
        }
        if let Some(v) = get("MIN_SOL_BALANCE") {
            self.liquidator.min_native_balance = parse_var("MIN_SOL_BALANCE", &v)?;
        }
        if let Some(v) = get("ACCOUNT_WHITELIST") {
            self.accounts.whitelist = Some(parse_address_list("ACCOUNT_WHITELIST", &v)?);
        }
        if let Some(v) = get("ACCOUNT_BLACKLIST") {
            self.accounts.blacklist = Some(parse_address_list("ACCOUNT_BLACKLIST", &v)?);
        }
        if let Some(v) = get("REFERENCE_MINT") {
            self.assets.reference_mint = parse_var("REFERENCE_MINT", &v)?;
        }
        if let Some(v) = get("NATIVE_MINT") {
            self.assets.native_mint = Some(parse_var("NATIVE_MINT", &v)?);
        }
        if let Some(v) = get("BANK_METADATA_URL") {
            self.metadata.url = Some(v);
        }
        Ok(())
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.assets.reference_mint.is_zero() {
            bail!("reference mint is not configured (set REFERENCE_MINT)");
        }
        if !self.liquidator.min_liquidation_amount_usd.is_finite()
            || self.liquidator.min_liquidation_amount_usd < 0.0
        {
            bail!(
                "invalid minimum liquidation amount {}",
                self.liquidator.min_liquidation_amount_usd
            );
        }
        if self.liquidator.min_native_balance < 0.0 {
            bail!("invalid native fee reserve {}", self.liquidator.min_native_balance);
        }
        if self.accounts.whitelist.is_some() && self.accounts.blacklist.is_some() {
            tracing::warn!("Both account whitelist and blacklist are set, whitelist takes precedence");
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            sleep_interval_ms = self.liquidator.sleep_interval_ms,
            min_liquidation_usd = self.liquidator.min_liquidation_amount_usd,
            exclude_isolated = self.liquidator.exclude_isolated_banks,
            slippage_bps = self.liquidator.swap_slippage_bps,
            min_native_balance = self.liquidator.min_native_balance,
            "Liquidator parameters"
        );
        tracing::info!(
            reference_mint = %self.assets.reference_mint,
            native_mint = ?self.assets.native_mint,
            "Assets"
        );
        tracing::info!(
            whitelist = ?self.accounts.whitelist.as_ref().map(Vec::len),
            blacklist = ?self.accounts.blacklist.as_ref().map(Vec::len),
            "Account filters"
        );
        tracing::info!(
            url = ?self.metadata.url,
            refresh_secs = self.metadata.refresh_interval_secs,
            "Bank metadata"
        );
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key}={value}: {e}"))
}

fn parse_address_list(key: &str, value: &str) -> Result<Vec<Address>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_var(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const USDC: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.liquidator.sleep_interval(), Duration::from_secs(5));
        assert_eq!(config.liquidator.min_liquidation_amount_usd, 1.0);
        assert_eq!(config.liquidator.swap_slippage_bps, 10_000);
        assert_eq!(config.metadata.refresh_interval(), Duration::from_secs(600));
        assert!(!config.liquidator.exclude_isolated_banks);
    }

    #[test]
    fn test_profiles() {
        let testing = BotConfig::testing();
        assert_eq!(testing.profile, "testing");
        assert!(testing.liquidator.min_liquidation_amount_usd < 0.01);

        let production = BotConfig::production();
        assert_eq!(production.profile, "production");
        assert!(production.liquidator.exclude_isolated_banks);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BotConfig::default();
        config
            .apply_overrides(lookup(&[
                ("SLEEP_INTERVAL", "250"),
                ("MIN_LIQUIDATION_AMOUNT_USD_UI", "2.5"),
                ("EXCLUDE_ISOLATED_BANKS", "true"),
                ("REFERENCE_MINT", USDC),
                (
                    "ACCOUNT_WHITELIST",
                    "0x0101010101010101010101010101010101010101, 0x0202020202020202020202020202020202020202",
                ),
                ("ACCOUNT_BLACKLIST", ""),
            ]))
            .unwrap();

        assert_eq!(config.liquidator.sleep_interval_ms, 250);
        assert_eq!(config.liquidator.min_liquidation_amount_usd, 2.5);
        assert!(config.liquidator.exclude_isolated_banks);
        assert_eq!(config.assets.reference_mint, Address::repeat_byte(0xa1));
        assert_eq!(config.accounts.whitelist.as_ref().map(Vec::len), Some(2));
        assert!(config.accounts.blacklist.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = BotConfig::default();
        let err = config
            .apply_overrides(lookup(&[("SLEEP_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("SLEEP_INTERVAL"));
    }

    #[test]
    fn test_validate_requires_reference_mint() {
        assert!(BotConfig::default().validate().is_err());
    }

    #[test]
    fn test_toml_file_format() {
        let toml_str = format!(
            r#"
            profile = "paper"

            [liquidator]
            sleep_interval_ms = 2000

            [assets]
            reference_mint = "{USDC}"

            [accounts]
            blacklist = ["0x0303030303030303030303030303030303030303"]
            "#
        );
        let config: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.profile, "paper");
        assert_eq!(config.liquidator.sleep_interval_ms, 2000);
        assert_eq!(config.liquidator.min_native_balance, 0.05);
        assert_eq!(config.accounts.blacklist.as_ref().map(Vec::len), Some(1));
        config.validate().unwrap();
    }
}
