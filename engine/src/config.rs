//! Engine configuration.

use std::collections::HashMap;

use chrono::Duration;
use flipex_common::{Asset, AssetSpec};
use flipex_rates::{oracle::default_fallback_rates, RateOracleConfig};
use rust_decimal::Decimal;

/// Payment gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API base URL.
    pub api_url: String,
    /// API token.
    pub token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: flipex_gateway::client::MAINNET_URL.to_string(),
            token: String::new(),
        }
    }
}

/// Main engine configuration, loaded once at process start and immutable
/// thereafter.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Supported assets with display and policy metadata.
    pub assets: Vec<AssetSpec>,
    /// Commission withheld from every exchange, as a fraction.
    pub commission_rate: Decimal,
    /// Minimum USDT-equivalent per exchange.
    pub min_usdt: Decimal,
    /// Rate-cache time-to-live.
    pub cache_ttl: Duration,
    /// Invoice validity window in seconds.
    pub invoice_expiry_secs: i64,
    /// Static asset -> USDT rates of last resort.
    pub fallback_rates: HashMap<Asset, Decimal>,
    /// SQLite database URL.
    pub database_url: String,
    /// Payment gateway settings.
    pub gateway: GatewayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            commission_rate: Decimal::new(5, 2),
            min_usdt: Decimal::new(1, 2),
            cache_ttl: flipex_common::time::constants::rate_cache_ttl(),
            invoice_expiry_secs: flipex_common::time::constants::invoice_expiry().num_seconds(),
            fallback_rates: default_fallback_rates(),
            database_url: "sqlite://flipexchange.db".to_string(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Default asset table: display precision and per-asset gross caps.
fn default_assets() -> Vec<AssetSpec> {
    vec![
        AssetSpec::new(Asset::Btc, "Bitcoin", 6, Decimal::new(2, 5)),
        AssetSpec::new(Asset::Eth, "Ethereum", 5, Decimal::new(25, 5)),
        AssetSpec::new(Asset::Sol, "Solana", 3, Decimal::new(5, 3)),
        AssetSpec::new(Asset::Ton, "Toncoin", 3, Decimal::new(25, 2)),
        AssetSpec::new(Asset::Not, "Notcoin", 0, Decimal::from(83)),
        AssetSpec::new(Asset::Usdt, "Tether", 2, Decimal::new(5, 1)),
    ]
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(token) = std::env::var("CRYPTO_PAY_TOKEN") {
            config.gateway.token = token;
        }

        if let Ok(url) = std::env::var("CRYPTO_PAY_API_URL") {
            config.gateway.api_url = url;
        } else if std::env::var("USE_TESTNET").is_ok() {
            config.gateway.api_url = flipex_gateway::client::TESTNET_URL.to_string();
        }

        if let Ok(url) = std::env::var("FLIPEX_DATABASE_URL") {
            config.database_url = url;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.gateway.token.is_empty() {
            return Err("Gateway token cannot be empty".to_string());
        }

        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err("Commission rate must be within [0, 1)".to_string());
        }

        if self.min_usdt <= Decimal::ZERO {
            return Err("Minimum USDT threshold must be positive".to_string());
        }

        if self.assets.is_empty() {
            return Err("Asset table cannot be empty".to_string());
        }

        if let Some(spec) = self.assets.iter().find(|s| s.max_gross <= Decimal::ZERO) {
            return Err(format!("Policy maximum for {} must be positive", spec.asset));
        }

        Ok(())
    }

    /// Look up the spec for an asset.
    pub fn spec_for(&self, asset: Asset) -> Option<&AssetSpec> {
        self.assets.iter().find(|s| s.asset == asset)
    }

    /// Derive the oracle configuration.
    pub fn oracle_config(&self) -> RateOracleConfig {
        RateOracleConfig {
            ttl: self.cache_ttl,
            fallback: self.fallback_rates.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_config() -> EngineConfig {
        EngineConfig {
            gateway: GatewayConfig {
                api_url: "https://testnet-pay.crypt.bot".to_string(),
                token: "token".to_string(),
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_default_config_requires_token() {
        assert!(EngineConfig::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_commission_bounds() {
        let mut config = valid_config();
        config.commission_rate = Decimal::ONE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_asset_table() {
        let config = valid_config();

        let ton = config.spec_for(Asset::Ton).unwrap();
        assert_eq!(ton.decimals, 3);
        assert_eq!(ton.max_gross, dec!(0.25));

        let not = config.spec_for(Asset::Not).unwrap();
        assert_eq!(not.decimals, 0);

        assert_eq!(config.commission_rate, dec!(0.05));
        assert_eq!(config.min_usdt, dec!(0.01));
    }
}
