//! Rate oracle: cached provider access with a fallback chain.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use flipex_common::{Asset, RateSnapshot, RateSource};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheLookup, RateCache, RateTable};
use crate::error::{RateError, RateResult};
use crate::provider::RateProvider;

/// Configuration for the rate oracle.
#[derive(Debug, Clone)]
pub struct RateOracleConfig {
    /// How long a fetched table stays fresh.
    pub ttl: Duration,
    /// Static asset -> USDT rates served when both the provider and the
    /// stale cache come up empty.
    pub fallback: HashMap<Asset, Decimal>,
}

impl Default for RateOracleConfig {
    fn default() -> Self {
        Self {
            ttl: flipex_common::time::constants::rate_cache_ttl(),
            fallback: default_fallback_rates(),
        }
    }
}

/// Conservative static rates of last resort.
pub fn default_fallback_rates() -> HashMap<Asset, Decimal> {
    HashMap::from([
        (Asset::Btc, Decimal::from(30000)),
        (Asset::Eth, Decimal::from(2000)),
        (Asset::Sol, Decimal::from(100)),
        (Asset::Ton, Decimal::from(2)),
        (Asset::Not, Decimal::new(6, 3)),
    ])
}

/// The rate oracle.
///
/// Resolution order for `asset -> USDT`:
/// 1. USDT itself resolves to 1 without touching the provider.
/// 2. A fresh cached rate.
/// 3. A provider refresh (the cache table is replaced wholesale).
/// 4. A stale-but-present cached rate.
/// 5. A statically configured fallback rate.
///
/// Provider failures are absorbed into steps 4-5; they never surface as a
/// fault to the caller.
pub struct RateOracle {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    config: RateOracleConfig,
}

impl RateOracle {
    /// Create a new oracle over the given provider.
    pub fn new(provider: Arc<dyn RateProvider>, config: RateOracleConfig) -> Self {
        Self {
            provider,
            cache: RateCache::new(config.ttl),
            config,
        }
    }

    /// Resolve the current asset -> USDT rate.
    #[instrument(skip(self), fields(asset = %asset))]
    pub async fn get_rate(&self, asset: Asset) -> RateResult<RateSnapshot> {
        if asset.is_settlement() {
            return Ok(RateSnapshot::identity());
        }

        if let CacheLookup::Fresh(rate) = self.cache.get(asset, Asset::Usdt) {
            debug!("Using cached rate");
            return Ok(RateSnapshot::new(asset, rate, RateSource::Live));
        }

        match self.refresh().await {
            Ok(()) => {
                if let CacheLookup::Fresh(rate) = self.cache.get(asset, Asset::Usdt) {
                    return Ok(RateSnapshot::new(asset, rate, RateSource::Live));
                }
                // Refresh succeeded but the provider table cannot resolve
                // this pair; fall through to the static fallback.
            }
            Err(e) => {
                warn!(error = %e, "Rate refresh failed");

                if let CacheLookup::Stale(rate) = self.cache.get(asset, Asset::Usdt) {
                    warn!(rate = %rate, "Serving stale cached rate");
                    return Ok(RateSnapshot::new(asset, rate, RateSource::CachedStale));
                }
            }
        }

        if let Some(rate) = self.config.fallback.get(&asset) {
            warn!(rate = %rate, "Serving static fallback rate");
            return Ok(RateSnapshot::new(asset, *rate, RateSource::Fallback));
        }

        Err(RateError::Unavailable(asset))
    }

    /// Get the current table for overview display, refreshing it first if
    /// it has expired.
    pub async fn rate_table(&self) -> RateResult<Arc<RateTable>> {
        if !self.cache.is_fresh() {
            self.refresh().await?;
        }

        self.cache
            .snapshot()
            .ok_or(RateError::Provider("rate table empty".to_string()))
    }

    async fn refresh(&self) -> RateResult<()> {
        let quotes = self.provider.fetch_rates().await?;
        let count = quotes.len();
        self.cache.replace(quotes);

        info!(
            provider = self.provider.name(),
            quotes = count,
            "Rate cache refreshed"
        );
        Ok(())
    }
}
