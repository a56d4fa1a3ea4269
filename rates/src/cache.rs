//! Rate table caching with TTL support.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use flipex_common::{Asset, RateQuote};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

/// An immutable snapshot of the provider's conversion table.
///
/// Lookups resolve a pair directly, or by pivoting through BTC and then
/// TON when no direct quote exists.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<(Asset, Asset), Decimal>,
    fetched_at: DateTime<Utc>,
}

impl RateTable {
    /// Pivot assets tried, in order, when a direct quote is missing.
    const PIVOTS: [Asset; 2] = [Asset::Btc, Asset::Ton];

    /// Build a table from provider quotes.
    pub fn new(quotes: Vec<RateQuote>) -> Self {
        let rates = quotes
            .into_iter()
            .map(|q| ((q.source, q.target), q.rate))
            .collect();

        Self {
            rates,
            fetched_at: Utc::now(),
        }
    }

    /// Resolve a rate for the pair, pivoting if necessary.
    pub fn lookup(&self, source: Asset, target: Asset) -> Option<Decimal> {
        if let Some(rate) = self.rates.get(&(source, target)) {
            return Some(*rate);
        }

        for pivot in Self::PIVOTS {
            if let (Some(leg_in), Some(leg_out)) = (
                self.rates.get(&(source, pivot)),
                self.rates.get(&(pivot, target)),
            ) {
                return Some(leg_in * leg_out);
            }
        }

        None
    }

    /// Age of the table since fetch.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.fetched_at)
    }

    /// When the table was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Number of direct quotes in the table.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over the direct quotes, for rate-overview display.
    pub fn quotes(&self) -> impl Iterator<Item = RateQuote> + '_ {
        self.rates
            .iter()
            .map(|(&(source, target), &rate)| RateQuote::new(source, target, rate))
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Rate found and the table is within its TTL.
    Fresh(Decimal),
    /// Rate found but the table has expired.
    Stale(Decimal),
    /// No table, or the pair cannot be resolved from it.
    Miss,
}

/// Thread-safe holder for the current rate table.
///
/// Refresh replaces the whole table in one swap, so readers never observe
/// a partially updated cache.
pub struct RateCache {
    table: RwLock<Option<Arc<RateTable>>>,
    ttl: Duration,
}

impl RateCache {
    /// Create a new cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: RwLock::new(None),
            ttl,
        }
    }

    /// Look up a pair in the current table.
    pub fn get(&self, source: Asset, target: Asset) -> CacheLookup {
        let guard = self.table.read();
        let Some(table) = guard.as_ref() else {
            debug!(source = %source, target = %target, "Cache miss: no table");
            return CacheLookup::Miss;
        };

        match table.lookup(source, target) {
            Some(rate) if table.age() < self.ttl => CacheLookup::Fresh(rate),
            Some(rate) => {
                debug!(source = %source, target = %target, "Cache entry expired");
                CacheLookup::Stale(rate)
            }
            None => CacheLookup::Miss,
        }
    }

    /// Replace the table with freshly fetched quotes.
    pub fn replace(&self, quotes: Vec<RateQuote>) {
        let table = Arc::new(RateTable::new(quotes));
        *self.table.write() = Some(table);
    }

    /// Get the current table snapshot, fresh or stale.
    pub fn snapshot(&self) -> Option<Arc<RateTable>> {
        self.table.read().clone()
    }

    /// Whether the current table is within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.table
            .read()
            .as_ref()
            .map(|t| t.age() < self.ttl)
            .unwrap_or(false)
    }

    /// Drop the cached table.
    pub fn clear(&self) {
        *self.table.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quotes() -> Vec<RateQuote> {
        vec![
            RateQuote::new(Asset::Ton, Asset::Usdt, dec!(2.0)),
            RateQuote::new(Asset::Eth, Asset::Btc, dec!(0.05)),
            RateQuote::new(Asset::Btc, Asset::Usdt, dec!(30000)),
            RateQuote::new(Asset::Not, Asset::Ton, dec!(0.003)),
        ]
    }

    #[test]
    fn test_direct_lookup() {
        let table = RateTable::new(quotes());
        assert_eq!(table.lookup(Asset::Ton, Asset::Usdt), Some(dec!(2.0)));
    }

    #[test]
    fn test_pivot_through_btc() {
        let table = RateTable::new(quotes());
        // ETH/USDT via ETH/BTC * BTC/USDT
        assert_eq!(table.lookup(Asset::Eth, Asset::Usdt), Some(dec!(1500.00)));
    }

    #[test]
    fn test_pivot_through_ton() {
        let table = RateTable::new(quotes());
        // NOT/USDT via NOT/TON * TON/USDT
        assert_eq!(table.lookup(Asset::Not, Asset::Usdt), Some(dec!(0.0060)));
    }

    #[test]
    fn test_unresolvable_pair() {
        let table = RateTable::new(quotes());
        assert_eq!(table.lookup(Asset::Sol, Asset::Usdt), None);
    }

    #[test]
    fn test_cache_fresh_hit() {
        let cache = RateCache::new(Duration::seconds(300));
        cache.replace(quotes());

        assert_eq!(
            cache.get(Asset::Ton, Asset::Usdt),
            CacheLookup::Fresh(dec!(2.0))
        );
        assert!(cache.is_fresh());
    }

    #[test]
    fn test_cache_expiry_serves_stale() {
        // Zero TTL: every entry is immediately stale but still present.
        let cache = RateCache::new(Duration::zero());
        cache.replace(quotes());

        assert_eq!(
            cache.get(Asset::Ton, Asset::Usdt),
            CacheLookup::Stale(dec!(2.0))
        );
        assert!(!cache.is_fresh());
    }

    #[test]
    fn test_cache_miss_without_table() {
        let cache = RateCache::new(Duration::seconds(300));
        assert_eq!(cache.get(Asset::Ton, Asset::Usdt), CacheLookup::Miss);
    }

    #[test]
    fn test_replace_swaps_whole_table() {
        let cache = RateCache::new(Duration::seconds(300));
        cache.replace(quotes());
        cache.replace(vec![RateQuote::new(Asset::Sol, Asset::Usdt, dec!(100))]);

        // Old entries are gone after a replace.
        assert_eq!(cache.get(Asset::Ton, Asset::Usdt), CacheLookup::Miss);
        assert_eq!(
            cache.get(Asset::Sol, Asset::Usdt),
            CacheLookup::Fresh(dec!(100))
        );
    }

    #[test]
    fn test_clear() {
        let cache = RateCache::new(Duration::seconds(300));
        cache.replace(quotes());
        cache.clear();

        assert!(cache.snapshot().is_none());
    }
}
