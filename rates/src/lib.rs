//! FlipExchange Price Oracle
//!
//! Resolves asset -> USDT conversion rates through a cached provider with a
//! fallback chain.
//!
//! # Features
//!
//! - Full-table rate caching with configurable TTL
//! - Atomic table replacement (readers never see a partial refresh)
//! - Cross-rate resolution by pivoting through BTC or TON
//! - Stale-entry and static-fallback service when the provider fails
//!
//! # Example
//!
//! ```rust,ignore
//! use flipex_rates::{RateOracle, RateOracleConfig};
//! use flipex_common::Asset;
//!
//! let oracle = RateOracle::new(provider, RateOracleConfig::default());
//! let snapshot = oracle.get_rate(Asset::Ton).await?;
//! let usdt = snapshot.to_usdt(amount);
//! ```

pub mod cache;
pub mod error;
pub mod oracle;
pub mod provider;

pub use cache::{CacheLookup, RateCache, RateTable};
pub use error::{RateError, RateResult};
pub use oracle::{RateOracle, RateOracleConfig};
pub use provider::RateProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
