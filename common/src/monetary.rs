//! Monetary types for FlipExchange.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A supported crypto asset. The set is closed: the exchange only quotes
/// and settles assets it has policy configuration for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Asset {
    Btc,
    Eth,
    Sol,
    Ton,
    Not,
    Usdt,
}

impl Asset {
    /// All supported assets, in display order.
    pub const ALL: [Asset; 6] = [
        Asset::Btc,
        Asset::Eth,
        Asset::Sol,
        Asset::Ton,
        Asset::Not,
        Asset::Usdt,
    ];

    /// Get the ticker code.
    pub fn code(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Sol => "SOL",
            Asset::Ton => "TON",
            Asset::Not => "NOT",
            Asset::Usdt => "USDT",
        }
    }

    /// Parse a ticker code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "BTC" => Some(Asset::Btc),
            "ETH" => Some(Asset::Eth),
            "SOL" => Some(Asset::Sol),
            "TON" => Some(Asset::Ton),
            "NOT" => Some(Asset::Not),
            "USDT" => Some(Asset::Usdt),
            _ => None,
        }
    }

    /// Whether this asset is the settlement currency.
    pub fn is_settlement(&self) -> bool {
        matches!(self, Asset::Usdt)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Static per-asset policy and display metadata, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    /// The asset this spec applies to.
    pub asset: Asset,
    /// Human-readable name shown in prompts.
    pub display_name: String,
    /// Display precision in decimal places. Formatting truncates toward
    /// zero; validation always operates on the exact value.
    pub decimals: u32,
    /// Policy maximum gross amount per exchange, in source-asset units.
    pub max_gross: Decimal,
}

impl AssetSpec {
    /// Create a new asset spec.
    pub fn new(
        asset: Asset,
        display_name: impl Into<String>,
        decimals: u32,
        max_gross: Decimal,
    ) -> Self {
        Self {
            asset,
            display_name: display_name.into(),
            decimals,
            max_gross,
        }
    }

    /// Format an amount of this asset for display, truncated (not rounded)
    /// to the display precision and padded to fixed width.
    pub fn format_amount(&self, value: Decimal) -> String {
        let mut truncated =
            value.round_dp_with_strategy(self.decimals, RoundingStrategy::ToZero);
        truncated.rescale(self.decimals);
        truncated.to_string()
    }
}

/// A monetary amount in a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// The asset this amount is denominated in.
    pub asset: Asset,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, asset: Asset) -> Self {
        Self { value, asset }
    }

    /// Create a zero amount in the given asset.
    pub fn zero(asset: Asset) -> Self {
        Self {
            value: Decimal::ZERO,
            asset,
        }
    }

    /// Check if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.asset)
    }
}

impl Add for Money {
    type Output = Result<Money, AssetMismatchError>;

    fn add(self, other: Money) -> Self::Output {
        if self.asset != other.asset {
            return Err(AssetMismatchError {
                expected: self.asset,
                actual: other.asset,
            });
        }
        Ok(Money {
            value: self.value + other.value,
            asset: self.asset,
        })
    }
}

impl Sub for Money {
    type Output = Result<Money, AssetMismatchError>;

    fn sub(self, other: Money) -> Self::Output {
        if self.asset != other.asset {
            return Err(AssetMismatchError {
                expected: self.asset,
                actual: other.asset,
            });
        }
        Ok(Money {
            value: self.value - other.value,
            asset: self.asset,
        })
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, rate: Decimal) -> Self::Output {
        Money {
            value: self.value * rate,
            asset: self.asset,
        }
    }
}

/// Error when attempting operations on amounts of different assets.
#[derive(Debug, Clone)]
pub struct AssetMismatchError {
    pub expected: Asset,
    pub actual: Asset,
}

impl fmt::Display for AssetMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Asset mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for AssetMismatchError {}

/// One conversion rate as reported by a rate provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    /// Source asset.
    pub source: Asset,
    /// Target asset.
    pub target: Asset,
    /// Units of target per one unit of source.
    pub rate: Decimal,
}

impl RateQuote {
    /// Create a new rate quote.
    pub fn new(source: Asset, target: Asset, rate: Decimal) -> Self {
        Self {
            source,
            target,
            rate,
        }
    }
}

impl fmt::Display for RateQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} = {}", self.source, self.target, self.rate)
    }
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    /// Fresh value from the live provider (possibly via the cache).
    Live,
    /// Expired cache entry served because a refresh failed.
    CachedStale,
    /// Statically configured fallback rate.
    Fallback,
    /// The settlement asset converted to itself.
    Identity,
}

/// A resolved asset -> USDT rate handed to the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// The source asset.
    pub asset: Asset,
    /// Units of USDT per one unit of the asset.
    pub rate: Decimal,
    /// Provenance of the rate.
    pub source: RateSource,
}

impl RateSnapshot {
    /// Create a new snapshot.
    pub fn new(asset: Asset, rate: Decimal, source: RateSource) -> Self {
        Self {
            asset,
            rate,
            source,
        }
    }

    /// The identity snapshot for the settlement asset.
    pub fn identity() -> Self {
        Self {
            asset: Asset::Usdt,
            rate: Decimal::ONE,
            source: RateSource::Identity,
        }
    }

    /// Convert a gross amount of the snapshot's asset into USDT.
    pub fn to_usdt(&self, amount: Decimal) -> Decimal {
        amount * self.rate
    }
}
