//! Amount validation against rates and policy limits.

use std::sync::Arc;

use flipex_common::{AssetSpec, ExchangeError, Money, RateSnapshot, Result};
use flipex_rates::RateOracle;
use rust_decimal::Decimal;

/// A successfully validated amount with its derived values.
#[derive(Debug, Clone)]
pub struct ValidatedAmount {
    /// Gross amount in the source asset.
    pub gross: Money,
    /// Rate snapshot used for the conversion.
    pub rate: RateSnapshot,
    /// Gross value converted to USDT.
    pub gross_usdt: Decimal,
    /// Policy maximum for this asset, in source units.
    pub max_gross: Money,
}

/// Validates user-declared amounts.
///
/// Purely derives a decision from the current oracle state and static
/// policy; it mutates nothing.
pub struct AmountValidator {
    oracle: Arc<RateOracle>,
    min_usdt: Decimal,
}

impl AmountValidator {
    /// Create a new validator.
    pub fn new(oracle: Arc<RateOracle>, min_usdt: Decimal) -> Self {
        Self { oracle, min_usdt }
    }

    /// Validate an amount of the given asset.
    ///
    /// The minimum threshold applies to the USDT equivalent and is
    /// reported converted back into the source currency; the maximum is a
    /// per-asset cap on the gross amount. Both boundaries are inclusive.
    pub async fn validate(&self, spec: &AssetSpec, amount: Decimal) -> Result<ValidatedAmount> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::AmountNotPositive);
        }

        let rate = self
            .oracle
            .get_rate(spec.asset)
            .await
            .map_err(|_| ExchangeError::RateUnavailable(spec.asset))?;

        if rate.rate <= Decimal::ZERO {
            return Err(ExchangeError::RateUnavailable(spec.asset));
        }

        let gross_usdt = rate.to_usdt(amount);

        if gross_usdt < self.min_usdt {
            // Ceiling keeps the reported boundary at or above the real one.
            let boundary = (self.min_usdt / rate.rate)
                .round_dp_with_strategy(8, rust_decimal::RoundingStrategy::ToPositiveInfinity)
                .normalize();
            return Err(ExchangeError::BelowMinimum {
                minimum: Money::new(boundary, spec.asset),
            });
        }

        if amount > spec.max_gross {
            return Err(ExchangeError::AboveMaximum {
                maximum: Money::new(spec.max_gross, spec.asset),
            });
        }

        Ok(ValidatedAmount {
            gross: Money::new(amount, spec.asset),
            rate,
            gross_usdt,
            max_gross: Money::new(spec.max_gross, spec.asset),
        })
    }
}
