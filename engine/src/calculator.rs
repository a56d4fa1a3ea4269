//! Commission calculation.

use rust_decimal::Decimal;

/// Commission split of a gross USDT value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionBreakdown {
    /// Gross value before commission.
    pub gross_usdt: Decimal,
    /// Commission withheld.
    pub commission_usdt: Decimal,
    /// Net payout after commission.
    pub net_usdt: Decimal,
}

/// Split a gross USDT value into commission and net payout.
///
/// `commission_usdt + net_usdt == gross_usdt` holds exactly; the split is
/// pure decimal arithmetic with no rounding step.
pub fn compute_commission(gross_usdt: Decimal, commission_rate: Decimal) -> CommissionBreakdown {
    let commission_usdt = gross_usdt * commission_rate;
    let net_usdt = gross_usdt - commission_usdt;

    CommissionBreakdown {
        gross_usdt,
        commission_usdt,
        net_usdt,
    }
}
