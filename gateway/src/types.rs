//! Gateway request and response types.

use flipex_common::{Asset, CheckId, InvoiceId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Parameters for creating a payable invoice.
#[derive(Debug, Clone)]
pub struct InvoiceSpec {
    /// Asset the user must pay in.
    pub asset: Asset,
    /// Gross amount to collect.
    pub amount: Decimal,
    /// Human-readable description shown on the invoice.
    pub description: String,
    /// Opaque payload echoed back by the gateway.
    pub payload: Option<String>,
    /// Invoice validity in seconds.
    pub expires_in_secs: i64,
}

/// A payable invoice created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Gateway-assigned invoice identifier.
    pub id: InvoiceId,
    /// URL the user opens to pay.
    pub pay_url: String,
}

/// Lifecycle status of an invoice at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Awaiting payment.
    Active,
    /// Paid in full.
    Paid,
    /// Expired unpaid.
    Expired,
}

impl InvoiceStatus {
    /// Parse the gateway's string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(InvoiceStatus::Active),
            "paid" => Some(InvoiceStatus::Paid),
            "expired" => Some(InvoiceStatus::Expired),
            _ => None,
        }
    }
}

/// A redeemable payout check created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Gateway-assigned check identifier.
    pub id: CheckId,
    /// URL the user opens to redeem.
    pub redeem_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_status_parse() {
        assert_eq!(InvoiceStatus::parse("paid"), Some(InvoiceStatus::Paid));
        assert_eq!(InvoiceStatus::parse("active"), Some(InvoiceStatus::Active));
        assert_eq!(InvoiceStatus::parse("cancelled"), None);
    }
}
