//! Exchange request types and lifecycle for FlipExchange.

use crate::{Asset, CheckId, ExchangeId, InvoiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a durable exchange request.
///
/// Rows are append-only: a request is created `Pending` once the user
/// confirms, and moves to `Completed` when the payout check is issued.
/// Conversation-level cancellation never touches a persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// Invoice issued, awaiting payment.
    Pending,
    /// Payment received and payout check issued.
    Completed,
}

impl ExchangeStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, ExchangeStatus::Completed)
    }

    /// Get valid next states from the current state.
    pub fn valid_transitions(&self) -> &[ExchangeStatus] {
        match self {
            ExchangeStatus::Pending => &[ExchangeStatus::Completed],
            ExchangeStatus::Completed => &[],
        }
    }

    /// Check if a transition to the given state is valid.
    pub fn can_transition_to(&self, next: ExchangeStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stored string form (matches the ledger column).
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Completed => "completed",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExchangeStatus::Pending),
            "completed" => Some(ExchangeStatus::Completed),
            _ => None,
        }
    }
}

/// A durable exchange request: the unit of work recorded in the ledger.
///
/// All monetary fields are exact decimals. `gross` is denominated in the
/// source asset; the USDT fields are derived from it through the rate
/// snapshot captured at validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Unique request identifier.
    pub id: ExchangeId,
    /// Owning user.
    pub user: UserId,
    /// Source asset the user sends.
    pub asset: Asset,
    /// Gross amount in source-asset units.
    pub gross: Decimal,
    /// Rate used for conversion (USDT per source unit).
    pub rate: Decimal,
    /// Gross value converted to USDT.
    pub gross_usdt: Decimal,
    /// Commission withheld, in USDT.
    pub commission_usdt: Decimal,
    /// Net payout delivered to the user, in USDT.
    pub net_usdt: Decimal,
    /// Current lifecycle status.
    pub status: ExchangeStatus,
    /// Invoice reference at the payment gateway.
    pub invoice_id: Option<InvoiceId>,
    /// Payment URL for the invoice.
    pub invoice_url: Option<String>,
    /// Payout check reference at the payment gateway.
    pub check_id: Option<CheckId>,
    /// Redeem URL for the payout check.
    pub check_url: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the payout check was issued.
    pub settled_at: Option<DateTime<Utc>>,
}

impl ExchangeRequest {
    /// Create a new pending request from a validated quote.
    pub fn new(
        user: UserId,
        asset: Asset,
        gross: Decimal,
        rate: Decimal,
        gross_usdt: Decimal,
        commission_usdt: Decimal,
        net_usdt: Decimal,
    ) -> Self {
        Self {
            id: ExchangeId::new(),
            user,
            asset,
            gross,
            rate,
            gross_usdt,
            commission_usdt,
            net_usdt,
            status: ExchangeStatus::Pending,
            invoice_id: None,
            invoice_url: None,
            check_id: None,
            check_url: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Transition to a new status.
    pub fn transition_to(&mut self, next: ExchangeStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next == ExchangeStatus::Completed {
            self.settled_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Whether a payout check has already been issued for this request.
    pub fn is_settled(&self) -> bool {
        self.status == ExchangeStatus::Completed || self.check_id.is_some()
    }
}

/// Error when attempting an invalid status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ExchangeStatus,
    pub to: ExchangeStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid status transition from {:?} to {:?}",
            self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}
