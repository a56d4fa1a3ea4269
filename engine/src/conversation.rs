//! Per-user conversation state and transport events.

use flipex_common::{Asset, ExchangeId, InvoiceId, RateSnapshot};
use flipex_ledger::UserProfile;
use rust_decimal::Decimal;

/// A fully computed exchange quote held while the user confirms.
///
/// Every field is present by construction; there is no partially filled
/// quote for a defensive check to catch.
#[derive(Debug, Clone)]
pub struct ExchangeQuote {
    /// Source asset.
    pub asset: Asset,
    /// Gross amount in source units.
    pub gross: Decimal,
    /// Rate snapshot captured at validation time.
    pub rate: RateSnapshot,
    /// Gross value in USDT.
    pub gross_usdt: Decimal,
    /// Commission in USDT.
    pub commission_usdt: Decimal,
    /// Net payout in USDT.
    pub net_usdt: Decimal,
}

/// Ephemeral conversation state, one payload shape per step.
///
/// Terminal outcomes (settled, cancelled) are represented by removing the
/// session entry; a fresh conversation always starts over from
/// `SelectingCurrency`. State is in-memory only — a restart loses it, and
/// the durable exchange row is what survives.
#[derive(Debug, Clone)]
pub enum ConversationState {
    /// Waiting for the user to pick a source currency.
    SelectingCurrency,
    /// Waiting for an amount of the chosen asset.
    EnteringAmount { asset: Asset },
    /// Waiting for the user to approve the computed quote.
    Confirming { quote: ExchangeQuote },
    /// Invoice issued; waiting for payment and settlement.
    AwaitingPayment {
        exchange_id: ExchangeId,
        invoice_id: InvoiceId,
    },
}

impl ConversationState {
    /// State name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::SelectingCurrency => "selecting_currency",
            ConversationState::EnteringAmount { .. } => "entering_amount",
            ConversationState::Confirming { .. } => "confirming",
            ConversationState::AwaitingPayment { .. } => "awaiting_payment",
        }
    }
}

/// A discrete event delivered by the chat transport.
#[derive(Debug, Clone)]
pub enum Event {
    /// User opened or reset the conversation.
    Start { profile: UserProfile },
    /// User picked a source currency.
    SelectCurrency { code: String },
    /// User submitted an amount as free text.
    SubmitAmount { text: String },
    /// User approved the quote.
    Confirm,
    /// User aborted the conversation.
    Cancel,
    /// User claims the invoice is paid.
    CheckPayment,
    /// User asked for the latest exchange status.
    Status,
    /// User asked for the current rate table.
    Rates,
}
