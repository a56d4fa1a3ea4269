//! Error types for FlipExchange operations.

use crate::{Asset, ExchangeId, ExchangeStatus, Money};
use thiserror::Error;

/// Main error type for exchange operations.
///
/// Every failure is scoped to a single conversation or a single external
/// call; nothing here may terminate the long-running process.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The submitted text did not contain a usable number.
    #[error("Could not read an amount from the input")]
    AmountNotNumeric,

    /// The amount must be strictly positive.
    #[error("Amount must be greater than zero")]
    AmountNotPositive,

    /// USDT equivalent is below the minimum threshold. The boundary is
    /// reported converted into the source currency for legibility.
    #[error("Minimum amount is {minimum}")]
    BelowMinimum { minimum: Money },

    /// Gross amount exceeds the per-asset policy maximum.
    #[error("Maximum amount is {maximum}")]
    AboveMaximum { maximum: Money },

    /// No live, stale, or fallback rate exists for the asset.
    #[error("Rate unavailable for {0}/USDT")]
    RateUnavailable(Asset),

    /// Unknown currency code from the transport.
    #[error("Unsupported currency: {0}")]
    UnsupportedAsset(String),

    /// The payment gateway call failed or timed out.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Exchange request not found in the ledger.
    #[error("Exchange request not found: {0}")]
    RequestNotFound(ExchangeId),

    /// The request belongs to a different user.
    #[error("Exchange request {0} belongs to another user")]
    NotRequestOwner(ExchangeId),

    /// The in-memory conversation no longer matches durable state.
    /// Fatal for that conversation only; the session is cleared.
    #[error("Conversation state is no longer valid")]
    StaleConversation,

    /// Invalid status transition on a durable request.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExchangeStatus,
        to: ExchangeStatus,
    },

    /// Ledger read/write failure.
    #[error("Ledger error: {0}")]
    LedgerError(String),

    /// Configuration error at startup.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ExchangeError {
    /// Check if the user can recover by adjusting input or retrying,
    /// without restarting the conversation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExchangeError::AmountNotNumeric
                | ExchangeError::AmountNotPositive
                | ExchangeError::BelowMinimum { .. }
                | ExchangeError::AboveMaximum { .. }
                | ExchangeError::RateUnavailable(_)
                | ExchangeError::UnsupportedAsset(_)
                | ExchangeError::GatewayUnavailable(_)
        )
    }

    /// Get error code for structured logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::AmountNotNumeric => "AMOUNT_NOT_NUMERIC",
            ExchangeError::AmountNotPositive => "AMOUNT_NOT_POSITIVE",
            ExchangeError::BelowMinimum { .. } => "BELOW_MINIMUM",
            ExchangeError::AboveMaximum { .. } => "ABOVE_MAXIMUM",
            ExchangeError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            ExchangeError::UnsupportedAsset(_) => "UNSUPPORTED_ASSET",
            ExchangeError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            ExchangeError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            ExchangeError::NotRequestOwner(_) => "NOT_REQUEST_OWNER",
            ExchangeError::StaleConversation => "STALE_CONVERSATION",
            ExchangeError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ExchangeError::LedgerError(_) => "LEDGER_ERROR",
            ExchangeError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<crate::InvalidTransition> for ExchangeError {
    fn from(e: crate::InvalidTransition) -> Self {
        ExchangeError::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

/// Result type alias for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_policy_rejections_are_recoverable() {
        let below = ExchangeError::BelowMinimum {
            minimum: Money::new(dec!(0.005), Asset::Ton),
        };
        assert!(below.is_recoverable());
        assert!(ExchangeError::RateUnavailable(Asset::Btc).is_recoverable());
        assert!(!ExchangeError::StaleConversation.is_recoverable());
    }

    #[test]
    fn test_boundary_reported_in_source_currency() {
        let err = ExchangeError::BelowMinimum {
            minimum: Money::new(dec!(0.005), Asset::Ton),
        };
        assert_eq!(err.to_string(), "Minimum amount is 0.005 TON");
    }
}
