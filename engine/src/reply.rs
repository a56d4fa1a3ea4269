//! Structured replies returned to the chat transport.

use flipex_common::Asset;
use rust_decimal::Decimal;

/// A structured action the transport can offer as a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceAction {
    /// Select a source currency.
    SelectCurrency(Asset),
    /// Approve the pending quote.
    Confirm,
    /// Abort the conversation.
    Cancel,
    /// Poll payment status.
    CheckPayment,
    /// Begin a fresh exchange.
    NewExchange,
    /// Open an external URL (invoice or check).
    OpenUrl(String),
}

/// One selectable choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub action: ChoiceAction,
}

/// Prompt text plus optional structured choices.
///
/// The core produces content only; rendering (markup, buttons, parse mode)
/// is the transport's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub choices: Vec<Choice>,
}

impl Reply {
    /// Create a reply with no choices.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
        }
    }

    /// Append a choice.
    pub fn with_choice(mut self, label: impl Into<String>, action: ChoiceAction) -> Self {
        self.choices.push(Choice {
            label: label.into(),
            action,
        });
        self
    }
}

/// Format a USDT value for display, rounded to four places.
pub fn format_usdt(value: Decimal) -> String {
    value.round_dp(4).normalize().to_string()
}
