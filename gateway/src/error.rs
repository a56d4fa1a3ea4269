//! Payment gateway error types.

use thiserror::Error;

/// Errors from the payment gateway.
///
/// All variants represent a transient external failure; the caller surfaces
/// them to the user as "try again later" and keeps the conversation alive.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The API returned an error envelope.
    #[error("API error {code}: {name}")]
    Api { code: i64, name: String },

    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The API reported success but the expected payload was missing.
    #[error("Malformed response: {0}")]
    MissingResult(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
