//! Price oracle error types.

use flipex_common::Asset;
use thiserror::Error;

/// Errors that can occur while resolving rates.
#[derive(Debug, Error)]
pub enum RateError {
    /// No live, stale, or fallback rate exists for the asset.
    #[error("Rate not available for {0}/USDT")]
    Unavailable(Asset),

    /// The rate provider failed (network, HTTP, or parse error).
    #[error("Rate provider error: {0}")]
    Provider(String),
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
