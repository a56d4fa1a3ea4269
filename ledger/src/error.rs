//! Ledger error types.

use thiserror::Error;

/// Errors from the exchange ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded back into its domain type.
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
