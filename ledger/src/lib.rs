//! FlipExchange Ledger
//!
//! Durable record of exchange requests and their lifecycle, backed by a
//! local SQLite database. Rows are append-only: they are inserted when a
//! user confirms an exchange and updated as payment and settlement events
//! occur, never deleted.

pub mod error;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use store::{ExchangeStore, LedgerStats, UserProfile};
