//! FlipExchange Payment Gateway
//!
//! Client for the Crypto Pay custodial payment API: payable invoices,
//! redeemable payout checks, invoice status polling, and the exchange-rate
//! table (the same API doubles as the live price source).

pub mod client;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{CryptoPayClient, PaymentGateway};
pub use error::{GatewayError, GatewayResult};
pub use types::{Check, Invoice, InvoiceSpec, InvoiceStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockGateway;
