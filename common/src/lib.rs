//! FlipExchange Common Types
//!
//! This crate contains shared types used across the FlipExchange service,
//! including identifiers, monetary types, and the exchange request lifecycle.

pub mod identifiers;
pub mod monetary;
pub mod exchange;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use exchange::*;
pub use error::*;
pub use time::*;
