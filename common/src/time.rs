//! Time utilities and constants for FlipExchange.

use chrono::{DateTime, Duration, Utc};

/// Service timing constants.
pub mod constants {
    use super::Duration;

    /// Default rate-cache time-to-live (5 minutes).
    pub fn rate_cache_ttl() -> Duration {
        Duration::seconds(300)
    }

    /// Invoice validity window (15 minutes).
    pub fn invoice_expiry() -> Duration {
        Duration::seconds(900)
    }
}

/// A timestamp with timezone (always UTC for FlipExchange).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has expired (is in the past).
pub fn is_expired(expiry: Timestamp) -> bool {
    now() > expiry
}

/// Calculate expiry time from now.
pub fn expires_in(duration: Duration) -> Timestamp {
    now() + duration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let past = now() - Duration::seconds(10);
        assert!(is_expired(past));

        let future = now() + Duration::seconds(10);
        assert!(!is_expired(future));
    }

    #[test]
    fn test_expires_in() {
        let expiry = expires_in(Duration::seconds(30));
        assert!(!is_expired(expiry));
    }
}
