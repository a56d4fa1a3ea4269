//! Rate provider trait and test double.

use async_trait::async_trait;
use flipex_common::RateQuote;

use crate::error::RateResult;

/// Trait for live rate sources.
///
/// A provider returns its full conversion table in one call; the oracle
/// replaces its cache wholesale from the result.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the full rate table.
    async fn fetch_rates(&self) -> RateResult<Vec<RateQuote>>;
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    quotes: parking_lot::Mutex<Vec<RateQuote>>,
    fail: std::sync::atomic::AtomicBool,
    fetch_count: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quotes: parking_lot::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
            fetch_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the quotes returned by the next fetches.
    pub fn set_quotes(&self, quotes: Vec<RateQuote>) {
        *self.quotes.lock() = quotes;
    }

    /// Make subsequent fetches fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of fetch calls observed.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> RateResult<Vec<RateQuote>> {
        self.fetch_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::RateError::Provider(
                "mock provider failure".to_string(),
            ));
        }

        Ok(self.quotes.lock().clone())
    }
}
