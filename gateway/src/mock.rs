//! Scriptable in-memory gateway for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use flipex_common::{Asset, CheckId, InvoiceId, UserId};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::client::PaymentGateway;
use crate::error::{GatewayError, GatewayResult};
use crate::types::{Check, Invoice, InvoiceSpec, InvoiceStatus};

/// A recorded payout call.
#[derive(Debug, Clone)]
pub struct RecordedCheck {
    pub asset: Asset,
    pub amount: Decimal,
    pub pin_to_user: UserId,
}

/// Mock payment gateway.
///
/// Invoices start `Active` and are flipped to `Paid` by the test; every
/// side-effecting call is counted so idempotence can be asserted.
pub struct MockGateway {
    invoices: Mutex<HashMap<i64, InvoiceStatus>>,
    checks: Mutex<Vec<RecordedCheck>>,
    next_id: AtomicI64,
    invoice_calls: AtomicUsize,
    check_calls: AtomicUsize,
    fail_invoices: AtomicBool,
    fail_checks: AtomicBool,
    fail_status: AtomicBool,
}

impl MockGateway {
    /// Create a new mock gateway.
    pub fn new() -> Self {
        Self {
            invoices: Mutex::new(HashMap::new()),
            checks: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            invoice_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
            fail_invoices: AtomicBool::new(false),
            fail_checks: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
        }
    }

    /// Mark an invoice as paid.
    pub fn mark_paid(&self, id: InvoiceId) {
        self.invoices
            .lock()
            .insert(id.as_i64(), InvoiceStatus::Paid);
    }

    /// Make invoice creation fail.
    pub fn fail_invoices(&self, failing: bool) {
        self.fail_invoices.store(failing, Ordering::SeqCst);
    }

    /// Make check creation fail.
    pub fn fail_checks(&self, failing: bool) {
        self.fail_checks.store(failing, Ordering::SeqCst);
    }

    /// Make status polling fail.
    pub fn fail_status(&self, failing: bool) {
        self.fail_status.store(failing, Ordering::SeqCst);
    }

    /// Number of invoice-creation calls observed.
    pub fn invoice_calls(&self) -> usize {
        self.invoice_calls.load(Ordering::SeqCst)
    }

    /// Number of payout calls observed.
    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    /// Payout calls recorded so far.
    pub fn recorded_checks(&self) -> Vec<RecordedCheck> {
        self.checks.lock().clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_invoice(&self, _spec: InvoiceSpec) -> GatewayResult<Invoice> {
        self.invoice_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(GatewayError::Http("mock invoice failure".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.invoices.lock().insert(id, InvoiceStatus::Active);

        Ok(Invoice {
            id: InvoiceId::new(id),
            pay_url: format!("https://t.me/CryptoBot?start=IV{id}"),
        })
    }

    async fn invoice_status(&self, id: InvoiceId) -> GatewayResult<InvoiceStatus> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(GatewayError::Http("mock status failure".to_string()));
        }

        self.invoices
            .lock()
            .get(&id.as_i64())
            .copied()
            .ok_or(GatewayError::MissingResult(format!("invoice {id}")))
    }

    async fn create_check(
        &self,
        asset: Asset,
        amount: Decimal,
        pin_to_user: UserId,
    ) -> GatewayResult<Check> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(GatewayError::Http("mock check failure".to_string()));
        }

        self.checks.lock().push(RecordedCheck {
            asset,
            amount,
            pin_to_user,
        });

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Check {
            id: CheckId::new(id),
            redeem_url: format!("https://t.me/CryptoBot?start=CQ{id}"),
        })
    }
}
