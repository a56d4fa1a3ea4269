//! The exchange engine: event dispatch over per-user conversations.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use flipex_common::{Asset, ExchangeError, ExchangeRequest, Result, UserId};
use flipex_gateway::{InvoiceSpec, InvoiceStatus, PaymentGateway};
use flipex_ledger::{ExchangeStore, LedgerStats, UserProfile};
use flipex_rates::RateOracle;
use tracing::{error, info, instrument, warn};

use crate::calculator::compute_commission;
use crate::config::EngineConfig;
use crate::conversation::{ConversationState, Event, ExchangeQuote};
use crate::parse::parse_amount;
use crate::reply::{format_usdt, ChoiceAction, Reply};
use crate::validator::AmountValidator;

/// Drives user conversations through the exchange lifecycle.
///
/// One engine instance serves all users; each user's events arrive one at
/// a time from the transport, so a conversation progresses strictly
/// sequentially while independent users proceed concurrently.
pub struct ExchangeEngine {
    config: EngineConfig,
    oracle: Arc<RateOracle>,
    gateway: Arc<dyn PaymentGateway>,
    store: ExchangeStore,
    validator: AmountValidator,
    sessions: DashMap<UserId, ConversationState>,
}

impl ExchangeEngine {
    /// Create a new engine.
    pub fn new(
        config: EngineConfig,
        oracle: Arc<RateOracle>,
        gateway: Arc<dyn PaymentGateway>,
        store: ExchangeStore,
    ) -> Self {
        let validator = AmountValidator::new(oracle.clone(), config.min_usdt);

        Self {
            config,
            oracle,
            gateway,
            store,
            validator,
            sessions: DashMap::new(),
        }
    }

    /// Handle one transport event, always yielding a renderable reply.
    ///
    /// Errors never escape to the transport: recoverable ones are surfaced
    /// verbatim and leave the conversation in place, state-consistency
    /// faults clear the conversation with a restart prompt.
    #[instrument(skip(self, event), fields(user = %user))]
    pub async fn handle(&self, user: UserId, event: Event) -> Reply {
        let result = match event {
            Event::Start { profile } => self.start(user, profile).await,
            Event::SelectCurrency { code } => self.select_currency(user, &code).await,
            Event::SubmitAmount { text } => self.submit_amount(user, &text).await,
            Event::Confirm => self.confirm(user).await,
            Event::Cancel => Ok(self.cancel(user)),
            Event::CheckPayment => self.check_payment(user).await,
            Event::Status => self.status(user).await,
            Event::Rates => Ok(self.rates_overview().await),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => self.reply_for_error(user, e),
        }
    }

    /// Aggregate ledger counters for the health surface.
    pub async fn stats(&self) -> Result<LedgerStats> {
        self.store
            .aggregate_counts()
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))
    }

    async fn start(&self, user: UserId, profile: UserProfile) -> Result<Reply> {
        self.store
            .get_or_create_user(user, &profile)
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?;

        self.sessions
            .insert(user, ConversationState::SelectingCurrency);

        let commission_pct = self.config.commission_rate * rust_decimal::Decimal::from(100);
        let text = format!(
            "Welcome to FlipExchange.\n\n\
             Commission per exchange: {}%\n\
             Minimum: {} USDT equivalent\n\n\
             Pick the currency you want to send:",
            commission_pct.normalize(),
            format_usdt(self.config.min_usdt),
        );

        Ok(self.with_currency_choices(Reply::text(text)))
    }

    async fn select_currency(&self, user: UserId, code: &str) -> Result<Reply> {
        match self.session(user) {
            Some(ConversationState::SelectingCurrency)
            | Some(ConversationState::EnteringAmount { .. }) => {}
            _ => return Ok(self.wrong_state_reply()),
        }

        let asset = Asset::from_code(code)
            .ok_or(ExchangeError::UnsupportedAsset(code.to_string()))?;
        let spec = self
            .config
            .spec_for(asset)
            .ok_or(ExchangeError::UnsupportedAsset(code.to_string()))?;

        // Best effort: annotate the cap with its USDT equivalent, but an
        // unavailable rate must not block the transition.
        let equivalent = match self.oracle.get_rate(asset).await {
            Ok(snapshot) => format!(
                " (~{} USDT)",
                format_usdt(snapshot.to_usdt(spec.max_gross))
            ),
            Err(e) => {
                warn!(asset = %asset, error = %e, "No rate for cap annotation");
                String::new()
            }
        };

        let text = format!(
            "You chose {}.\n\n\
             Enter the amount of {} to exchange.\n\
             Maximum per exchange: {} {}{}\n\n\
             Example: 0.2",
            spec.display_name,
            spec.display_name,
            spec.format_amount(spec.max_gross),
            asset,
            equivalent,
        );

        self.sessions
            .insert(user, ConversationState::EnteringAmount { asset });

        Ok(Reply::text(text).with_choice("Cancel", ChoiceAction::Cancel))
    }

    async fn submit_amount(&self, user: UserId, text: &str) -> Result<Reply> {
        let Some(ConversationState::EnteringAmount { asset }) = self.session(user) else {
            return Ok(self.wrong_state_reply());
        };

        let spec = self
            .config
            .spec_for(asset)
            .ok_or(ExchangeError::StaleConversation)?;

        let amount = parse_amount(text).ok_or(ExchangeError::AmountNotNumeric)?;

        // Rejections return here and the session stays in EnteringAmount.
        let validated = self.validator.validate(spec, amount).await?;
        let split = compute_commission(validated.gross_usdt, self.config.commission_rate);

        let quote = ExchangeQuote {
            asset,
            gross: validated.gross.value,
            rate: validated.rate,
            gross_usdt: split.gross_usdt,
            commission_usdt: split.commission_usdt,
            net_usdt: split.net_usdt,
        };

        let text = format!(
            "Confirm your exchange:\n\n\
             You send: {} {} (~{} USDT)\n\
             You receive: {} USDT\n\
             Commission: {} USDT\n\n\
             All correct?",
            spec.format_amount(quote.gross),
            asset,
            format_usdt(quote.gross_usdt),
            format_usdt(quote.net_usdt),
            format_usdt(quote.commission_usdt),
        );

        self.sessions
            .insert(user, ConversationState::Confirming { quote });

        Ok(Reply::text(text)
            .with_choice("Yes, continue", ChoiceAction::Confirm)
            .with_choice("No, cancel", ChoiceAction::Cancel))
    }

    async fn confirm(&self, user: UserId) -> Result<Reply> {
        let quote = match self.session(user) {
            Some(ConversationState::Confirming { quote }) => quote,
            // A repeated confirm after the invoice exists re-serves it
            // instead of creating a duplicate.
            Some(ConversationState::AwaitingPayment { exchange_id, .. }) => {
                let record = self
                    .store
                    .get_request(exchange_id)
                    .await
                    .map_err(|e| ExchangeError::LedgerError(e.to_string()))?
                    .ok_or(ExchangeError::StaleConversation)?;
                return Ok(self.invoice_reply(&record));
            }
            _ => return Ok(self.wrong_state_reply()),
        };

        let spec = self
            .config
            .spec_for(quote.asset)
            .ok_or(ExchangeError::StaleConversation)?;

        let request = ExchangeRequest::new(
            user,
            quote.asset,
            quote.gross,
            quote.rate.rate,
            quote.gross_usdt,
            quote.commission_usdt,
            quote.net_usdt,
        );

        self.store
            .create_request(&request)
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?;

        let invoice_spec = InvoiceSpec {
            asset: quote.asset,
            amount: quote.gross,
            description: format!("Exchange {} to USDT", quote.asset),
            payload: Some(format!("user {} | exchange {}", user, request.id.short())),
            expires_in_secs: self.config.invoice_expiry_secs,
        };

        let invoice = match self.gateway.create_invoice(invoice_spec).await {
            Ok(invoice) => invoice,
            Err(e) => {
                // The transition aborts; the conversation stays in
                // Confirming so the user can retry.
                warn!(error = %e, "Invoice creation failed");
                return Ok(Reply::text(
                    "Could not create the invoice right now. Please try again later.",
                )
                .with_choice("Try again", ChoiceAction::Confirm)
                .with_choice("Cancel", ChoiceAction::Cancel));
            }
        };

        self.store
            .attach_invoice(request.id, invoice.id, &invoice.pay_url)
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?;

        info!(
            exchange_id = %request.id,
            invoice_id = %invoice.id,
            "Exchange confirmed, invoice issued"
        );

        self.sessions.insert(
            user,
            ConversationState::AwaitingPayment {
                exchange_id: request.id,
                invoice_id: invoice.id,
            },
        );

        let text = format!(
            "Invoice for exchange {}:\n\n\
             Pay: {} {}\n\
             You will receive: {} USDT\n\
             Commission: {} USDT\n\n\
             The invoice is valid for {} minutes.",
            request.id.short(),
            spec.format_amount(quote.gross),
            quote.asset,
            format_usdt(quote.net_usdt),
            format_usdt(quote.commission_usdt),
            self.config.invoice_expiry_secs / 60,
        );

        Ok(Reply::text(text)
            .with_choice("Pay invoice", ChoiceAction::OpenUrl(invoice.pay_url))
            .with_choice("I have paid", ChoiceAction::CheckPayment)
            .with_choice("Cancel", ChoiceAction::Cancel))
    }

    async fn check_payment(&self, user: UserId) -> Result<Reply> {
        let Some(ConversationState::AwaitingPayment {
            exchange_id,
            invoice_id,
        }) = self.session(user)
        else {
            return Ok(self.wrong_state_reply());
        };

        let record = self
            .store
            .get_request(exchange_id)
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?
            .ok_or(ExchangeError::StaleConversation)?;

        if record.user != user {
            return Err(ExchangeError::NotRequestOwner(exchange_id));
        }

        // Persisted status is checked before any side-effecting gateway
        // call: a repeated tap after settlement must not issue a second
        // payout.
        if record.is_settled() {
            self.sessions.remove(&user);
            let mut reply = Reply::text(format!(
                "Exchange {} is already settled.",
                record.id.short()
            ));
            if let Some(url) = record.check_url {
                reply = reply.with_choice("Redeem check", ChoiceAction::OpenUrl(url));
            }
            return Ok(reply.with_choice("New exchange", ChoiceAction::NewExchange));
        }

        let status = self
            .gateway
            .invoice_status(invoice_id)
            .await
            .map_err(|e| ExchangeError::GatewayUnavailable(e.to_string()))?;

        if status != InvoiceStatus::Paid {
            let mut reply = Reply::text(
                "The invoice is not paid yet, or the payment is still processing. \
                 Try again in a moment.",
            );
            if let Some(url) = record.invoice_url {
                reply = reply.with_choice("Pay invoice", ChoiceAction::OpenUrl(url));
            }
            return Ok(reply.with_choice("I have paid", ChoiceAction::CheckPayment));
        }

        let check = self
            .gateway
            .create_check(Asset::Usdt, record.net_usdt, user)
            .await
            .map_err(|e| ExchangeError::GatewayUnavailable(e.to_string()))?;

        self.store
            .complete_request(
                record.id,
                check.id,
                &check.redeem_url,
                flipex_common::time::now(),
            )
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?;

        info!(
            exchange_id = %record.id,
            check_id = %check.id,
            net_usdt = %record.net_usdt,
            "Exchange settled"
        );

        self.sessions.remove(&user);

        let spec = self.config.spec_for(record.asset);
        let gross_display = spec
            .map(|s| s.format_amount(record.gross))
            .unwrap_or_else(|| record.gross.to_string());

        let text = format!(
            "Exchange {} completed.\n\n\
             You sent: {} {}\n\
             You received: {} USDT\n\
             Commission: {} USDT",
            record.id.short(),
            gross_display,
            record.asset,
            format_usdt(record.net_usdt),
            format_usdt(record.commission_usdt),
        );

        Ok(Reply::text(text)
            .with_choice("Redeem check", ChoiceAction::OpenUrl(check.redeem_url))
            .with_choice("New exchange", ChoiceAction::NewExchange))
    }

    fn invoice_reply(&self, record: &ExchangeRequest) -> Reply {
        let mut reply = Reply::text(format!(
            "An invoice for exchange {} is already issued.",
            record.id.short()
        ));
        if let Some(url) = &record.invoice_url {
            reply = reply.with_choice("Pay invoice", ChoiceAction::OpenUrl(url.clone()));
        }
        reply
            .with_choice("I have paid", ChoiceAction::CheckPayment)
            .with_choice("Cancel", ChoiceAction::Cancel)
    }

    fn cancel(&self, user: UserId) -> Reply {
        // Discards in-memory state only; durable rows are never touched.
        self.sessions.remove(&user);
        Reply::text("The operation was cancelled. Start a new exchange anytime.")
            .with_choice("New exchange", ChoiceAction::NewExchange)
    }

    async fn status(&self, user: UserId) -> Result<Reply> {
        let record = self
            .store
            .get_latest_request(user)
            .await
            .map_err(|e| ExchangeError::LedgerError(e.to_string()))?;

        let Some(record) = record else {
            return Ok(Reply::text("You have no exchanges yet.")
                .with_choice("New exchange", ChoiceAction::NewExchange));
        };

        let spec = self.config.spec_for(record.asset);
        let gross_display = spec
            .map(|s| s.format_amount(record.gross))
            .unwrap_or_else(|| record.gross.to_string());

        let mut text = format!(
            "Latest exchange {}:\n\
             Status: {}\n\
             You send: {} {}\n\
             You receive: {} USDT\n\
             Commission: {} USDT",
            record.id.short(),
            record.status.as_str(),
            gross_display,
            record.asset,
            format_usdt(record.net_usdt),
            format_usdt(record.commission_usdt),
        );
        if let Some(url) = &record.check_url {
            text.push_str(&format!("\nCheck: {url}"));
        }

        let mut reply = Reply::text(text);

        if record.status == flipex_common::ExchangeStatus::Pending {
            if let Some(invoice_id) = record.invoice_id {
                // A pending invoiced exchange can resume after a restart:
                // rebuild the session from the durable row.
                self.sessions.insert(
                    user,
                    ConversationState::AwaitingPayment {
                        exchange_id: record.id,
                        invoice_id,
                    },
                );
                if let Some(url) = record.invoice_url {
                    reply = reply.with_choice("Pay invoice", ChoiceAction::OpenUrl(url));
                }
                reply = reply.with_choice("I have paid", ChoiceAction::CheckPayment);
            }
        }

        Ok(reply)
    }

    async fn rates_overview(&self) -> Reply {
        let table = match self.oracle.rate_table().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Rate overview unavailable");
                return Reply::text("Could not fetch exchange rates. Try again later.");
            }
        };

        let mut by_source: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for quote in table.quotes() {
            by_source
                .entry(quote.source.code())
                .or_default()
                .push(format!("  -> {}: {}", quote.target, quote.rate.normalize()));
        }

        let mut text = String::from("Current exchange rates:\n");
        for (source, mut lines) in by_source {
            lines.sort();
            text.push_str(&format!("\n{source}:\n{}\n", lines.join("\n")));
        }
        text.push_str(&format!(
            "\nMinimum per exchange: {} USDT equivalent",
            format_usdt(self.config.min_usdt)
        ));

        Reply::text(text)
    }

    fn session(&self, user: UserId) -> Option<ConversationState> {
        self.sessions.get(&user).map(|s| s.value().clone())
    }

    fn with_currency_choices(&self, mut reply: Reply) -> Reply {
        for spec in &self.config.assets {
            reply = reply.with_choice(
                format!("{} ({})", spec.display_name, spec.asset),
                ChoiceAction::SelectCurrency(spec.asset),
            );
        }
        reply
    }

    fn wrong_state_reply(&self) -> Reply {
        Reply::text("There is nothing to do here. Start a new exchange with the button below.")
            .with_choice("New exchange", ChoiceAction::NewExchange)
    }

    fn reply_for_error(&self, user: UserId, e: ExchangeError) -> Reply {
        if e.is_recoverable() {
            // Input and policy rejections are surfaced verbatim; the
            // conversation stays where it was.
            info!(user = %user, code = e.error_code(), "Rejected user input");
            return match &e {
                ExchangeError::GatewayUnavailable(_) => Reply::text(
                    "The payment service is temporarily unavailable. Please try again later.",
                ),
                ExchangeError::AmountNotNumeric => {
                    Reply::text("Please enter a valid number (for example: 0.2)")
                }
                _ => Reply::text(e.to_string()),
            };
        }

        // State-consistency faults are fatal for this conversation only.
        error!(user = %user, code = e.error_code(), error = %e, "Conversation fault");
        self.sessions.remove(&user);
        Reply::text("Something went wrong. Please start over.")
            .with_choice("New exchange", ChoiceAction::NewExchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipex_common::{AssetSpec, InvoiceId, RateQuote};
    use flipex_gateway::MockGateway;
    use flipex_rates::{MockRateProvider, RateOracleConfig};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct Harness {
        engine: ExchangeEngine,
        provider: Arc<MockRateProvider>,
        gateway: Arc<MockGateway>,
    }

    const USER: UserId = UserId::new(42);

    fn test_config() -> EngineConfig {
        EngineConfig {
            assets: vec![
                AssetSpec::new(Asset::Btc, "Bitcoin", 6, dec!(0.00002)),
                AssetSpec::new(Asset::Ton, "Toncoin", 3, dec!(0.5)),
                AssetSpec::new(Asset::Not, "Notcoin", 0, dec!(100)),
                AssetSpec::new(Asset::Usdt, "Tether", 2, dec!(0.5)),
            ],
            commission_rate: dec!(0.05),
            min_usdt: dec!(0.01),
            fallback_rates: HashMap::new(),
            ..EngineConfig::default()
        }
    }

    async fn harness() -> Harness {
        let provider = Arc::new(MockRateProvider::new("test"));
        provider.set_quotes(vec![
            RateQuote::new(Asset::Ton, Asset::Usdt, dec!(2.0)),
            RateQuote::new(Asset::Not, Asset::Usdt, dec!(0.006)),
        ]);

        let config = test_config();
        let oracle = Arc::new(RateOracle::new(
            provider.clone(),
            RateOracleConfig {
                ttl: chrono::Duration::seconds(300),
                fallback: HashMap::new(),
            },
        ));
        let gateway = Arc::new(MockGateway::new());
        let store = ExchangeStore::in_memory().await.unwrap();

        Harness {
            engine: ExchangeEngine::new(config, oracle, gateway.clone(), store),
            provider,
            gateway,
        }
    }

    async fn drive_to_awaiting_payment(h: &Harness) -> Reply {
        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "0.5".to_string(),
                },
            )
            .await;
        h.engine.handle(USER, Event::Confirm).await
    }

    fn invoice_id_from(h: &Harness) -> InvoiceId {
        match h.engine.session(USER) {
            Some(ConversationState::AwaitingPayment { invoice_id, .. }) => invoice_id,
            other => panic!("expected AwaitingPayment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_exchange_flow() {
        let h = harness().await;

        // 0.5 TON at rate 2.0: gross 1.0 USDT, commission 0.05, net 0.95.
        let invoice_reply = drive_to_awaiting_payment(&h).await;
        assert!(invoice_reply.text.contains("0.500 TON"));
        assert!(invoice_reply.text.contains("0.95 USDT"));

        h.gateway.mark_paid(invoice_id_from(&h));
        let receipt = h.engine.handle(USER, Event::CheckPayment).await;

        assert!(receipt.text.contains("completed"));
        let checks = h.gateway.recorded_checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].asset, Asset::Usdt);
        assert_eq!(checks[0].amount, dec!(0.95));
        assert_eq!(checks[0].pin_to_user, USER);

        // Terminal: the session is gone and the durable row is completed.
        assert!(h.engine.session(USER).is_none());
        let stats = h.engine.stats().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_quote_values_in_confirmation() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "0.5".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("~1 USDT"));
        assert!(reply.text.contains("You receive: 0.95 USDT"));
        assert!(reply.text.contains("Commission: 0.05 USDT"));

        match h.engine.session(USER) {
            Some(ConversationState::Confirming { quote }) => {
                assert_eq!(quote.gross_usdt, dec!(1.0));
                assert_eq!(quote.commission_usdt + quote.net_usdt, quote.gross_usdt);
            }
            other => panic!("expected Confirming, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_unavailable_keeps_entering_amount() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "BTC".to_string(),
                },
            )
            .await;

        // No BTC quote and no fallback configured.
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "0.00001".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("Rate unavailable"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::EnteringAmount { asset: Asset::Btc })
        ));
    }

    #[tokio::test]
    async fn test_zero_decimal_asset_display_truncates() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "NOT".to_string(),
                },
            )
            .await;
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "83.7".to_string(),
                },
            )
            .await;

        // Displayed truncated to the integer, stored exact.
        assert!(reply.text.contains("You send: 83 NOT"));
        match h.engine.session(USER) {
            Some(ConversationState::Confirming { quote }) => {
                assert_eq!(quote.gross, dec!(83.7));
                assert_eq!(quote.gross_usdt, dec!(0.5022));
            }
            other => panic!("expected Confirming, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_below_minimum_reports_source_boundary() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;

        // 0.004 TON at rate 2.0 is 0.008 USDT, below the 0.01 minimum.
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "0.004".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("Minimum amount is 0.005 TON"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::EnteringAmount { asset: Asset::Ton })
        ));
    }

    #[tokio::test]
    async fn test_double_confirm_creates_single_invoice() {
        let h = harness().await;

        drive_to_awaiting_payment(&h).await;
        let second = h.engine.handle(USER, Event::Confirm).await;

        assert_eq!(h.gateway.invoice_calls(), 1);
        assert!(second
            .choices
            .iter()
            .any(|c| matches!(c.action, ChoiceAction::OpenUrl(_))));
    }

    #[tokio::test]
    async fn test_check_payment_before_paid() {
        let h = harness().await;

        drive_to_awaiting_payment(&h).await;
        let reply = h.engine.handle(USER, Event::CheckPayment).await;

        assert!(reply.text.contains("not paid yet"));
        assert_eq!(h.gateway.check_calls(), 0);
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::AwaitingPayment { .. })
        ));
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let h = harness().await;

        drive_to_awaiting_payment(&h).await;
        let invoice_id = invoice_id_from(&h);
        let exchange_id = match h.engine.session(USER) {
            Some(ConversationState::AwaitingPayment { exchange_id, .. }) => exchange_id,
            other => panic!("expected AwaitingPayment, got {other:?}"),
        };

        h.gateway.mark_paid(invoice_id);
        h.engine.handle(USER, Event::CheckPayment).await;
        assert_eq!(h.gateway.check_calls(), 1);

        // A duplicated "I have paid" delivery arrives after settlement:
        // the persisted status is checked before any payout call, so no
        // second check is issued.
        h.engine.sessions.insert(
            USER,
            ConversationState::AwaitingPayment {
                exchange_id,
                invoice_id,
            },
        );
        let again = h.engine.handle(USER, Event::CheckPayment).await;

        assert!(again.text.contains("already settled"));
        assert_eq!(h.gateway.check_calls(), 1);
        assert!(h.engine.session(USER).is_none());
    }

    #[tokio::test]
    async fn test_status_resumes_pending_exchange() {
        let h = harness().await;

        drive_to_awaiting_payment(&h).await;
        let invoice_id = invoice_id_from(&h);

        // A restart loses the in-memory session; the durable row survives.
        h.engine.sessions.remove(&USER);

        let status = h.engine.handle(USER, Event::Status).await;
        assert!(status.text.contains("pending"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::AwaitingPayment { .. })
        ));

        h.gateway.mark_paid(invoice_id);
        let receipt = h.engine.handle(USER, Event::CheckPayment).await;
        assert!(receipt.text.contains("completed"));
    }

    #[tokio::test]
    async fn test_cannot_reach_payment_without_validated_amount() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;

        // Confirm without ever submitting an amount.
        let reply = h.engine.handle(USER, Event::Confirm).await;

        assert!(reply.text.contains("nothing to do"));
        assert_eq!(h.gateway.invoice_calls(), 0);
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::EnteringAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_invoice_failure_keeps_confirming() {
        let h = harness().await;
        h.gateway.fail_invoices(true);

        let reply = drive_to_awaiting_payment(&h).await;

        assert!(reply.text.contains("try again later"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::Confirming { .. })
        ));

        // Retry succeeds once the gateway recovers.
        h.gateway.fail_invoices(false);
        h.engine.handle(USER, Event::Confirm).await;
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::AwaitingPayment { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_discards_session_not_rows() {
        let h = harness().await;

        drive_to_awaiting_payment(&h).await;
        let reply = h.engine.handle(USER, Event::Cancel).await;

        assert!(reply.text.contains("cancelled"));
        assert!(h.engine.session(USER).is_none());

        // The durable pending row is untouched by cancellation.
        let stats = h.engine.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn test_invalid_amount_text() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "lots of it".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("valid number"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::EnteringAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_above_maximum_rejected() {
        let h = harness().await;

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        h.engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "TON".to_string(),
                },
            )
            .await;
        let reply = h
            .engine
            .handle(
                USER,
                Event::SubmitAmount {
                    text: "0.6".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("Maximum amount is 0.5 TON"));
    }

    #[tokio::test]
    async fn test_selection_survives_missing_rate() {
        let h = harness().await;
        h.provider.set_failing(true);

        h.engine
            .handle(
                USER,
                Event::Start {
                    profile: UserProfile::default(),
                },
            )
            .await;
        // The transition must still succeed without a rate for the cap
        // annotation.
        let reply = h
            .engine
            .handle(
                USER,
                Event::SelectCurrency {
                    code: "BTC".to_string(),
                },
            )
            .await;

        assert!(reply.text.contains("Maximum per exchange"));
        assert!(matches!(
            h.engine.session(USER),
            Some(ConversationState::EnteringAmount { asset: Asset::Btc })
        ));
    }

    #[tokio::test]
    async fn test_rates_overview() {
        let h = harness().await;

        let reply = h.engine.handle(USER, Event::Rates).await;

        assert!(reply.text.contains("TON"));
        assert!(reply.text.contains("2"));
        assert!(reply.text.contains("Minimum per exchange"));
    }

    #[tokio::test]
    async fn test_status_without_history() {
        let h = harness().await;

        let reply = h.engine.handle(USER, Event::Status).await;

        assert!(reply.text.contains("no exchanges"));
    }
}
