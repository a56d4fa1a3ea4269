//! Crypto Pay API client.

use std::time::Duration;

use async_trait::async_trait;
use flipex_common::{Asset, CheckId, InvoiceId, RateQuote, UserId};
use flipex_rates::{RateProvider, RateResult};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::types::{Check, Invoice, InvoiceSpec, InvoiceStatus};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication header expected by the Crypto Pay API.
const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";

/// Mainnet API base URL.
pub const MAINNET_URL: &str = "https://pay.crypt.bot";
/// Testnet API base URL.
pub const TESTNET_URL: &str = "https://testnet-pay.crypt.bot";

/// Abstraction over the custodial payment API.
///
/// All calls are bounded by a timeout and return explicit failure values;
/// the state machine maps those into user-facing "try again later" replies.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payable invoice for the gross amount.
    async fn create_invoice(&self, spec: InvoiceSpec) -> GatewayResult<Invoice>;

    /// Query the current status of an invoice.
    async fn invoice_status(&self, id: InvoiceId) -> GatewayResult<InvoiceStatus>;

    /// Create a payout check pinned to the recipient.
    async fn create_check(
        &self,
        asset: Asset,
        amount: Decimal,
        pin_to_user: UserId,
    ) -> GatewayResult<Check>;
}

/// Crypto Pay API response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceRequest {
    asset: String,
    amount: Decimal,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct GetInvoicesRequest {
    invoice_ids: String,
}

#[derive(Debug, Serialize)]
struct CreateCheckRequest {
    asset: String,
    amount: Decimal,
    pin_to_user_id: i64,
}

#[derive(Debug, Deserialize)]
struct InvoiceDto {
    invoice_id: i64,
    status: String,
    bot_invoice_url: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceListDto {
    items: Vec<InvoiceDto>,
}

#[derive(Debug, Deserialize)]
struct CheckDto {
    check_id: i64,
    bot_check_url: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateDto {
    is_valid: bool,
    source: String,
    target: String,
    rate: Decimal,
}

/// HTTP client for the Crypto Pay API.
pub struct CryptoPayClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CryptoPayClient {
    /// Create a new client against the given API base URL.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Create a mainnet client.
    pub fn mainnet(token: impl Into<String>) -> GatewayResult<Self> {
        Self::new(MAINNET_URL, token)
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let url = format!("{}/api/{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http(format!("{method}: HTTP {status}: {body}")));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("{method}: {e}")))?;

        if !envelope.ok {
            let err = envelope.error.unwrap_or(ApiErrorBody {
                code: 0,
                name: "UNKNOWN".to_string(),
            });
            return Err(GatewayError::Api {
                code: err.code,
                name: err.name,
            });
        }

        envelope
            .result
            .ok_or(GatewayError::MissingResult(method.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for CryptoPayClient {
    #[instrument(skip(self, spec), fields(asset = %spec.asset, amount = %spec.amount))]
    async fn create_invoice(&self, spec: InvoiceSpec) -> GatewayResult<Invoice> {
        let request = CreateInvoiceRequest {
            asset: spec.asset.code().to_string(),
            amount: spec.amount,
            description: spec.description,
            payload: spec.payload,
            expires_in: spec.expires_in_secs,
        };

        let dto: InvoiceDto = self.call("createInvoice", &request).await?;

        info!(invoice_id = dto.invoice_id, "Invoice created");

        Ok(Invoice {
            id: InvoiceId::new(dto.invoice_id),
            pay_url: dto.bot_invoice_url,
        })
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn invoice_status(&self, id: InvoiceId) -> GatewayResult<InvoiceStatus> {
        let request = GetInvoicesRequest {
            invoice_ids: id.as_i64().to_string(),
        };

        let dto: InvoiceListDto = self.call("getInvoices", &request).await?;

        let item = dto
            .items
            .into_iter()
            .find(|i| i.invoice_id == id.as_i64())
            .ok_or_else(|| GatewayError::MissingResult(format!("invoice {id} not in response")))?;

        debug!(status = %item.status, "Invoice status fetched");

        InvoiceStatus::parse(&item.status)
            .ok_or(GatewayError::Parse(format!("unknown invoice status: {}", item.status)))
    }

    #[instrument(skip(self), fields(asset = %asset, amount = %amount, user = %pin_to_user))]
    async fn create_check(
        &self,
        asset: Asset,
        amount: Decimal,
        pin_to_user: UserId,
    ) -> GatewayResult<Check> {
        let request = CreateCheckRequest {
            asset: asset.code().to_string(),
            amount,
            pin_to_user_id: pin_to_user.as_i64(),
        };

        let dto: CheckDto = self.call("createCheck", &request).await?;

        info!(check_id = dto.check_id, "Payout check created");

        Ok(Check {
            id: CheckId::new(dto.check_id),
            redeem_url: dto.bot_check_url,
        })
    }
}

/// The payment processor also publishes the live conversion table, so the
/// client doubles as the oracle's rate provider.
#[async_trait]
impl RateProvider for CryptoPayClient {
    fn name(&self) -> &str {
        "crypto-pay"
    }

    async fn fetch_rates(&self) -> RateResult<Vec<RateQuote>> {
        let dtos: Vec<ExchangeRateDto> = self
            .call("getExchangeRates", &serde_json::json!({}))
            .await
            .map_err(|e| flipex_rates::RateError::Provider(e.to_string()))?;

        let mut quotes = Vec::new();
        for dto in dtos {
            if !dto.is_valid {
                continue;
            }
            // Pairs involving assets outside the supported set are dropped.
            let (Some(source), Some(target)) =
                (Asset::from_code(&dto.source), Asset::from_code(&dto.target))
            else {
                continue;
            };
            quotes.push(RateQuote::new(source, target, dto.rate));
        }

        if quotes.is_empty() {
            warn!("Exchange-rate table contained no usable pairs");
        }

        Ok(quotes)
    }
}
