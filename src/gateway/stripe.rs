//! Stripe REST adapter.
//!
//! Thin wrapper over the processor's form-encoded HTTP API. The adapter owns
//! the only conversion from decimal major units to integer cents, carries a
//! closed metadata record on every intent it creates, and maps every
//! upstream failure to [`AppError::ExternalService`].

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    gateway::webhook::{self, WebhookEvent},
    money,
};

/// Smallest accepted top-up, the processor's minimum charge for USD.
pub const MIN_TOP_UP_USD: Decimal = dec!(0.50);

/// Metadata attached to every payment intent this service creates.
///
/// A closed record, not an open key-value bag: these two fields are the
/// entire contract between intent creation and webhook processing.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentMetadata {
    /// Wallet owner the intent tops up
    #[serde(default)]
    pub user_id: Option<Uuid>,

    /// Always [`TOP_UP_PURPOSE`] for intents created here; foreign intents
    /// carry something else (or nothing) and are ignored by the webhook
    /// handler
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Purpose marker written into intent metadata.
pub const TOP_UP_PURPOSE: &str = "wallet_top_up";

/// Intent status value the confirm/webhook paths require.
pub const INTENT_STATUS_SUCCEEDED: &str = "succeeded";

/// Reason code sent with a charge refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    RequestedByCustomer,
    Duplicate,
    Fraudulent,
}

impl RefundReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundReason::RequestedByCustomer => "requested_by_customer",
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
        }
    }
}

/// A payment intent as returned by the processor.
///
/// `amount` fields are integer cents; use [`money::from_minor_units`] at
/// the boundary back into the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,

    /// Secret the browser needs to complete payment; present on create,
    /// never stored server-side
    pub client_secret: Option<String>,

    /// Requested amount in cents
    pub amount: i64,

    /// Captured amount in cents, zero until the intent succeeds
    #[serde(default)]
    pub amount_received: i64,

    pub currency: String,

    /// Processor lifecycle status, e.g. "succeeded"
    pub status: String,

    #[serde(default)]
    pub metadata: Option<IntentMetadata>,
}

/// A charge refund as returned by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,

    /// Refunded amount in cents
    pub amount: i64,

    pub status: String,
}

/// A customer as returned by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

/// A stored payment method (card) as returned by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub method_type: String,

    pub card: Option<CardSummary>,
}

/// Card display details. Never the full number; the processor only exposes
/// brand and last four.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CardSummary {
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

/// List envelope the processor wraps collection responses in.
#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

/// Error envelope the processor returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The payment gateway adapter.
///
/// Constructed once at startup from [`Config`] and shared behind an `Arc`.
/// Holds the API credentials and a pooled HTTP client; no global state.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeGateway {
    /// Build the adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the base URL does not parse or the secret
    /// key is empty, `ExternalService` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let api_base = Url::parse(&config.stripe_api_base)
            .map_err(|e| AppError::Validation(format!("Invalid gateway base URL: {e}")))?;

        if config.stripe_secret_key.is_empty() {
            return Err(AppError::Validation(
                "Gateway secret key must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ExternalService(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_base)
    }

    /// Create a payment intent for a wallet top-up.
    ///
    /// Validates the minimum charge, converts the amount to cents, and tags
    /// the intent with the closed metadata record so the webhook handler can
    /// route the settlement back to the right wallet.
    pub async fn create_payment_intent(
        &self,
        amount: Decimal,
        user_id: Uuid,
    ) -> Result<PaymentIntent, AppError> {
        if amount < MIN_TOP_UP_USD {
            return Err(AppError::Validation(format!(
                "Minimum top-up is {}",
                money::format_usd(MIN_TOP_UP_USD)
            )));
        }

        let cents = money::to_minor_units(amount)?;
        let params = [
            ("amount", cents.to_string()),
            ("currency", money::CURRENCY.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[purpose]", TOP_UP_PURPOSE.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(self.url("payment_intents"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(gateway_unreachable)?;

        parse_response(response).await
    }

    /// Retrieve a payment intent by id.
    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, AppError> {
        if intent_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Payment intent id must not be empty".to_string(),
            ));
        }

        let response = self
            .client
            .get(self.url(&format!("payment_intents/{intent_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(gateway_unreachable)?;

        parse_response(response).await
    }

    /// Reverse a charge, fully or partially.
    ///
    /// `amount` of `None` refunds the full captured amount; `Some` refunds
    /// that many major units (converted to cents here).
    pub async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: Option<Decimal>,
        reason: RefundReason,
    ) -> Result<GatewayRefund, AppError> {
        if payment_intent_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Payment intent id must not be empty".to_string(),
            ));
        }

        let mut params = vec![
            ("payment_intent", payment_intent_id.to_string()),
            ("reason", reason.as_str().to_string()),
        ];
        if let Some(amount) = amount {
            params.push(("amount", money::to_minor_units(amount)?.to_string()));
        }

        let response = self
            .client
            .post(self.url("refunds"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(gateway_unreachable)?;

        parse_response(response).await
    }

    /// Find a customer by email, creating one if none exists.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Customer, AppError> {
        let response = self
            .client
            .get(self.url("customers"))
            .bearer_auth(&self.secret_key)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(gateway_unreachable)?;

        let existing: List<Customer> = parse_response(response).await?;
        if let Some(customer) = existing.data.into_iter().next() {
            return Ok(customer);
        }

        let mut params = vec![("email", email.to_string())];
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(self.url("customers"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(gateway_unreachable)?;

        parse_response(response).await
    }

    /// List a customer's stored card payment methods.
    pub async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, AppError> {
        let response = self
            .client
            .get(self.url(&format!("customers/{customer_id}/payment_methods")))
            .bearer_auth(&self.secret_key)
            .query(&[("type", "card")])
            .send()
            .await
            .map_err(gateway_unreachable)?;

        let list: List<PaymentMethod> = parse_response(response).await?;
        Ok(list.data)
    }

    /// Verify an inbound webhook delivery against the configured secret.
    ///
    /// Fail-closed; see [`webhook::verify_signature`].
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, AppError> {
        webhook::verify_signature(
            &self.webhook_secret,
            payload,
            signature_header,
            Utc::now().timestamp(),
            webhook::DEFAULT_TOLERANCE_SECS,
        )
    }
}

fn gateway_unreachable(err: reqwest::Error) -> AppError {
    AppError::ExternalService(format!("Gateway unreachable: {err}"))
}

/// Decode a gateway response, turning non-2xx statuses into
/// `ExternalService` with the upstream message when one is present.
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Malformed gateway response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| format!("Gateway returned HTTP {status}"));

    Err(AppError::ExternalService(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/unused".to_string(),
            server_port: 3000,
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            // Unroutable on purpose; tests below never get past validation
            stripe_api_base: "http://127.0.0.1:1".to_string(),
        }
    }

    #[test]
    fn constructor_rejects_bad_base_url() {
        let mut config = test_config();
        config.stripe_api_base = "not a url".to_string();
        assert!(StripeGateway::new(&config).is_err());
    }

    #[test]
    fn constructor_rejects_empty_secret_key() {
        let mut config = test_config();
        config.stripe_secret_key = String::new();
        assert!(StripeGateway::new(&config).is_err());
    }

    #[tokio::test]
    async fn intent_below_minimum_fails_before_any_network_io() {
        let gateway = StripeGateway::new(&test_config()).unwrap();
        let err = gateway
            .create_payment_intent(dec!(0.49), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Minimum top-up is $0.50"));
    }

    #[tokio::test]
    async fn empty_intent_id_fails_before_any_network_io() {
        let gateway = StripeGateway::new(&test_config()).unwrap();
        assert!(gateway.retrieve_payment_intent("  ").await.is_err());
        assert!(
            gateway
                .create_refund("", None, RefundReason::Duplicate)
                .await
                .is_err()
        );
    }

    #[test]
    fn refund_reasons_use_processor_codes() {
        assert_eq!(
            RefundReason::RequestedByCustomer.as_str(),
            "requested_by_customer"
        );
        assert_eq!(RefundReason::Duplicate.as_str(), "duplicate");
        assert_eq!(RefundReason::Fraudulent.as_str(), "fraudulent");
    }

    #[test]
    fn intent_metadata_tolerates_foreign_intents() {
        let intent: PaymentIntent = serde_json::from_str(
            r#"{"id":"pi_1","amount":500,"currency":"usd","status":"succeeded","metadata":{}}"#,
        )
        .unwrap();

        let metadata = intent.metadata.unwrap();
        assert!(metadata.user_id.is_none());
        assert!(metadata.purpose.is_none());
    }
}
