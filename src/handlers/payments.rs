//! Payment gateway HTTP handlers.
//!
//! This module implements the endpoints that face the processor:
//! - POST /api/v1/wallet/topup/intent - Create a payment intent for a top-up
//! - GET /api/v1/payments/methods - Caller's stored card payment methods

use axum::{Extension, Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    gateway::stripe::CardSummary,
    middleware::identity::CallerIdentity,
    models::user::User,
    money,
    services::wallet_service,
    state::AppState,
};

/// Request body for creating a top-up intent.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount": "50.00"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct TopUpIntentRequest {
    /// Amount in major currency units, at least the processor minimum
    pub amount: Decimal,
}

/// Response for a created top-up intent.
#[derive(Debug, Serialize)]
pub struct TopUpIntentResponse {
    /// Intent id; the confirm endpoint and the webhook both key on this
    pub payment_intent_id: String,

    /// Secret the browser needs to complete payment
    pub client_secret: Option<String>,

    pub amount: Decimal,
    pub currency: String,
}

/// Create a payment intent so the caller can top up their wallet.
///
/// The wallet must already exist; the intent carries the caller's user id
/// in its metadata so the webhook can route the settlement back here.
pub async fn create_top_up_intent(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<TopUpIntentRequest>,
) -> Result<Json<TopUpIntentResponse>, AppError> {
    // Fail before the gateway call if the caller has no wallet to credit
    wallet_service::get_balance(&state.pool, caller.user_id).await?;

    let intent = state
        .gateway
        .create_payment_intent(request.amount, caller.user_id)
        .await?;

    Ok(Json(TopUpIntentResponse {
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: money::from_minor_units(intent.amount),
        currency: intent.currency,
    }))
}

/// One stored card, flattened for the client.
#[derive(Debug, Serialize)]
pub struct PaymentMethodResponse {
    pub id: String,
    pub card: Option<CardSummary>,
}

/// List the caller's stored card payment methods.
///
/// Looks the caller up in the user table for their email, finds or creates
/// the matching gateway customer, and proxies the card list. Card numbers
/// never pass through this service.
pub async fn list_payment_methods(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<Vec<PaymentMethodResponse>>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, created_at FROM users WHERE id = $1",
    )
    .bind(caller.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::WalletNotFound)?;

    let customer = state
        .gateway
        .find_or_create_customer(&user.email, Some(&user.name))
        .await?;

    let methods = state.gateway.list_payment_methods(&customer.id).await?;

    Ok(Json(
        methods
            .into_iter()
            .map(|method| PaymentMethodResponse {
                id: method.id,
                card: method.card,
            })
            .collect(),
    ))
}
