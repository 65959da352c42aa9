//! Inbound payment gateway webhook handler.
//!
//! The processor notifies this service of payment settlements at
//! POST /api/v1/webhooks/stripe. Every delivery is signature-verified
//! against the shared secret before any of it is parsed; a missing or
//! invalid signature is a hard 400 and the payload is never processed.
//!
//! Deliveries are at-least-once. The top-up path is idempotent by payment
//! reference, so retries and duplicates are acknowledged without crediting
//! twice.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::json;

use crate::{
    error::AppError,
    gateway::stripe::{PaymentIntent, TOP_UP_PURPOSE},
    money,
    services::wallet_service,
    state::AppState,
};

/// Handle a gateway webhook delivery.
///
/// # Flow
///
/// 1. Verify the `Stripe-Signature` header over the raw body (fail closed)
/// 2. On `payment_intent.succeeded` with our purpose marker, credit the
///    wallet named in the intent metadata
/// 3. Acknowledge everything else so the gateway stops retrying events we
///    do not consume
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    let event = state.gateway.verify_webhook_signature(&body, signature)?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let intent: PaymentIntent = serde_json::from_value(event.data.object)
                .map_err(|e| AppError::Validation(format!("Malformed intent payload: {e}")))?;

            handle_intent_succeeded(&state, intent).await?;
        }
        other => {
            tracing::debug!(event_type = other, event_id = %event.id, "ignoring webhook event");
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// Credit the wallet a succeeded intent was created for.
///
/// Intents without our purpose marker (created by some other part of the
/// platform, or directly in the gateway dashboard) are acknowledged and
/// skipped: there is no wallet to credit for them.
async fn handle_intent_succeeded(state: &AppState, intent: PaymentIntent) -> Result<(), AppError> {
    let metadata = intent.metadata.as_ref();

    if metadata.and_then(|m| m.purpose.as_deref()) != Some(TOP_UP_PURPOSE) {
        tracing::debug!(intent_id = %intent.id, "intent is not a wallet top-up, skipping");
        return Ok(());
    }

    let Some(user_id) = metadata.and_then(|m| m.user_id) else {
        tracing::warn!(intent_id = %intent.id, "top-up intent without a user id, skipping");
        return Ok(());
    };

    let amount = money::from_minor_units(intent.amount_received);
    let outcome = wallet_service::process_top_up(&state.pool, user_id, amount, &intent.id).await?;

    tracing::info!(
        intent_id = %intent.id,
        user_id = %user_id,
        transaction_id = %outcome.transaction.id,
        "webhook settled top-up"
    );

    Ok(())
}
