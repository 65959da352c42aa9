//! Wallet HTTP handlers.
//!
//! This module implements the balance-facing API endpoints:
//! - POST /api/v1/wallets - Provision a wallet (called by the app on signup)
//! - GET /api/v1/wallet/balance - Current balance
//! - GET /api/v1/wallet/balance/check - Sufficiency check
//! - POST /api/v1/wallet/topup/confirm - Credit a wallet after payment
//! - POST /api/v1/wallet/deduct - Deduct from the caller's wallet
//! - POST /api/v1/wallet/transfer - Move money to another wallet

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    gateway::stripe::{INTENT_STATUS_SUCCEEDED, TOP_UP_PURPOSE},
    middleware::identity::CallerIdentity,
    models::{
        transaction::{ConfirmTopUpRequest, DeductRequest, Transaction, TransferRequest},
        wallet::{BalanceResponse, CreateWalletRequest},
    },
    money,
    services::wallet_service::{self, TransferOutcome, WalletMutation},
    state::AppState,
};

/// Response for balance-mutating operations: the post-mutation balance and
/// the ledger entry appended with it.
#[derive(Debug, Serialize)]
pub struct WalletMutationResponse {
    pub balance: Decimal,
    pub transaction: Transaction,
}

impl From<WalletMutation> for WalletMutationResponse {
    fn from(outcome: WalletMutation) -> Self {
        Self {
            balance: outcome.balance,
            transaction: outcome.transaction,
        }
    }
}

/// Response for transfers: both post-transfer balances and both ledger
/// entries.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub from_balance: Decimal,
    pub to_balance: Decimal,
    pub debit: Transaction,
    pub credit: Transaction,
}

impl From<TransferOutcome> for TransferResponse {
    fn from(outcome: TransferOutcome) -> Self {
        Self {
            from_balance: outcome.from_balance,
            to_balance: outcome.to_balance,
            debit: outcome.debit,
            credit: outcome.credit,
        }
    }
}

/// Provision a wallet for the calling user.
///
/// Idempotent: repeated calls return the existing wallet.
pub async fn create_wallet(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let wallet =
        wallet_service::create_wallet(&state.pool, caller.user_id, &request.email, &request.name)
            .await?;

    Ok(Json(wallet.into()))
}

/// Get the caller's current balance.
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<BalanceResponse>, AppError> {
    let wallet = wallet_service::get_balance(&state.pool, caller.user_id).await?;

    Ok(Json(wallet.into()))
}

/// Query parameters for the sufficiency check.
#[derive(Debug, Deserialize)]
pub struct SufficiencyQuery {
    pub amount: Decimal,
}

/// Response for the sufficiency check.
#[derive(Debug, Serialize)]
pub struct SufficiencyResponse {
    pub sufficient: bool,
    pub balance: Decimal,
}

/// Check whether the caller's balance covers an amount.
///
/// The application layer calls this before letting a user apply to a
/// listing whose fee they could not pay.
pub async fn check_balance(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<SufficiencyQuery>,
) -> Result<Json<SufficiencyResponse>, AppError> {
    let sufficient =
        wallet_service::has_sufficient_balance(&state.pool, caller.user_id, query.amount).await?;
    let wallet = wallet_service::get_balance(&state.pool, caller.user_id).await?;

    Ok(Json(SufficiencyResponse {
        sufficient,
        balance: wallet.balance,
    }))
}

/// Credit the caller's wallet after their payment succeeded.
///
/// # Flow
///
/// 1. Retrieve the intent from the gateway
/// 2. Require status `succeeded`, our purpose marker, and the caller as
///    the metadata owner
/// 3. Credit the captured amount; repeat confirmations of the same intent
///    return the original ledger entry
pub async fn confirm_top_up(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<ConfirmTopUpRequest>,
) -> Result<Json<WalletMutationResponse>, AppError> {
    let intent = state
        .gateway
        .retrieve_payment_intent(&request.payment_intent_id)
        .await?;

    if intent.status != INTENT_STATUS_SUCCEEDED {
        return Err(AppError::InvalidState(format!(
            "Payment has not succeeded (status: {})",
            intent.status
        )));
    }

    let metadata = intent.metadata.as_ref();
    if metadata.and_then(|m| m.purpose.as_deref()) != Some(TOP_UP_PURPOSE) {
        return Err(AppError::Validation(
            "Payment intent was not created for a wallet top-up".to_string(),
        ));
    }
    if metadata.and_then(|m| m.user_id) != Some(caller.user_id) {
        return Err(AppError::Forbidden);
    }

    // Credit what the processor actually captured, not what was requested
    let amount = money::from_minor_units(intent.amount_received);
    let outcome =
        wallet_service::process_top_up(&state.pool, caller.user_id, amount, &intent.id).await?;

    Ok(Json(outcome.into()))
}

/// Deduct from the caller's wallet.
///
/// # Validation
///
/// - Amount must be positive
/// - Balance must cover the amount; otherwise 422 with the current and
///   required amounts in the message
pub async fn deduct(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<DeductRequest>,
) -> Result<Json<WalletMutationResponse>, AppError> {
    let outcome = wallet_service::deduct_from_wallet(
        &state.pool,
        caller.user_id,
        request.amount,
        &request.reason,
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// Transfer money from the caller's wallet to another user's.
///
/// # Atomicity
///
/// Both wallets are updated in a single database transaction.
/// Either both succeed or both fail.
pub async fn transfer(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let outcome = wallet_service::transfer_between_wallets(
        &state.pool,
        caller.user_id,
        request.to_user_id,
        request.amount,
        &request.reason,
    )
    .await?;

    Ok(Json(outcome.into()))
}
