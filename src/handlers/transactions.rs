//! Transaction HTTP handlers.
//!
//! This module implements the ledger read endpoints:
//! - GET /api/v1/wallet/transactions - Caller's history with filters
//! - GET /api/v1/transactions/{id} - Single entry, owner or admin only
//! - GET /api/v1/admin/transactions/recent - Recent entries across all wallets
//! - GET /api/v1/admin/transactions/stats - Amount sums by type and status

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::identity::CallerIdentity,
    models::{
        refund::PageParams,
        transaction::{
            AdminTransactionRow, Transaction, TransactionHistoryFilter, TransactionHistoryResponse,
            TransactionStatus, TransactionType,
        },
    },
    services::transaction_query,
    state::AppState,
};

/// Caller's transaction history, newest first.
///
/// # Query Parameters
///
/// - `type`: TOP_UP | DEDUCTION | REFUND
/// - `status`: PENDING | COMPLETED | FAILED | REFUNDED
/// - `from` / `to`: RFC 3339 bounds on creation time
/// - `limit` / `offset`: pagination, limit defaults to 20 and caps at 100
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(filter): Query<TransactionHistoryFilter>,
) -> Result<Json<TransactionHistoryResponse>, AppError> {
    let history = transaction_query::history(&state.pool, caller.user_id, &filter).await?;

    Ok(Json(history))
}

/// Get a transaction by ID.
///
/// # Security
///
/// Returns 404 unless the entry belongs to the caller or the caller is an
/// admin, so the existence of other users' transactions never leaks.
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = transaction_query::get_transaction(&state.pool, transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    if transaction.user_id != caller.user_id && !caller.is_admin() {
        return Err(AppError::TransactionNotFound);
    }

    Ok(Json(transaction))
}

/// Recent transactions across all wallets, joined with user identity.
/// Admin only (enforced by route middleware).
pub async fn recent_transactions(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<AdminTransactionRow>>, AppError> {
    let rows =
        transaction_query::recent_transactions(&state.pool, page.limit(), page.offset()).await?;

    Ok(Json(rows))
}

/// Query parameters for transaction statistics. Type and status are
/// required; wallet and date bounds are optional.
#[derive(Debug, Deserialize)]
pub struct TransactionStatsQuery {
    pub user_id: Option<Uuid>,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    pub status: TransactionStatus,

    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Response for transaction statistics.
#[derive(Debug, Serialize)]
pub struct TransactionStatsResponse {
    pub total_amount: Decimal,
}

/// Sum of amounts for a type/status pair, e.g. total completed top-ups in
/// a month. Admin only (enforced by route middleware).
pub async fn transaction_stats(
    State(state): State<AppState>,
    Query(query): Query<TransactionStatsQuery>,
) -> Result<Json<TransactionStatsResponse>, AppError> {
    let total_amount = transaction_query::sum_amounts(
        &state.pool,
        query.user_id,
        query.transaction_type,
        query.status,
        query.from,
        query.to,
    )
    .await?;

    Ok(Json(TransactionStatsResponse { total_amount }))
}
