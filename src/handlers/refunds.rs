//! Refund workflow HTTP handlers.
//!
//! User-facing:
//! - POST /api/v1/refunds - Open a refund request
//! - GET /api/v1/refunds - Caller's requests
//! - POST /api/v1/refunds/{id}/cancel - Cancel a pending request
//!
//! Admin-facing (role-guarded by route middleware):
//! - GET /api/v1/admin/refunds/pending - Oldest-first pending queue
//! - POST /api/v1/admin/refunds/{id}/approve - Approve and settle
//! - POST /api/v1/admin/refunds/{id}/reject - Reject with a reason
//! - GET /api/v1/admin/refunds/stats - Aggregate statistics

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::identity::CallerIdentity,
    models::refund::{
        ApproveRefundRequest, CreateRefundRequest, PageParams, PendingRefundRow, RefundListFilter,
        RefundRequest, RefundStats, RejectRefundRequest, StatsWindow,
    },
    services::refund_service,
    state::AppState,
};

/// Open a refund request against one of the caller's completed
/// transactions.
///
/// # Request Body
///
/// ```json
/// {
///   "transaction_id": "770e8400-e29b-41d4-a716-446655440002",
///   "reason": "Room was not as described in the listing"
/// }
/// ```
///
/// # Errors
///
/// - 400 if the reason is too short
/// - 404 if the transaction does not exist
/// - 403 if it belongs to someone else
/// - 422 if it is not completed
/// - 409 if an active request already exists for it
pub async fn request_refund(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<CreateRefundRequest>,
) -> Result<Json<RefundRequest>, AppError> {
    let refund = refund_service::request_refund(
        &state.pool,
        caller.user_id,
        request.transaction_id,
        &request.reason,
    )
    .await?;

    Ok(Json(refund))
}

/// Caller's refund requests, newest first, optionally filtered by status
/// (`?status=PENDING`).
pub async fn list_my_refunds(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(filter): Query<RefundListFilter>,
) -> Result<Json<Vec<RefundRequest>>, AppError> {
    let refunds =
        refund_service::list_user_refunds(&state.pool, caller.user_id, filter.status).await?;

    Ok(Json(refunds))
}

/// Cancel the caller's own pending refund request.
pub async fn cancel_refund(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(refund_id): Path<Uuid>,
) -> Result<Json<RefundRequest>, AppError> {
    let refund =
        refund_service::cancel_refund_request(&state.pool, refund_id, caller.user_id).await?;

    Ok(Json(refund))
}

/// Approve a pending refund request and settle it: reverse the charge with
/// the gateway when one exists, credit the wallet, mark completed.
///
/// The body is optional; when present it may carry an admin note.
pub async fn approve_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<Uuid>,
    body: Option<Json<ApproveRefundRequest>>,
) -> Result<Json<RefundRequest>, AppError> {
    let admin_note = body.and_then(|Json(request)| request.admin_note);

    let refund =
        refund_service::approve_refund(&state.pool, &state.gateway, refund_id, admin_note).await?;

    Ok(Json(refund))
}

/// Reject a pending refund request. The note is mandatory; it is the
/// rejection reason shown to the user.
pub async fn reject_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<Uuid>,
    Json(request): Json<RejectRefundRequest>,
) -> Result<Json<RefundRequest>, AppError> {
    let refund = refund_service::reject_refund(&state.pool, refund_id, &request.admin_note).await?;

    Ok(Json(refund))
}

/// Pending refund queue for admins, oldest first, joined with the original
/// transaction and the requesting user's identity.
pub async fn list_pending_refunds(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<PendingRefundRow>>, AppError> {
    let rows =
        refund_service::list_pending_refunds(&state.pool, page.limit(), page.offset()).await?;

    Ok(Json(rows))
}

/// Aggregate refund statistics, optionally bounded by `?from=`/`?to=`.
pub async fn refund_stats(
    State(state): State<AppState>,
    Query(window): Query<StatsWindow>,
) -> Result<Json<RefundStats>, AppError> {
    let stats = refund_service::refund_stats(&state.pool, &window).await?;

    Ok(Json(stats))
}
