//! Refund workflow - the state machine over refund requests.
//!
//! ```text
//! pending -> approved -> completed
//! pending -> rejected            (admin reject, or user cancel)
//! ```
//!
//! Every transition is a status-guarded UPDATE (`WHERE status = <from>`),
//! so two admins racing to approve the same request cannot both win: the
//! loser's guard matches zero rows and surfaces `InvalidState`.
//!
//! # Approval and the payment gateway
//!
//! When the refunded transaction carries a payment reference, approval
//! reverses the charge with the processor *before* crediting the wallet.
//! A gateway failure reverts the request to pending with a failure note so
//! an admin can retry. If the wallet credit fails after the charge was
//! already reversed, the gateway and the ledger have diverged; that is
//! surfaced as a fatal `Reconciliation` error, never swallowed.

use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    gateway::{StripeGateway, stripe::RefundReason},
    models::{
        refund::{
            CANCELLED_BY_USER_NOTE, MIN_REASON_LEN, PendingRefundRow, RefundRequest, RefundStats,
            RefundStatus, StatsWindow,
        },
        transaction::TransactionStatus,
    },
    services::{transaction_query, wallet_service},
};

/// Open a refund request against a completed transaction.
///
/// The amount is copied from the transaction; the requester cannot choose
/// it. At most one active (pending or approved) request may exist per
/// transaction.
///
/// # Errors
///
/// - `Validation`: Reason shorter than [`MIN_REASON_LEN`] characters
/// - `TransactionNotFound`: No such transaction
/// - `Forbidden`: Transaction belongs to another user
/// - `InvalidState`: Transaction is not completed
/// - `Conflict`: An active request already exists for this transaction
pub async fn request_refund(
    pool: &DbPool,
    user_id: Uuid,
    transaction_id: Uuid,
    reason: &str,
) -> Result<RefundRequest, AppError> {
    let reason = reason.trim();
    if reason.chars().count() < MIN_REASON_LEN {
        return Err(AppError::Validation(format!(
            "Reason must be at least {MIN_REASON_LEN} characters"
        )));
    }

    let transaction = transaction_query::get_transaction(pool, transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    if transaction.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    if transaction.status != TransactionStatus::Completed {
        return Err(AppError::InvalidState(
            "Only completed transactions can be refunded".to_string(),
        ));
    }

    let active_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM refund_requests
            WHERE transaction_id = $1 AND status IN ('pending', 'approved')
        )
        "#,
    )
    .bind(transaction_id)
    .fetch_one(pool)
    .await?;

    if active_exists {
        return Err(AppError::Conflict(
            "An active refund request already exists for this transaction".to_string(),
        ));
    }

    let inserted = sqlx::query_as::<_, RefundRequest>(
        r#"
        INSERT INTO refund_requests (transaction_id, user_id, amount, reason)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(user_id)
    .bind(transaction.amount)
    .bind(reason)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(request) => Ok(request),
        // Lost a race with a concurrent request for the same transaction;
        // the partial unique index is the backstop for the check above
        Err(e) if is_unique_violation(&e, "ux_refund_requests_active") => Err(AppError::Conflict(
            "An active refund request already exists for this transaction".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Approve a pending refund request and settle it.
///
/// Sequence: guard-transition to approved, reverse the charge with the
/// gateway when the original transaction has a payment reference, credit
/// the wallet (marking the original transaction refunded in the same
/// atomic unit), then guard-transition to completed.
///
/// # Errors
///
/// - `RefundRequestNotFound` / `InvalidState`: As for every transition
/// - `ExternalService`: Gateway refused or was unreachable; the request is
///   back in pending with a failure note
/// - `Reconciliation`: The charge was reversed but the wallet credit
///   failed; requires manual intervention
pub async fn approve_refund(
    pool: &DbPool,
    gateway: &StripeGateway,
    refund_id: Uuid,
    admin_note: Option<String>,
) -> Result<RefundRequest, AppError> {
    let approved = guarded_transition(
        pool,
        refund_id,
        RefundStatus::Pending,
        RefundStatus::Approved,
        admin_note.as_deref(),
    )
    .await?;

    let approved = match approved {
        Some(request) => request,
        None => return Err(transition_failure(pool, refund_id, "approved").await),
    };

    let original = transaction_query::get_transaction(pool, approved.transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    let gateway_reference = original.external_reference.as_deref();

    // Money moved through the processor, so it must move back through the
    // processor before the ledger is touched.
    if let Some(reference) = gateway_reference {
        if let Err(gateway_err) = gateway
            .create_refund(reference, Some(approved.amount), RefundReason::RequestedByCustomer)
            .await
        {
            let note = format!("Gateway refund failed: {gateway_err}");
            guarded_transition(
                pool,
                refund_id,
                RefundStatus::Approved,
                RefundStatus::Pending,
                Some(&note),
            )
            .await?;
            tracing::warn!(
                refund_id = %refund_id,
                reference,
                "gateway refund failed, request reverted to pending"
            );
            return Err(gateway_err);
        }
    }

    let credit = wallet_service::credit_wallet(
        pool,
        approved.user_id,
        approved.amount,
        &format!("Refund for transaction {}", approved.transaction_id),
        Some(approved.transaction_id),
    )
    .await;

    if let Err(credit_err) = credit {
        if let Some(reference) = gateway_reference {
            return Err(AppError::Reconciliation(format!(
                "charge {reference} reversed at the gateway but wallet credit failed for refund request {refund_id}: {credit_err}"
            )));
        }

        // No gateway involvement; undo the approval so it can be retried
        guarded_transition(
            pool,
            refund_id,
            RefundStatus::Approved,
            RefundStatus::Pending,
            Some("Wallet credit failed"),
        )
        .await?;
        return Err(credit_err);
    }

    let completed = guarded_transition(
        pool,
        refund_id,
        RefundStatus::Approved,
        RefundStatus::Completed,
        None,
    )
    .await?;

    completed.ok_or_else(|| {
        AppError::Reconciliation(format!(
            "refund request {refund_id} was credited but could not be marked completed"
        ))
    })
}

/// Reject a pending refund request. The note is the rejection reason shown
/// to the user.
pub async fn reject_refund(
    pool: &DbPool,
    refund_id: Uuid,
    admin_note: &str,
) -> Result<RefundRequest, AppError> {
    if admin_note.trim().is_empty() {
        return Err(AppError::Validation(
            "A rejection reason is required".to_string(),
        ));
    }

    let rejected = guarded_transition(
        pool,
        refund_id,
        RefundStatus::Pending,
        RefundStatus::Rejected,
        Some(admin_note),
    )
    .await?;

    match rejected {
        Some(request) => Ok(request),
        None => Err(transition_failure(pool, refund_id, "rejected").await),
    }
}

/// Cancel the caller's own pending refund request.
///
/// Recorded as rejected with the note "Cancelled by user", which is how
/// admin views tell a cancellation apart from a rejection.
pub async fn cancel_refund_request(
    pool: &DbPool,
    refund_id: Uuid,
    user_id: Uuid,
) -> Result<RefundRequest, AppError> {
    let existing = get_refund_request(pool, refund_id)
        .await?
        .ok_or(AppError::RefundRequestNotFound)?;

    if existing.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let cancelled = guarded_transition(
        pool,
        refund_id,
        RefundStatus::Pending,
        RefundStatus::Rejected,
        Some(CANCELLED_BY_USER_NOTE),
    )
    .await?;

    cancelled.ok_or_else(|| {
        AppError::InvalidState(format!(
            "Refund request is {}, only pending requests can be cancelled",
            existing.status
        ))
    })
}

/// Get a refund request by ID.
pub async fn get_refund_request(
    pool: &DbPool,
    refund_id: Uuid,
) -> Result<Option<RefundRequest>, AppError> {
    let request = sqlx::query_as::<_, RefundRequest>("SELECT * FROM refund_requests WHERE id = $1")
        .bind(refund_id)
        .fetch_optional(pool)
        .await?;

    Ok(request)
}

/// All refund requests for one user, newest first, optionally filtered by
/// status.
pub async fn list_user_refunds(
    pool: &DbPool,
    user_id: Uuid,
    status: Option<RefundStatus>,
) -> Result<Vec<RefundRequest>, AppError> {
    let requests = sqlx::query_as::<_, RefundRequest>(
        r#"
        SELECT * FROM refund_requests
        WHERE user_id = $1
          AND ($2::refund_status IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(requests)
}

/// The admin pending queue, oldest first, joined with the original
/// transaction and the requesting user's identity.
pub async fn list_pending_refunds(
    pool: &DbPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PendingRefundRow>, AppError> {
    let rows = sqlx::query_as::<_, PendingRefundRow>(
        r#"
        SELECT r.id, r.transaction_id, r.user_id, r.amount, r.reason, r.created_at,
               t.transaction_type, t.amount AS transaction_amount,
               u.email AS user_email, u.name AS user_name
        FROM refund_requests r
        JOIN transactions t ON t.id = r.transaction_id
        JOIN users u ON u.id = r.user_id
        WHERE r.status = 'pending'
        ORDER BY r.created_at ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Aggregate refund statistics, optionally bounded to a date window.
pub async fn refund_stats(pool: &DbPool, window: &StatsWindow) -> Result<RefundStats, AppError> {
    let stats = sqlx::query_as::<_, RefundStats>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'pending')   AS pending_count,
            COUNT(*) FILTER (WHERE status = 'approved')  AS approved_count,
            COUNT(*) FILTER (WHERE status = 'completed') AS completed_count,
            COUNT(*) FILTER (WHERE status = 'rejected')  AS rejected_count,
            COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS total_completed_amount
        FROM refund_requests
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        "#,
    )
    .bind(window.from)
    .bind(window.to)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

/// Move a request from one status to another, only if it is still in the
/// expected one. `None` means the guard matched nothing.
///
/// `admin_note` of `None` keeps whatever note is already on the row.
async fn guarded_transition(
    pool: &DbPool,
    refund_id: Uuid,
    from: RefundStatus,
    to: RefundStatus,
    admin_note: Option<&str>,
) -> Result<Option<RefundRequest>, AppError> {
    debug_assert!(from.can_transition(to) || to == RefundStatus::Pending);

    let updated = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = $3,
            admin_note = COALESCE($4, admin_note),
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(from)
    .bind(to)
    .bind(admin_note)
    .fetch_optional(pool)
    .await?;

    Ok(updated)
}

/// Turn a failed guard into the right error: the request either does not
/// exist, or is not in a state that permits the attempted action.
async fn transition_failure(pool: &DbPool, refund_id: Uuid, action: &str) -> AppError {
    match get_refund_request(pool, refund_id).await {
        Ok(Some(existing)) => AppError::InvalidState(format!(
            "Refund request is {}, only pending requests can be {action}",
            existing.status
        )),
        Ok(None) => AppError::RefundRequestNotFound,
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::Config;
    use crate::models::transaction::TransactionType;

    fn lazy_pool() -> DbPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never_connected")
            .expect("lazy pool construction is infallible")
    }

    /// Gateway pointed at an unroutable address. Tests that use it only
    /// exercise transactions without a payment reference, so it is never
    /// actually called.
    fn offline_gateway() -> StripeGateway {
        StripeGateway::new(&Config {
            database_url: "postgres://localhost/unused".to_string(),
            server_port: 3000,
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_api_base: "http://127.0.0.1:1".to_string(),
        })
        .expect("gateway construction")
    }

    #[tokio::test]
    async fn short_reason_is_rejected_before_touching_the_database() {
        let pool = lazy_pool();
        let err = request_refund(&pool, Uuid::new_v4(), Uuid::new_v4(), "too short")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_rejection_note_is_rejected_before_touching_the_database() {
        let pool = lazy_pool();
        let err = reject_refund(&pool, Uuid::new_v4(), "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    // Workflow tests below exercise a real database.
    //
    // Run with: DATABASE_URL=postgres://... cargo test -- --ignored

    async fn test_pool() -> DbPool {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url).await.expect("connect");
        crate::db::run_migrations(&pool).await.expect("migrate");
        pool
    }

    /// A funded wallet with one completed $20 deduction to refund. The
    /// deduction has no payment reference, so approval never needs the
    /// gateway.
    async fn wallet_with_deduction(pool: &DbPool) -> (Uuid, Uuid) {
        let user = Uuid::new_v4();
        wallet_service::create_wallet(pool, user, &format!("{user}@example.com"), "Test User")
            .await
            .unwrap();
        wallet_service::process_top_up(pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        let deduction = wallet_service::deduct_from_wallet(pool, user, dec!(20), "booking fee")
            .await
            .unwrap();
        (user, deduction.transaction.id)
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn refund_round_trip_credits_the_wallet() {
        let pool = test_pool().await;
        let gateway = offline_gateway();
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        let request = request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap();
        assert_eq!(request.status, RefundStatus::Pending);
        assert_eq!(request.amount, dec!(20.00));

        let completed = approve_refund(&pool, &gateway, request.id, Some("Verified".to_string()))
            .await
            .unwrap();
        assert_eq!(completed.status, RefundStatus::Completed);

        // $30 after the deduction, back to $50 after the refund
        let wallet = wallet_service::get_balance(&pool, user).await.unwrap();
        assert_eq!(wallet.balance, dec!(50.00));

        // Exactly one refund ledger entry, original marked refunded
        let refunds: Vec<crate::models::transaction::Transaction> = sqlx::query_as(
            "SELECT * FROM transactions WHERE user_id = $1 AND transaction_type = 'refund'",
        )
        .bind(user)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, dec!(20.00));

        let original = transaction_query::get_transaction(&pool, transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original.status, TransactionStatus::Refunded);
        assert_eq!(original.transaction_type, TransactionType::Deduction);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn second_request_for_the_same_transaction_conflicts() {
        let pool = test_pool().await;
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap();
        let err = request_refund(&pool, user, transaction_id, "Still not as described")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn completed_requests_permit_no_further_transitions() {
        let pool = test_pool().await;
        let gateway = offline_gateway();
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        let request = request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap();
        approve_refund(&pool, &gateway, request.id, None).await.unwrap();

        assert!(matches!(
            approve_refund(&pool, &gateway, request.id, None).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            reject_refund(&pool, request.id, "changed my mind").await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            cancel_refund_request(&pool, request.id, user).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn only_the_owner_can_cancel() {
        let pool = test_pool().await;
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        let request = request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap();

        let err = cancel_refund_request(&pool, request.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let cancelled = cancel_refund_request(&pool, request.id, user).await.unwrap();
        assert_eq!(cancelled.status, RefundStatus::Rejected);
        assert_eq!(cancelled.admin_note.as_deref(), Some(CANCELLED_BY_USER_NOTE));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn refunds_require_a_completed_transaction() {
        let pool = test_pool().await;
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        // Force the original entry out of completed
        sqlx::query("UPDATE transactions SET status = 'failed' WHERE id = $1")
            .bind(transaction_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn requesting_someone_elses_transaction_is_forbidden() {
        let pool = test_pool().await;
        let (_user, transaction_id) = wallet_with_deduction(&pool).await;
        let stranger = Uuid::new_v4();

        let err = request_refund(&pool, stranger, transaction_id, "Room was not as described")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn pending_queue_and_stats_reflect_the_workflow() {
        let pool = test_pool().await;
        let gateway = offline_gateway();
        let (user, transaction_id) = wallet_with_deduction(&pool).await;

        let request = request_refund(&pool, user, transaction_id, "Room was not as described")
            .await
            .unwrap();

        let pending = list_pending_refunds(&pool, 100, 0).await.unwrap();
        let row = pending
            .iter()
            .find(|row| row.id == request.id)
            .expect("pending queue should include the new request");
        assert_eq!(row.transaction_amount, dec!(20.00));
        assert_eq!(row.user_email, format!("{user}@example.com"));

        approve_refund(&pool, &gateway, request.id, None).await.unwrap();

        let mine = list_user_refunds(&pool, user, Some(RefundStatus::Completed))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        let stats = refund_stats(&pool, &StatsWindow::default()).await.unwrap();
        assert!(stats.completed_count >= 1);
        assert!(stats.total_completed_amount >= dec!(20.00));
    }
}
