//! Ledger query surface.
//!
//! Ledger entries are only ever created inside wallet service mutations;
//! this module is the read side: single lookups, filtered history with
//! pagination, counts and sums for statistics, reconciliation lookup by
//! payment reference, and the admin-wide recent listing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::transaction::{
        AdminTransactionRow, Transaction, TransactionHistoryFilter, TransactionHistoryResponse,
        TransactionStatus, TransactionType,
    },
};

/// Get a transaction by ID.
pub async fn get_transaction(
    pool: &DbPool,
    transaction_id: Uuid,
) -> Result<Option<Transaction>, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(transaction_id)
        .fetch_optional(pool)
        .await?;

    Ok(transaction)
}

/// Paginated history for one wallet, newest first.
///
/// Optional filters combine with AND; absent filters are passed as NULL and
/// neutralized in SQL, so one prepared statement covers every combination.
pub async fn history(
    pool: &DbPool,
    user_id: Uuid,
    filter: &TransactionHistoryFilter,
) -> Result<TransactionHistoryResponse, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE user_id = $1
          AND ($2::transaction_type IS NULL OR transaction_type = $2)
          AND ($3::transaction_status IS NULL OR status = $3)
          AND ($4::timestamptz IS NULL OR created_at >= $4)
          AND ($5::timestamptz IS NULL OR created_at <= $5)
        ORDER BY created_at DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(user_id)
    .bind(filter.transaction_type)
    .bind(filter.status)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.limit())
    .bind(filter.offset())
    .fetch_all(pool)
    .await?;

    let total = count_history(pool, user_id, filter).await?;

    Ok(TransactionHistoryResponse {
        transactions,
        total,
        limit: filter.limit(),
        offset: filter.offset(),
    })
}

/// Rows matching a history filter, ignoring pagination.
pub async fn count_history(
    pool: &DbPool,
    user_id: Uuid,
    filter: &TransactionHistoryFilter,
) -> Result<i64, AppError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM transactions
        WHERE user_id = $1
          AND ($2::transaction_type IS NULL OR transaction_type = $2)
          AND ($3::transaction_status IS NULL OR status = $3)
          AND ($4::timestamptz IS NULL OR created_at >= $4)
          AND ($5::timestamptz IS NULL OR created_at <= $5)
        "#,
    )
    .bind(user_id)
    .bind(filter.transaction_type)
    .bind(filter.status)
    .bind(filter.from)
    .bind(filter.to)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Sum of amounts for a type/status pair, optionally scoped to one wallet
/// and a date window. Feeds the statistics endpoints.
pub async fn sum_amounts(
    pool: &DbPool,
    user_id: Option<Uuid>,
    transaction_type: TransactionType,
    status: TransactionStatus,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Decimal, AppError> {
    let total: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0) FROM transactions
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND transaction_type = $2
          AND status = $3
          AND ($4::timestamptz IS NULL OR created_at >= $4)
          AND ($5::timestamptz IS NULL OR created_at <= $5)
        "#,
    )
    .bind(user_id)
    .bind(transaction_type)
    .bind(status)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Transactions correlated to a payment-gateway reference.
///
/// Reconciliation path: given an intent id from a gateway event or report,
/// find what the ledger recorded for it.
pub async fn find_by_external_reference(
    pool: &DbPool,
    reference: &str,
) -> Result<Vec<Transaction>, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE external_reference = $1 ORDER BY created_at DESC",
    )
    .bind(reference)
    .fetch_all(pool)
    .await?;

    Ok(transactions)
}

/// Recent transactions across all wallets, joined with user identity for
/// the admin dashboard.
pub async fn recent_transactions(
    pool: &DbPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<AdminTransactionRow>, AppError> {
    let rows = sqlx::query_as::<_, AdminTransactionRow>(
        r#"
        SELECT t.id, t.user_id, t.transaction_type, t.amount, t.status,
               t.description, t.external_reference, t.created_at,
               u.email AS user_email, u.name AS user_name
        FROM transactions t
        JOIN users u ON u.id = t.user_id
        ORDER BY t.created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::services::wallet_service;

    async fn test_pool() -> DbPool {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url).await.expect("connect");
        crate::db::run_migrations(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn history_filters_and_paginates_newest_first() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        wallet_service::create_wallet(&pool, user, &format!("{user}@example.com"), "Test User")
            .await
            .unwrap();

        wallet_service::process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        wallet_service::process_top_up(&pool, user, dec!(25), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        wallet_service::deduct_from_wallet(&pool, user, dec!(10), "fee")
            .await
            .unwrap();

        let all = history(&pool, user, &TransactionHistoryFilter::default())
            .await
            .unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.transactions.len(), 3);

        let top_ups_only = history(
            &pool,
            user,
            &TransactionHistoryFilter {
                transaction_type: Some(TransactionType::TopUp),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(top_ups_only.total, 2);

        let first_page = history(
            &pool,
            user,
            &TransactionHistoryFilter {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(first_page.transactions.len(), 2);
        assert_eq!(first_page.total, 3);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn sums_amounts_by_type_and_status() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        wallet_service::create_wallet(&pool, user, &format!("{user}@example.com"), "Test User")
            .await
            .unwrap();

        wallet_service::process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        wallet_service::process_top_up(&pool, user, dec!(25), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let total = sum_amounts(
            &pool,
            Some(user),
            TransactionType::TopUp,
            TransactionStatus::Completed,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(total, dec!(75.00));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn finds_entries_by_payment_reference() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        wallet_service::create_wallet(&pool, user, &format!("{user}@example.com"), "Test User")
            .await
            .unwrap();
        let reference = format!("pi_{}", Uuid::new_v4());

        wallet_service::process_top_up(&pool, user, dec!(50), &reference)
            .await
            .unwrap();

        let found = find_by_external_reference(&pool, &reference).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, user);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn admin_listing_carries_user_identity() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        let email = format!("{user}@example.com");
        wallet_service::create_wallet(&pool, user, &email, "Test User")
            .await
            .unwrap();
        wallet_service::process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let rows = recent_transactions(&pool, 50, 0).await.unwrap();
        let row = rows
            .iter()
            .find(|row| row.user_id == user)
            .expect("recent listing should include the new entry");
        assert_eq!(row.user_email, email);
        assert_eq!(row.user_name, "Test User");
    }
}
