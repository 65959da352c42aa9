//! Wallet service - Core business logic for balance mutations.
//!
//! This service handles:
//! - Atomic balance updates
//! - Top-up idempotency by payment reference
//! - Balance validation (non-negativity)
//! - Database transaction management
//!
//! # Atomicity Guarantees
//!
//! Every mutation runs inside one PostgreSQL transaction that updates the
//! wallet row and appends the ledger entry. The database ensures
//! all-or-nothing execution, so balances and the transaction log never
//! diverge.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{transaction::Transaction, wallet::Wallet},
};

/// Result of a balance mutation: the post-mutation balance and the ledger
/// entry appended in the same atomic unit.
#[derive(Debug)]
pub struct WalletMutation {
    pub balance: Decimal,
    pub transaction: Transaction,
}

/// Result of a wallet-to-wallet transfer.
#[derive(Debug)]
pub struct TransferOutcome {
    pub from_balance: Decimal,
    pub to_balance: Decimal,
    pub debit: Transaction,
    pub credit: Transaction,
}

/// Provision a wallet for a user.
///
/// Called by the marketplace application once per signup. Both inserts are
/// idempotent, so retries are harmless; the existing wallet is returned if
/// one was already provisioned.
pub async fn create_wallet(
    pool: &DbPool,
    user_id: Uuid,
    email: &str,
    name: &str,
) -> Result<Wallet, AppError> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".to_string()));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO users (id, email, name) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .bind(email)
        .bind(name)
        .execute(&mut *tx)
        .await?;

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
        RETURNING user_id, balance, currency, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;

    match wallet {
        Some(wallet) => Ok(wallet),
        // Already provisioned; hand back the existing row
        None => get_balance(pool, user_id).await,
    }
}

/// Get the current balance and currency for a wallet.
///
/// # Errors
///
/// - `WalletNotFound`: No wallet exists for this user
pub async fn get_balance(pool: &DbPool, user_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>(
        "SELECT user_id, balance, currency, created_at, updated_at FROM wallets WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::WalletNotFound)
}

/// Check whether a wallet can cover `amount`.
pub async fn has_sufficient_balance(
    pool: &DbPool,
    user_id: Uuid,
    amount: Decimal,
) -> Result<bool, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be positive".to_string(),
        ));
    }

    let wallet = get_balance(pool, user_id).await?;
    Ok(wallet.balance >= amount)
}

/// Credit a wallet after a payment succeeded at the gateway.
///
/// # Idempotency
///
/// A payment intent credits a wallet at most once. A repeat call with the
/// same `payment_intent_id` (webhook retry, double confirm) returns the
/// original ledger entry and the current balance instead of crediting
/// again; a concurrent duplicate loses the race on the partial unique
/// index and takes the same path.
///
/// # Errors
///
/// - `Validation`: Amount is zero or negative, or the reference is empty
/// - `WalletNotFound`: No wallet exists for this user
pub async fn process_top_up(
    pool: &DbPool,
    user_id: Uuid,
    amount: Decimal,
    payment_intent_id: &str,
) -> Result<WalletMutation, AppError> {
    // Validate amount
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be positive".to_string(),
        ));
    }
    if payment_intent_id.trim().is_empty() {
        return Err(AppError::Validation(
            "Payment reference must not be empty".to_string(),
        ));
    }

    // Fast path: this intent already credited the wallet
    if let Some(existing) = find_top_up_by_reference(pool, user_id, payment_intent_id).await? {
        let wallet = get_balance(pool, user_id).await?;
        return Ok(WalletMutation {
            balance: wallet.balance,
            transaction: existing,
        });
    }

    // Start db transaction
    let mut tx = pool.begin().await?;

    // The UPDATE takes the row lock for the duration of the transaction
    let balance: Decimal = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance = balance + $1,
            updated_at = NOW()
        WHERE user_id = $2
        RETURNING balance
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::WalletNotFound)?;

    // Record the ledger entry
    let inserted = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, transaction_type, amount, status, description, external_reference)
        VALUES ($1, 'top_up', $2, 'completed', $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind("Wallet top-up")
    .bind(payment_intent_id)
    .fetch_one(&mut *tx)
    .await;

    let transaction = match inserted {
        Ok(transaction) => transaction,
        Err(e) if is_unique_violation(&e, "ux_transactions_top_up_external_ref") => {
            // Lost the race with a concurrent delivery of the same intent;
            // the balance update above rolls back with the transaction
            tx.rollback().await?;
            let existing = find_top_up_by_reference(pool, user_id, payment_intent_id)
                .await?
                .ok_or(AppError::TransactionNotFound)?;
            let wallet = get_balance(pool, user_id).await?;
            return Ok(WalletMutation {
                balance: wallet.balance,
                transaction: existing,
            });
        }
        Err(e) => return Err(e.into()),
    };

    // Commit all changes atomically
    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        amount = %amount,
        reference = payment_intent_id,
        "wallet topped up"
    );

    Ok(WalletMutation {
        balance,
        transaction,
    })
}

/// Deduct from a wallet (fees, rent, application charges).
///
/// # Errors
///
/// - `Validation`: Amount is zero or negative
/// - `WalletNotFound`: No wallet exists for this user
/// - `InsufficientBalance`: Balance is lower than the amount; nothing is
///   persisted, the balance after the failure equals the balance before it
pub async fn deduct_from_wallet(
    pool: &DbPool,
    user_id: Uuid,
    amount: Decimal,
    reason: &str,
) -> Result<WalletMutation, AppError> {
    // Validate amount
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be positive".to_string(),
        ));
    }

    // Start database transaction
    let mut tx = pool.begin().await?;

    // Lock wallet and check balance
    let balance: Decimal =
        sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::WalletNotFound)?;

    // Validate sufficient balance
    if balance < amount {
        tx.rollback().await?;
        return Err(AppError::InsufficientBalance {
            current: balance,
            required: amount,
        });
    }

    // Update balance
    let new_balance: Decimal = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance = balance - $1,
            updated_at = NOW()
        WHERE user_id = $2
        RETURNING balance
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    // Record the ledger entry
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, transaction_type, amount, status, description)
        VALUES ($1, 'deduction', $2, 'completed', $3)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    // Commit atomically
    tx.commit().await?;

    Ok(WalletMutation {
        balance: new_balance,
        transaction,
    })
}

/// Credit a wallet outside the gateway flow, used by the refund workflow.
///
/// When `related_transaction_id` is given, the original transaction is
/// flipped to `refunded` inside the same atomic unit, so the ledger shows
/// the refund and the refunded entry consistently or not at all.
///
/// # Errors
///
/// - `Validation`: Amount is zero or negative
/// - `WalletNotFound`: No wallet exists for this user
pub async fn credit_wallet(
    pool: &DbPool,
    user_id: Uuid,
    amount: Decimal,
    reason: &str,
    related_transaction_id: Option<Uuid>,
) -> Result<WalletMutation, AppError> {
    // Validate amount
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let balance: Decimal = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance = balance + $1,
            updated_at = NOW()
        WHERE user_id = $2
        RETURNING balance
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::WalletNotFound)?;

    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, transaction_type, amount, status, description)
        VALUES ($1, 'refund', $2, 'completed', $3)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(original_id) = related_transaction_id {
        // The refunded entry keeps its id, amount, and timestamps; only
        // status changes, the log stays append-only
        sqlx::query("UPDATE transactions SET status = 'refunded' WHERE id = $1")
            .bind(original_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(WalletMutation {
        balance,
        transaction,
    })
}

/// Move money between two wallets.
///
/// # Atomicity
///
/// Both wallet rows are locked and updated in a single database
/// transaction. Rows are locked in ascending user-id order regardless of
/// transfer direction, so two opposite transfers cannot deadlock. A missing
/// recipient rolls back the sender's debit.
///
/// # Errors
///
/// - `Validation`: Amount is zero or negative, or sender equals recipient
/// - `WalletNotFound`: Either wallet does not exist
/// - `InsufficientBalance`: Sender cannot cover the amount
pub async fn transfer_between_wallets(
    pool: &DbPool,
    from_user_id: Uuid,
    to_user_id: Uuid,
    amount: Decimal,
    reason: &str,
) -> Result<TransferOutcome, AppError> {
    // Validate amount
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be positive".to_string(),
        ));
    }

    // Prevent transferring to the same wallet
    if from_user_id == to_user_id {
        return Err(AppError::Validation(
            "Cannot transfer to the same wallet".to_string(),
        ));
    }

    // Start database transaction
    let mut tx = pool.begin().await?;

    // Deterministic lock order: ascending user id
    let (first, second) = if from_user_id < to_user_id {
        (from_user_id, to_user_id)
    } else {
        (to_user_id, from_user_id)
    };

    let first_balance = lock_wallet(&mut tx, first)
        .await?
        .ok_or(AppError::WalletNotFound)?;
    let second_balance = lock_wallet(&mut tx, second)
        .await?
        .ok_or(AppError::WalletNotFound)?;

    let sender_balance = if first == from_user_id {
        first_balance
    } else {
        second_balance
    };

    if sender_balance < amount {
        tx.rollback().await?;
        return Err(AppError::InsufficientBalance {
            current: sender_balance,
            required: amount,
        });
    }

    // Update both balances atomically
    let from_balance: Decimal = sqlx::query_scalar(
        "UPDATE wallets SET balance = balance - $1, updated_at = NOW() WHERE user_id = $2 RETURNING balance",
    )
    .bind(amount)
    .bind(from_user_id)
    .fetch_one(&mut *tx)
    .await?;

    let to_balance: Decimal = sqlx::query_scalar(
        "UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE user_id = $2 RETURNING balance",
    )
    .bind(amount)
    .bind(to_user_id)
    .fetch_one(&mut *tx)
    .await?;

    // One ledger entry per side: a deduction for the sender, a top-up for
    // the recipient
    let debit = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, transaction_type, amount, status, description)
        VALUES ($1, 'deduction', $2, 'completed', $3)
        RETURNING *
        "#,
    )
    .bind(from_user_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    let credit = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, transaction_type, amount, status, description)
        VALUES ($1, 'top_up', $2, 'completed', $3)
        RETURNING *
        "#,
    )
    .bind(to_user_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    // Commit all changes atomically
    tx.commit().await?;

    Ok(TransferOutcome {
        from_balance,
        to_balance,
        debit,
        credit,
    })
}

/// Lock a wallet row for the rest of the enclosing transaction.
async fn lock_wallet(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<Option<Decimal>, sqlx::Error> {
    sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
}

/// Find the top-up already recorded against a payment reference, if any.
async fn find_top_up_by_reference(
    pool: &DbPool,
    user_id: Uuid,
    reference: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE user_id = $1 AND external_reference = $2 AND transaction_type = 'top_up'
        "#,
    )
    .bind(user_id)
    .bind(reference)
    .fetch_optional(pool)
    .await?;

    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::transaction::{TransactionStatus, TransactionType};

    /// Pool that performs no I/O until a query runs. Validation failures
    /// must surface before the first query, so these tests need no server.
    fn lazy_pool() -> DbPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never_connected")
            .expect("lazy pool construction is infallible")
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_before_touching_the_database() {
        let pool = lazy_pool();
        let user = Uuid::new_v4();

        for amount in [Decimal::ZERO, dec!(-5)] {
            assert!(matches!(
                process_top_up(&pool, user, amount, "pi_1").await,
                Err(AppError::Validation(_))
            ));
            assert!(matches!(
                deduct_from_wallet(&pool, user, amount, "fee").await,
                Err(AppError::Validation(_))
            ));
            assert!(matches!(
                credit_wallet(&pool, user, amount, "refund", None).await,
                Err(AppError::Validation(_))
            ));
            assert!(matches!(
                transfer_between_wallets(&pool, user, Uuid::new_v4(), amount, "gift").await,
                Err(AppError::Validation(_))
            ));
            assert!(matches!(
                has_sufficient_balance(&pool, user, amount).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn rejects_empty_top_up_reference() {
        let pool = lazy_pool();
        assert!(matches!(
            process_top_up(&pool, Uuid::new_v4(), dec!(50), "  ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rejects_transfer_to_self() {
        let pool = lazy_pool();
        let user = Uuid::new_v4();
        assert!(matches!(
            transfer_between_wallets(&pool, user, user, dec!(10), "gift").await,
            Err(AppError::Validation(_))
        ));
    }

    // Scenario tests below exercise a real database.
    //
    // Run with: DATABASE_URL=postgres://... cargo test -- --ignored

    async fn test_pool() -> DbPool {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url).await.expect("connect");
        crate::db::run_migrations(&pool).await.expect("migrate");
        pool
    }

    async fn fresh_wallet(pool: &DbPool) -> Uuid {
        let user_id = Uuid::new_v4();
        create_wallet(pool, user_id, &format!("{user_id}@example.com"), "Test User")
            .await
            .expect("provision wallet");
        user_id
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn top_up_credits_balance_and_records_the_entry() {
        let pool = test_pool().await;
        let user = fresh_wallet(&pool).await;
        let reference = format!("pi_{}", Uuid::new_v4());

        let outcome = process_top_up(&pool, user, dec!(50), &reference).await.unwrap();

        assert_eq!(outcome.balance, dec!(50.00));
        assert_eq!(outcome.transaction.transaction_type, TransactionType::TopUp);
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(outcome.transaction.external_reference.as_deref(), Some(reference.as_str()));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicate_top_up_reference_credits_only_once() {
        let pool = test_pool().await;
        let user = fresh_wallet(&pool).await;
        let reference = format!("pi_{}", Uuid::new_v4());

        let first = process_top_up(&pool, user, dec!(50), &reference).await.unwrap();
        let second = process_top_up(&pool, user, dec!(50), &reference).await.unwrap();

        assert_eq!(second.transaction.id, first.transaction.id);
        assert_eq!(second.balance, dec!(50.00));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn rejected_deduction_leaves_no_trace() {
        let pool = test_pool().await;
        let user = fresh_wallet(&pool).await;
        process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let err = deduct_from_wallet(&pool, user, dec!(75), "rent").await.unwrap_err();
        match err {
            AppError::InsufficientBalance { current, required } => {
                assert_eq!(current, dec!(50.00));
                assert_eq!(required, dec!(75));
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }

        // Balance unchanged, no deduction entry appended
        assert_eq!(get_balance(&pool, user).await.unwrap().balance, dec!(50.00));
        let deductions: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND transaction_type = 'deduction'",
        )
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(deductions, 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn deduction_debits_balance_and_records_the_entry() {
        let pool = test_pool().await;
        let user = fresh_wallet(&pool).await;
        process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let outcome = deduct_from_wallet(&pool, user, dec!(20), "fee").await.unwrap();

        assert_eq!(outcome.balance, dec!(30.00));
        assert_eq!(outcome.transaction.transaction_type, TransactionType::Deduction);
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(outcome.transaction.description.as_deref(), Some("fee"));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn transfer_conserves_total_balance() {
        let pool = test_pool().await;
        let sender = fresh_wallet(&pool).await;
        let recipient = fresh_wallet(&pool).await;
        process_top_up(&pool, sender, dec!(30), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        process_top_up(&pool, recipient, dec!(5), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let outcome =
            transfer_between_wallets(&pool, sender, recipient, dec!(10), "shared deposit")
                .await
                .unwrap();

        assert_eq!(outcome.from_balance, dec!(20.00));
        assert_eq!(outcome.to_balance, dec!(15.00));
        assert_eq!(outcome.from_balance + outcome.to_balance, dec!(35.00));
        assert_eq!(outcome.debit.transaction_type, TransactionType::Deduction);
        assert_eq!(outcome.credit.transaction_type, TransactionType::TopUp);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn transfer_to_missing_wallet_rolls_back_the_debit() {
        let pool = test_pool().await;
        let sender = fresh_wallet(&pool).await;
        process_top_up(&pool, sender, dec!(30), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();

        let err = transfer_between_wallets(&pool, sender, Uuid::new_v4(), dec!(10), "gift")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WalletNotFound));

        assert_eq!(get_balance(&pool, sender).await.unwrap().balance, dec!(30.00));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn crediting_with_a_related_transaction_marks_it_refunded() {
        let pool = test_pool().await;
        let user = fresh_wallet(&pool).await;
        process_top_up(&pool, user, dec!(50), &format!("pi_{}", Uuid::new_v4()))
            .await
            .unwrap();
        let deduction = deduct_from_wallet(&pool, user, dec!(20), "fee").await.unwrap();

        let outcome = credit_wallet(
            &pool,
            user,
            dec!(20),
            "Refund for fee",
            Some(deduction.transaction.id),
        )
        .await
        .unwrap();

        assert_eq!(outcome.balance, dec!(50.00));
        assert_eq!(outcome.transaction.transaction_type, TransactionType::Refund);

        let original_status: TransactionStatus =
            sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1")
                .bind(deduction.transaction.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(original_status, TransactionStatus::Refunded);
    }
}
