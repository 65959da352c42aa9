//! Transaction data models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: Database entity representing a ledger entry
//! - `TransactionType` / `TransactionStatus`: PostgreSQL enum mappings
//! - Request types for deduction and transfer operations
//! - `TransactionHistoryFilter`: query parameters for the history endpoint
//!
//! # Immutability
//!
//! The `transactions` table is an append-only audit trail. Once a row is
//! inserted, only `status` ever changes (a completed transaction becomes
//! `refunded` when a refund against it settles). Rows are never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ledger entry.
///
/// Maps to the `transaction_type` PostgreSQL enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money entering a wallet from the payment gateway or a transfer
    TopUp,
    /// Money leaving a wallet (fees, rent, transfer out)
    Deduction,
    /// Money credited back to a wallet by the refund workflow
    Refund,
}

/// Lifecycle status of a ledger entry.
///
/// Maps to the `transaction_status` PostgreSQL enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    /// A completed transaction whose amount was later refunded
    Refunded,
}

/// Represents a transaction record from the database.
///
/// Maps to the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    /// Unique identifier for this transaction
    pub id: Uuid,

    /// Wallet (user) this entry belongs to
    pub user_id: Uuid,

    /// Kind of entry (top-up, deduction, refund)
    pub transaction_type: TransactionType,

    /// Amount in major currency units, always positive
    pub amount: Decimal,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// Human-readable reason for the entry
    pub description: Option<String>,

    /// Correlation to a payment gateway intent id, when the money moved
    /// through the processor. Top-ups are unique per (user, reference),
    /// which is what makes webhook retries harmless.
    pub external_reference: Option<String>,

    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

/// Request to confirm a top-up after the client completed payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "payment_intent_id": "pi_3MtwBwLkdIwHu7ix28a3tqPa"
/// }
/// ```
///
/// The handler retrieves the intent from the gateway, requires it to be
/// succeeded, and credits the wallet with the amount the processor actually
/// captured. Repeat confirmations return the original transaction.
#[derive(Debug, Deserialize)]
pub struct ConfirmTopUpRequest {
    pub payment_intent_id: String,
}

/// Request to deduct from the caller's wallet.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount": "75.00",
///   "reason": "Application fee for listing 42"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// Amount in major currency units, must be positive
    pub amount: Decimal,

    /// Reason recorded on the ledger entry
    pub reason: String,
}

/// Request to transfer money to another user's wallet.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Recipient user
    pub to_user_id: Uuid,

    /// Amount in major currency units, must be positive
    pub amount: Decimal,

    /// Reason recorded on both ledger entries
    pub reason: String,
}

/// Query parameters for the transaction history endpoint.
///
/// All filters are optional and combine with AND. Results are newest-first.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionHistoryFilter {
    /// Filter by entry kind, e.g. `?type=TOP_UP`
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,

    /// Filter by status, e.g. `?status=COMPLETED`
    pub status: Option<TransactionStatus>,

    /// Only entries created at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Only entries created at or before this instant
    pub to: Option<DateTime<Utc>>,

    /// Page size, defaults to 20, capped at 100
    pub limit: Option<i64>,

    /// Page start, defaults to 0
    pub offset: Option<i64>,
}

impl TransactionHistoryFilter {
    /// Effective page size after defaulting and capping.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    /// Effective page start after defaulting.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Paginated transaction history response.
#[derive(Debug, Serialize)]
pub struct TransactionHistoryResponse {
    pub transactions: Vec<Transaction>,

    /// Total rows matching the filter, ignoring pagination
    pub total: i64,

    pub limit: i64,
    pub offset: i64,
}

/// Admin-wide transaction listing row, joined with user identity.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct AdminTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_email: String,
    pub user_name: String,
}
