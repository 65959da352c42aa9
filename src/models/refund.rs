//! Refund request data models.
//!
//! A refund request is a small workflow entity layered over a transaction:
//!
//! ```text
//! pending -> approved -> completed
//! pending -> rejected          (admin reject, or user cancel)
//! ```
//!
//! `completed` and `rejected` are terminal. A user cancellation is recorded
//! as `rejected` with the admin note "Cancelled by user".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::transaction::TransactionType;

/// Minimum length of a refund reason, in characters.
pub const MIN_REASON_LEN: usize = 10;

/// Note recorded when a user cancels their own pending request.
pub const CANCELLED_BY_USER_NOTE: &str = "Cancelled by user";

/// Lifecycle status of a refund request.
///
/// Maps to the `refund_status` PostgreSQL enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl RefundStatus {
    /// An active request blocks further refund requests for the same
    /// transaction.
    pub fn is_active(self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Approved)
    }

    /// Legal next states from this one.
    pub fn valid_transitions(self) -> &'static [RefundStatus] {
        match self {
            RefundStatus::Pending => &[RefundStatus::Approved, RefundStatus::Rejected],
            RefundStatus::Approved => &[RefundStatus::Completed],
            // Terminal states
            RefundStatus::Completed | RefundStatus::Rejected => &[],
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: RefundStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Completed => "completed",
            RefundStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a refund request record from the database.
///
/// Maps to the `refund_requests` table. `amount` is copied from the original
/// transaction at creation time and is not independently settable.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RefundRequest {
    pub id: Uuid,

    /// The completed transaction being refunded
    pub transaction_id: Uuid,

    /// Owner of the transaction; the only user allowed to cancel
    pub user_id: Uuid,

    /// Amount in major currency units, copied from the transaction
    pub amount: Decimal,

    /// Why the user wants the refund, at least [`MIN_REASON_LEN`] characters
    pub reason: String,

    pub status: RefundStatus,

    /// Admin's stated reason on reject/approve, failure notes on a reverted
    /// approval, or [`CANCELLED_BY_USER_NOTE`]
    pub admin_note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for opening a refund request.
///
/// # JSON Example
///
/// ```json
/// {
///   "transaction_id": "770e8400-e29b-41d4-a716-446655440002",
///   "reason": "Room was not as described in the listing"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub transaction_id: Uuid,
    pub reason: String,
}

/// Request body for approving a refund request.
#[derive(Debug, Default, Deserialize)]
pub struct ApproveRefundRequest {
    pub admin_note: Option<String>,
}

/// Request body for rejecting a refund request. The note is mandatory; it
/// is the rejection reason shown to the user.
#[derive(Debug, Deserialize)]
pub struct RejectRefundRequest {
    pub admin_note: String,
}

/// Query parameters for the caller's own refund listing.
#[derive(Debug, Default, Deserialize)]
pub struct RefundListFilter {
    pub status: Option<RefundStatus>,
}

/// Query parameters for paginated admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Admin pending-queue row, joined with the original transaction and the
/// requesting user's identity. Oldest-first so the queue is worked in order.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct PendingRefundRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub transaction_amount: Decimal,
    pub user_email: String,
    pub user_name: String,
}

/// Optional date bounds for refund statistics.
#[derive(Debug, Default, Deserialize)]
pub struct StatsWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Aggregate refund statistics for the admin dashboard.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct RefundStats {
    pub pending_count: i64,
    pub approved_count: i64,
    pub completed_count: i64,
    pub rejected_count: i64,

    /// Sum of amounts over completed requests in the window
    pub total_completed_amount: Decimal,
}
