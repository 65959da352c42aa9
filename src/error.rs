//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Resource Errors**: Wallet, transaction, or refund request not found
/// - **Business Logic Errors**: Insufficient balance, illegal state
///   transitions, duplicate active refund requests
/// - **Validation Errors**: Invalid request data
/// - **Gateway Errors**: Payment processor calls that failed, and the fatal
///   case where the processor and the ledger have diverged
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("{0}")]
    Validation(String),

    /// The caller has no wallet, or the referenced wallet does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Wallet not found")]
    WalletNotFound,

    /// Referenced transaction does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Referenced refund request does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Refund request not found")]
    RefundRequestNotFound,

    /// The caller does not own the resource they are acting on.
    ///
    /// Returns HTTP 403 Forbidden. The message is deliberately generic so
    /// the response leaks nothing about other users' data.
    #[error("Access denied")]
    Forbidden,

    /// Operation attempted from a state that does not permit it,
    /// e.g. approving a refund request that is not pending.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("{0}")]
    InvalidState(String),

    /// Wallet balance is lower than the amount the operation needs.
    ///
    /// Returns HTTP 422 Unprocessable Entity. Carries the current balance
    /// and the required amount so the client can render an actionable
    /// message.
    #[error("Insufficient balance. Current: ${current:.2}, Required: ${required:.2}")]
    InsufficientBalance { current: Decimal, required: Decimal },

    /// A conflicting record already exists, e.g. an active refund request
    /// for the same transaction.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// A payment gateway call failed.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Payment gateway error: {0}")]
    ExternalService(String),

    /// The gateway and the ledger have diverged (e.g. charge reversed with
    /// the processor but the wallet credit failed). Requires manual
    /// intervention; never silently swallowed.
    ///
    /// Returns HTTP 500 Internal Server Error and logs at error level.
    #[error("Reconciliation required: {0}")]
    Reconciliation(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::WalletNotFound => {
                (StatusCode::NOT_FOUND, "wallet_not_found", self.to_string())
            }
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::RefundRequestNotFound => (
                StatusCode::NOT_FOUND,
                "refund_request_not_found",
                self.to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::InvalidState(ref msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state", msg.clone())
            }
            AppError::InsufficientBalance { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_balance",
                self.to_string(),
            ),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::ExternalService(ref msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
            ),
            AppError::Reconciliation(ref msg) => {
                // Loud on purpose. This is the one error an operator must see.
                tracing::error!("reconciliation required: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "reconciliation_error",
                    self.to_string(),
                )
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn insufficient_balance_message_names_both_amounts() {
        let err = AppError::InsufficientBalance {
            current: dec!(50),
            required: dec!(75),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance. Current: $50.00, Required: $75.00"
        );
    }

    #[test]
    fn variants_map_to_expected_status_codes() {
        let cases = [
            (
                AppError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::WalletNotFound, StatusCode::NOT_FOUND),
            (AppError::TransactionNotFound, StatusCode::NOT_FOUND),
            (AppError::RefundRequestNotFound, StatusCode::NOT_FOUND),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (
                AppError::InvalidState("nope".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::InsufficientBalance {
                    current: dec!(1),
                    required: dec!(2),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                AppError::ExternalService("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Reconciliation("diverged".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn database_errors_hide_details_from_clients() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
