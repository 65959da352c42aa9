//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

pub mod refund_service;
pub mod transaction_query;
pub mod wallet_service;
