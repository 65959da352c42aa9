//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Delegates to a service (database transactions, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Health check endpoint
pub mod health;
/// Payment gateway endpoints (intents, stored cards)
pub mod payments;
/// Refund workflow endpoints
pub mod refunds;
/// Ledger read endpoints
pub mod transactions;
/// Balance endpoints
pub mod wallet;
/// Inbound gateway webhook endpoint
pub mod webhooks;
