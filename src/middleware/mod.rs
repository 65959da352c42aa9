//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Establish caller identity
//! - Guard role-restricted routes
//! - Short-circuit requests (reject unauthorized)

/// Forwarded caller identity middleware
pub mod identity;
