//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// Refund request workflow model
pub mod refund;
/// Ledger entry model
pub mod transaction;
/// User reference model
pub mod user;
/// Wallet balance model
pub mod wallet;
