//! Wallet data models and API request/response types.
//!
//! This module defines:
//! - `Wallet`: Database entity representing a user's balance
//! - `CreateWalletRequest`: Request body for provisioning a wallet
//! - `BalanceResponse`: Response body returned to clients
//!
//! # Balance Storage
//!
//! Balances are stored as NUMERIC(12, 2) and handled as
//! `rust_decimal::Decimal` major-currency units. The database CHECK
//! constraint keeps balances non-negative; the service rejects any
//! operation that would violate it before issuing the update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a wallet record from the database.
///
/// Maps to the `wallets` table. One wallet per user, single currency,
/// mutated exclusively through the wallet service.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    /// Owning user; doubles as the wallet's primary key
    pub user_id: Uuid,

    /// Current balance in major currency units, never negative
    pub balance: Decimal,

    /// Currency code, always "usd"
    pub currency: String,

    /// When the wallet was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last balance change
    pub updated_at: DateTime<Utc>,
}

/// Request body for provisioning a wallet.
///
/// The marketplace application calls this once per signup. Email and name
/// are carried along so admin views can display them without a second
/// round-trip to the application's user store.
///
/// # JSON Example
///
/// ```json
/// {
///   "email": "ada@example.com",
///   "name": "Ada Lovelace"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub email: String,
    pub name: String,
}

/// Response body for the balance endpoint.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,

    /// Current balance in major currency units
    pub balance: Decimal,

    pub currency: String,
}

impl From<Wallet> for BalanceResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            user_id: wallet.user_id,
            balance: wallet.balance,
            currency: wallet.currency,
        }
    }
}
