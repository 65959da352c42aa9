//! User reference model.
//!
//! Users are provisioned and administered by the marketplace application.
//! This service reads the row for wallet provisioning and for admin views
//! that display email/name next to ledger entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a user record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    /// Unique identifier, shared with the marketplace application
    pub id: Uuid,

    /// Contact email, unique across users
    pub email: String,

    /// Display name
    pub name: String,

    /// When the user was created
    pub created_at: DateTime<Utc>,
}
