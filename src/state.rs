//! Shared application state.

use std::sync::Arc;

use crate::{db::DbPool, gateway::StripeGateway};

/// State shared with every handler via Axum's `State` extractor.
///
/// The gateway adapter is constructed once at startup from [`crate::config::Config`]
/// and injected here, so no code path reaches for environment variables or a
/// lazily-initialized global client.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub pool: DbPool,

    /// Payment gateway adapter
    pub gateway: Arc<StripeGateway>,
}
