//! Wallet Service - Main Application Entry Point
//!
//! This is the wallet/ledger service of the Roomly room-rental marketplace.
//! It manages account balances, an append-only transaction log, a refund
//! request workflow, and the integration with the external payment gateway.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, one transaction per
//!   balance mutation)
//! - **Identity**: forwarded by the application gateway in headers
//! - **Payments**: Stripe adapter, constructed once from configuration
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Construct the payment gateway adapter
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

mod config;
mod db;
mod error;
mod gateway;
mod handlers;
mod middleware;
mod models;
mod money;
mod services;
mod state;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::{gateway::StripeGateway, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Construct the gateway adapter once; handlers receive it via state
    let stripe_gateway = StripeGateway::new(&config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let app_state = AppState {
        pool,
        gateway: Arc::new(stripe_gateway),
    };

    // Admin routes, guarded by the role check
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/refunds/pending",
            get(handlers::refunds::list_pending_refunds),
        )
        .route(
            "/api/v1/admin/refunds/{id}/approve",
            post(handlers::refunds::approve_refund),
        )
        .route(
            "/api/v1/admin/refunds/{id}/reject",
            post(handlers::refunds::reject_refund),
        )
        .route(
            "/api/v1/admin/refunds/stats",
            get(handlers::refunds::refund_stats),
        )
        .route(
            "/api/v1/admin/transactions/recent",
            get(handlers::transactions::recent_transactions),
        )
        .route(
            "/api/v1/admin/transactions/stats",
            get(handlers::transactions::transaction_stats),
        )
        .route_layer(axum_middleware::from_fn(
            middleware::identity::require_admin,
        ));

    // User-facing routes
    let user_routes = Router::new()
        // Wallet provisioning and balance
        .route("/api/v1/wallets", post(handlers::wallet::create_wallet))
        .route("/api/v1/wallet/balance", get(handlers::wallet::get_balance))
        .route(
            "/api/v1/wallet/balance/check",
            get(handlers::wallet::check_balance),
        )
        // Top-up flow
        .route(
            "/api/v1/wallet/topup/intent",
            post(handlers::payments::create_top_up_intent),
        )
        .route(
            "/api/v1/wallet/topup/confirm",
            post(handlers::wallet::confirm_top_up),
        )
        // Mutations
        .route("/api/v1/wallet/deduct", post(handlers::wallet::deduct))
        .route("/api/v1/wallet/transfer", post(handlers::wallet::transfer))
        // Ledger reads
        .route(
            "/api/v1/wallet/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        // Refund workflow
        .route("/api/v1/refunds", post(handlers::refunds::request_refund))
        .route("/api/v1/refunds", get(handlers::refunds::list_my_refunds))
        .route(
            "/api/v1/refunds/{id}/cancel",
            post(handlers::refunds::cancel_refund),
        )
        // Stored payment methods
        .route(
            "/api/v1/payments/methods",
            get(handlers::payments::list_payment_methods),
        );

    // Every identified route goes through the identity middleware; it runs
    // before the admin guard on admin routes
    let identified_routes = user_routes.merge(admin_routes).route_layer(
        axum_middleware::from_fn(middleware::identity::identity_middleware),
    );

    // Combine identified routes with public routes
    let app = Router::new()
        // Public routes (no forwarded identity required)
        .route("/health", get(handlers::health::health_check))
        // The gateway authenticates itself with the webhook signature
        .route(
            "/api/v1/webhooks/stripe",
            post(handlers::webhooks::stripe_webhook),
        )
        .merge(identified_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share state with all handlers via State extraction
        .with_state(app_state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
