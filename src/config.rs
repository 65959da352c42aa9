//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.
//!
//! The payment gateway credentials live here too: the gateway adapter is
//! constructed once at startup from this struct, never from ambient
//! environment lookups at first use.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `STRIPE_SECRET_KEY` (required): payment gateway API key
/// - `STRIPE_WEBHOOK_SECRET` (required): shared secret for webhook signature verification
/// - `STRIPE_API_BASE` (optional): gateway base URL, defaults to the live API
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub stripe_secret_key: String,

    pub stripe_webhook_secret: String,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default gateway base URL if STRIPE_API_BASE is not set.
///
/// Overridable so staging can point the adapter at a mock server.
fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
