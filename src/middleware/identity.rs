//! Caller identity middleware.
//!
//! This service sits behind the marketplace application gateway, which
//! authenticates the user and forwards their identity in headers:
//!
//! - `X-User-Id`: UUID of the authenticated user (required)
//! - `X-User-Role`: `admin` or `user` (optional, defaults to `user`)
//!
//! The middleware turns those headers into a [`CallerIdentity`] request
//! extension for handlers to extract. Requests without a parseable
//! identity never reach a handler.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;

/// Role forwarded by the application gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    User,
    Admin,
}

/// Identity attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    /// The authenticated user; used for ownership checks and to scope
    /// every wallet query
    pub user_id: Uuid,

    pub role: CallerRole,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }
}

/// Identity extraction middleware.
///
/// # Flow
///
/// 1. Read `X-User-Id`; reject the request if absent
/// 2. Parse it as a UUID; reject with a validation error if malformed
/// 3. Read `X-User-Role` (anything but `admin` means `user`)
/// 4. Insert [`CallerIdentity`] into request extensions, call next handler
pub async fn identity_middleware(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user_id = request
        .headers()
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Forbidden)?;

    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| AppError::Validation("X-User-Id must be a UUID".to_string()))?;

    let role = match request
        .headers()
        .get("X-User-Role")
        .and_then(|value| value.to_str().ok())
    {
        Some("admin") => CallerRole::Admin,
        _ => CallerRole::User,
    };

    request
        .extensions_mut()
        .insert(CallerIdentity { user_id, role });

    Ok(next.run(request).await)
}

/// Guard for admin-only routes. Runs after [`identity_middleware`], which
/// inserted the identity this reads.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<CallerIdentity>() {
        Some(identity) if identity.is_admin() => Ok(next.run(request).await),
        _ => Err(AppError::Forbidden),
    }
}
