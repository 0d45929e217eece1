//! Authentication and token lifecycle logic.
//!
//! Provides credential verification, lockout policy, authorization codes with
//! PKCE, and token issuance/rotation shared by `turnstile_api` and the server.

pub mod api_keys;
pub mod codes;
pub mod jwt;
pub mod lockout;
pub mod password;
pub mod pkce;
pub mod random;
pub mod tokens;

use thiserror::Error;

/// Authentication errors.
///
/// `NotFound` is a structural signal; callers match on it rather than
/// comparing messages.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthError::NotFound(_))
    }
}
