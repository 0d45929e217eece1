//! Application error types.
//!
//! Two response shapes: [`AppError`] renders `{error, message}` for the
//! first-party routes and the authentication middleware, [`OAuthError`]
//! renders the OAuth2 `{error, error_description}` body for the token and
//! authorization endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use turnstile_core::auth::AuthError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message returned for every rejected credential, whatever the cause.
pub const GENERIC_UNAUTHORIZED: &str = "Authentication required";

/// Error body for first-party routes.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account locked")]
    AccountLocked,

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::AccountLocked => (
                StatusCode::UNAUTHORIZED,
                "account_locked",
                "Account is locked",
            ),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::AccountLocked => AppError::AccountLocked,
            AuthError::NotFound(what) => AppError::NotFound(what.to_string()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Storage(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// OAuth2 errors
// ---------------------------------------------------------------------------

/// OAuth2 error body.
#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Error returned by the token and authorization endpoints.
#[derive(Debug, Error)]
#[error("{code}")]
pub struct OAuthError {
    pub status: StatusCode,
    pub code: &'static str,
    pub description: Option<String>,
}

impl OAuthError {
    fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request").with_description(description)
    }

    pub fn invalid_client() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_client")
    }

    pub fn invalid_grant() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_grant")
    }

    pub fn account_locked() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "account_locked")
    }

    pub fn unsupported_grant_type() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "unsupported_grant_type")
    }

    pub fn unsupported_response_type() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "unsupported_response_type")
    }

    pub fn unsupported_challenge_method(method: &str) -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_challenge_method",
        )
        .with_description(format!("code_challenge_method '{method}' is not supported"))
    }

    pub fn server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
    }
}

impl From<AuthError> for OAuthError {
    /// Default mapping for grant processing. Client authentication maps its
    /// own failures to `invalid_client` before this applies.
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::NotFound(_) => OAuthError::invalid_grant(),
            AuthError::AccountLocked => OAuthError::account_locked(),
            AuthError::Validation(msg) => OAuthError::invalid_request(msg),
            AuthError::Storage(e) => {
                error!(error = %e, "storage failure during grant");
                OAuthError::server_error()
            }
            AuthError::Conflict(msg) | AuthError::Internal(msg) => {
                error!(error = %msg, "internal failure during grant");
                OAuthError::server_error()
            }
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = Json(OAuthErrorBody {
            error: self.code,
            error_description: self.description,
        });
        (self.status, body).into_response()
    }
}
