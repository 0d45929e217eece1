//! Request and response wire shapes.

use serde::{Deserialize, Serialize};
use turnstile_core::auth::tokens::IssuedTokens;
use turnstile_core::models::auth::Membership;

// =============================================================================
// OAuth2 endpoints
// =============================================================================

/// Form body of `POST /oauth/token`. Every field is optional so that missing
/// fields surface as `invalid_request` rather than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Successful token endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds.
    pub expires_at: i64,
    pub refresh_token: String,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(t: IssuedTokens) -> Self {
        Self {
            access_token: t.access_token,
            token_type: t.token_type.to_string(),
            expires_in: t.expires_in,
            expires_at: t.expires_at.timestamp(),
            refresh_token: t.refresh_token,
        }
    }
}

/// Query of `GET /oauth/authorize`. Other parameters (`state`, `scope`) are
/// not interpreted; they reach the login page through the raw query.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

// =============================================================================
// First-party endpoints
// =============================================================================

/// `POST /auth/login` body. With `client_id` the login completes an
/// authorization request and answers with a redirect carrying a code.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub client_id: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
}

/// Signed bearer token issued by a first-party login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordResponse {
    pub changed: bool,
    /// Refresh tokens invalidated by the change.
    pub revoked_refresh_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

/// `GET /auth/me` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub provider: String,
    pub client_id: Option<String>,
    pub organizations: Vec<Membership>,
    pub active_organization: Option<String>,
}
