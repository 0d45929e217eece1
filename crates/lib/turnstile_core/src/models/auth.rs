//! Identity and token lifecycle domain models.
//!
//! These are internal domain models, distinct from the wire shapes in
//! `turnstile_api::models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// PKCE code challenge transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl ChallengeMethod {
    /// Parse the wire name. Method names are case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

/// How an authenticated request presented its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    /// Signed bearer token.
    Jwt,
    /// Static `X-API-Key`.
    ApiToken,
    /// Opaque access token minted by the token endpoint.
    #[serde(rename = "oauth")]
    OAuth,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::ApiToken => "api_token",
            Self::OAuth => "oauth",
        }
    }
}

// =============================================================================
// Principals
// =============================================================================

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Scheme-tagged password hash. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: String,
    /// Consecutive failed credential checks since the last reset.
    #[serde(skip_serializing, default)]
    pub failed_attempts: i32,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: String,
    pub role: String,
}

/// Registered application (OAuth client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// Empty for public clients.
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub is_public: bool,
    pub redirect_url: String,
    pub owner_user_id: String,
}

// =============================================================================
// Grants
// =============================================================================

/// PKCE challenge bound to an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: ChallengeMethod,
}

/// Short-lived, single-use authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub pkce: Option<PkceChallenge>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Opaque access token record.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub user_id: String,
    pub ip_address: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Opaque refresh token record.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Access/refresh pair minted together and persisted in one unit of work.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

// =============================================================================
// Sessions & claims
// =============================================================================

/// Observability record, upserted per `(user_id, client_id)`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    /// `None` for first-party requests not tied to a registered client.
    pub client_id: Option<String>,
    pub last_ip: Option<String>,
    pub provider: AuthProvider,
    pub last_seen: DateTime<Utc>,
}

/// Claims carried inside a signed bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Subject: user ID.
    pub sub: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Application the token was issued for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}
