//! Signed bearer token generation and verification.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::AuthError;
use crate::models::auth::BearerClaims;

/// Signing keys derived from the server-held symmetric secret (HS256).
///
/// Built once at startup and passed to whoever signs or verifies.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtKeys([REDACTED])")
    }
}

impl JwtKeys {
    /// Build keys from a secret. An empty secret is refused.
    pub fn from_secret(secret: &[u8]) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Validation("signing secret is empty".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &BearerClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry, returning the claims on success.
    pub fn verify(&self, token: &str) -> Option<BearerClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        decode::<BearerClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }

    /// Issue a bearer token for `user_id` valid for `ttl_secs`.
    pub fn issue(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        ttl_secs: i64,
    ) -> Result<(String, BearerClaims), AuthError> {
        let now = Utc::now();
        let claims = BearerClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            iat: now.timestamp(),
            client_id: client_id.map(str::to_string),
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }
}

/// Cheap shape check: a compact JWS has exactly three dot-separated segments.
pub fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}
