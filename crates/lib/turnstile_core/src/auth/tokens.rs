//! Token issuer and rotation.
//!
//! Access and refresh tokens are opaque lookup keys. Exchange and rotation
//! are issue-then-revoke inside one store unit of work: the new pair is
//! written first and the consumed code or refresh token is deleted under a
//! liveness guard. If the guard finds nothing the whole unit is undone.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::AuthError;
use super::random::unambiguous_string;
use crate::models::auth::{AccessToken, AuthorizationCode, RefreshToken, TokenPair};
use crate::store::GrantStore;

/// Access token lifetime: 1 hour.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Refresh token lifetime: 365 days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 365;

/// Prefix of opaque access tokens.
pub const ACCESS_TOKEN_PREFIX: &str = "tsa_";

/// Prefix of opaque refresh tokens.
pub const REFRESH_TOKEN_PREFIX: &str = "tsr_";

const TOKEN_BODY_LENGTH: usize = 48;

/// Token type reported to clients.
pub const TOKEN_TYPE: &str = "Bearer";

/// Result of a successful issuance, rotation or exchange.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

impl From<&TokenPair> for IssuedTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access.token.clone(),
            refresh_token: pair.refresh.token.clone(),
            token_type: TOKEN_TYPE,
            expires_in: ACCESS_TOKEN_TTL_SECS,
            expires_at: pair.access.expires_at,
        }
    }
}

/// Whether a bearer value has the opaque access token shape.
pub fn is_opaque_access_token(value: &str) -> bool {
    value.starts_with(ACCESS_TOKEN_PREFIX)
}

/// Mint a fresh pair for `(client_id, user_id)` without persisting it.
pub fn mint_pair(client_id: &str, user_id: &str, ip_address: Option<&str>) -> TokenPair {
    let now = Utc::now();
    TokenPair {
        access: AccessToken {
            token: format!("{ACCESS_TOKEN_PREFIX}{}", unambiguous_string(TOKEN_BODY_LENGTH)),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            ip_address: ip_address.map(str::to_string),
            issued_at: now,
            expires_at: now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        },
        refresh: RefreshToken {
            token: format!("{REFRESH_TOKEN_PREFIX}{}", unambiguous_string(TOKEN_BODY_LENGTH)),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            issued_at: now,
            expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        },
    }
}

/// Mint and persist a new pair.
pub async fn issue<S: GrantStore + ?Sized>(
    store: &S,
    client_id: &str,
    user_id: &str,
    ip_address: Option<&str>,
) -> Result<IssuedTokens, AuthError> {
    let pair = mint_pair(client_id, user_id, ip_address);
    store.insert_token_pair(&pair).await?;
    info!(client_id, user_id, "issued token pair");
    Ok(IssuedTokens::from(&pair))
}

/// Exchange a previously redeemed authorization code for a new pair.
///
/// Returns `NotFound` if the code was consumed or expired in the meantime;
/// in that case no tokens are persisted.
pub async fn exchange_code<S: GrantStore + ?Sized>(
    store: &S,
    code: &AuthorizationCode,
    ip_address: Option<&str>,
) -> Result<IssuedTokens, AuthError> {
    let pair = mint_pair(&code.client_id, &code.user_id, ip_address);
    store.exchange_authorization_code(code, &pair).await?;
    info!(client_id = %code.client_id, user_id = %code.user_id, "exchanged authorization code");
    Ok(IssuedTokens::from(&pair))
}

/// Look up a live refresh token issued to `client_id`.
pub async fn find_refresh<S: GrantStore + ?Sized>(
    store: &S,
    client_id: &str,
    token: &str,
) -> Result<RefreshToken, AuthError> {
    store.find_refresh_token(client_id, token).await
}

/// Rotate a refresh token: issue a new pair bound to the same
/// `(client, user)` and invalidate `old`.
pub async fn redeem_refresh<S: GrantStore + ?Sized>(
    store: &S,
    old: &RefreshToken,
    ip_address: Option<&str>,
) -> Result<IssuedTokens, AuthError> {
    let pair = mint_pair(&old.client_id, &old.user_id, ip_address);
    store.rotate_refresh_token(old, &pair).await?;
    info!(client_id = %old.client_id, user_id = %old.user_id, "rotated refresh token");
    Ok(IssuedTokens::from(&pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codes;
    use crate::store::MemoryStore;

    #[test]
    fn minted_pair_has_expected_shape() {
        let pair = mint_pair("app-1", "u1", Some("10.0.0.1"));
        assert!(pair.access.token.starts_with(ACCESS_TOKEN_PREFIX));
        assert!(pair.refresh.token.starts_with(REFRESH_TOKEN_PREFIX));
        assert!(is_opaque_access_token(&pair.access.token));
        assert!(!is_opaque_access_token(&pair.refresh.token));
        assert_eq!(
            (pair.access.expires_at - pair.access.issued_at).num_seconds(),
            ACCESS_TOKEN_TTL_SECS
        );
        assert_eq!(
            (pair.refresh.expires_at - pair.refresh.issued_at).num_days(),
            REFRESH_TOKEN_TTL_DAYS
        );
        assert_eq!(pair.access.ip_address.as_deref(), Some("10.0.0.1"));
        assert_ne!(
            mint_pair("app-1", "u1", None).access.token,
            pair.access.token
        );
    }

    #[tokio::test]
    async fn issue_persists_both_tokens() {
        let store = MemoryStore::new();
        let issued = issue(&store, "app-1", "u1", None).await.unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, ACCESS_TOKEN_TTL_SECS);
        let access = store.find_access_token(&issued.access_token).await.unwrap();
        assert_eq!(access.user_id, "u1");
        let refresh = find_refresh(&store, "app-1", &issued.refresh_token)
            .await
            .unwrap();
        assert_eq!(refresh.user_id, "u1");
    }

    #[tokio::test]
    async fn code_exchanges_exactly_once() {
        let store = MemoryStore::new();
        let code = codes::issue(&store, "app-1", "u1", None).await.unwrap();
        let record = codes::redeem(&store, "app-1", &code).await.unwrap();

        let first = exchange_code(&store, &record, None).await.unwrap();
        assert!(store.find_access_token(&first.access_token).await.is_ok());

        let again = exchange_code(&store, &record, None).await.unwrap_err();
        assert!(again.is_not_found());
        assert!(codes::redeem(&store, "app-1", &code).await.unwrap_err().is_not_found());
        // The losing exchange left nothing behind.
        assert_eq!(store.access_token_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_exchanges_have_one_winner() {
        let store = MemoryStore::new();
        let code = codes::issue(&store, "app-1", "u1", None).await.unwrap();
        let record = codes::redeem(&store, "app-1", &code).await.unwrap();

        let (a, b) = tokio::join!(
            exchange_code(&store, &record, None),
            exchange_code(&store, &record, None)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(store.refresh_tokens_for("app-1", "u1").len(), 1);
    }

    #[tokio::test]
    async fn rotation_invalidates_old_refresh_token() {
        let store = MemoryStore::new();
        let issued = issue(&store, "app-1", "u1", None).await.unwrap();
        let old = find_refresh(&store, "app-1", &issued.refresh_token)
            .await
            .unwrap();

        let rotated = redeem_refresh(&store, &old, None).await.unwrap();
        assert_ne!(rotated.refresh_token, issued.refresh_token);

        let err = find_refresh(&store, "app-1", &issued.refresh_token)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let live = store.refresh_tokens_for("app-1", "u1");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token, rotated.refresh_token);

        // Replaying the stolen-but-used token fails and mints nothing.
        assert!(redeem_refresh(&store, &old, None).await.unwrap_err().is_not_found());
        assert_eq!(store.refresh_tokens_for("app-1", "u1").len(), 1);
    }

    #[tokio::test]
    async fn refresh_token_is_scoped_to_client() {
        let store = MemoryStore::new();
        let issued = issue(&store, "app-1", "u1", None).await.unwrap();
        assert!(
            find_refresh(&store, "app-2", &issued.refresh_token)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
