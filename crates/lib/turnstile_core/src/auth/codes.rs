//! Authorization code manager.
//!
//! A code moves `issued → exchanged` (deleted by the exchange) or
//! `issued → expired` (inert, reaped by `purge_expired`). Exchange itself
//! lives in [`super::tokens::exchange_code`] so the code is consumed in the
//! same unit of work that persists the token pair.

use chrono::{Duration, Utc};
use tracing::debug;

use super::AuthError;
use super::random::unambiguous_string;
use crate::models::auth::{AuthorizationCode, PkceChallenge};
use crate::store::GrantStore;

/// Authorization code lifetime: 5 minutes.
pub const CODE_TTL_SECS: i64 = 5 * 60;

/// Characters in a generated code.
pub const CODE_LENGTH: usize = 40;

/// Issue a new code for `(client_id, user_id)`, optionally bound to a PKCE
/// challenge. Returns the code value.
pub async fn issue<S: GrantStore + ?Sized>(
    store: &S,
    client_id: &str,
    user_id: &str,
    pkce: Option<PkceChallenge>,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let code = AuthorizationCode {
        code: unambiguous_string(CODE_LENGTH),
        client_id: client_id.to_string(),
        user_id: user_id.to_string(),
        pkce,
        issued_at: now,
        expires_at: now + Duration::seconds(CODE_TTL_SECS),
    };
    store.insert_authorization_code(&code).await?;
    debug!(client_id, user_id, pkce = code.pkce.is_some(), "issued authorization code");
    Ok(code.code)
}

/// Look up a live code issued to `client_id`.
///
/// This does not consume the code. Callers verify PKCE and the user, then
/// consume it through [`super::tokens::exchange_code`].
pub async fn redeem<S: GrantStore + ?Sized>(
    store: &S,
    client_id: &str,
    code: &str,
) -> Result<AuthorizationCode, AuthError> {
    store.find_authorization_code(client_id, code).await
}
