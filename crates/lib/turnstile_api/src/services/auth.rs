//! First-party authentication: interactive login, password change, logout.

use tracing::{info, warn};
use turnstile_core::auth::{AuthError, codes, lockout, password, pkce, tokens};
use turnstile_core::models::auth::{ChallengeMethod, Client, User};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedIdentity;
use crate::models::{
    ChangePasswordRequest, ChangePasswordResponse, IdentityResponse, LoginRequest, LoginResponse,
    LogoutRequest, LogoutResponse,
};

/// Minimum accepted length of a new password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Outcome of a successful interactive login.
#[derive(Debug)]
pub enum LoginOutcome {
    /// First-party login: a signed bearer token.
    Token(LoginResponse),
    /// Login completing an authorization request: redirect to the client
    /// with `code` (and `state`).
    Redirect(String),
}

// ---------------------------------------------------------------------------
// Credential checks
// ---------------------------------------------------------------------------

/// Lockout, then password. A wrong password bumps the counter and reports
/// generic invalid credentials.
async fn check_password(state: &AppState, user: &User, candidate: &str) -> AppResult<()> {
    lockout::ensure_unlocked(user)?;
    if !password::verify_password(candidate, &user.password_hash) {
        let failures = state.store.record_failed_attempt(&user.id).await?;
        if lockout::is_locked(failures) {
            warn!(user_id = %user.id, failures, "account locked after repeated failures");
        }
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public auth operations
// ---------------------------------------------------------------------------

/// Authenticate with email + password.
pub async fn login(
    state: &AppState,
    req: &LoginRequest,
    ip: Option<&str>,
) -> AppResult<LoginOutcome> {
    // Authorization context is validated before credentials are checked.
    let authorization = match req.client_id.as_deref().filter(|c| !c.is_empty()) {
        None => None,
        Some(client_id) => {
            let client = match state.store.find_client(client_id).await {
                Ok(client) => client,
                Err(AuthError::NotFound(_)) => {
                    return Err(AppError::Validation("unknown client".into()));
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(method) = req.code_challenge_method.as_deref().filter(|m| !m.is_empty()) {
                if ChallengeMethod::parse(method).is_none() {
                    return Err(AppError::Validation(format!(
                        "unsupported code_challenge_method '{method}'"
                    )));
                }
            }
            let challenge = pkce::parse_challenge(
                req.code_challenge.as_deref(),
                req.code_challenge_method.as_deref(),
            )?;
            Some((client, challenge))
        }
    };

    let user = match state.store.find_user_by_email(&req.email).await {
        Ok(user) => user,
        Err(AuthError::NotFound(_)) => {
            password::verify_dummy(&req.password);
            return Err(AuthError::InvalidCredentials.into());
        }
        Err(e) => return Err(e.into()),
    };
    check_password(state, &user, &req.password).await?;
    state.store.record_successful_login(&user.id, ip).await?;
    info!(user_id = %user.id, "login succeeded");

    match authorization {
        None => {
            let (access_token, claims) =
                state.jwt.issue(&user.id, None, tokens::ACCESS_TOKEN_TTL_SECS)?;
            Ok(LoginOutcome::Token(LoginResponse {
                access_token,
                token_type: tokens::TOKEN_TYPE.to_string(),
                expires_in: tokens::ACCESS_TOKEN_TTL_SECS,
                expires_at: claims.exp,
            }))
        }
        Some((client, challenge)) => {
            let code = codes::issue(state.store.as_ref(), &client.client_id, &user.id, challenge)
                .await?;
            let location = redirect_with_code(&client, &code, req.state.as_deref())?;
            Ok(LoginOutcome::Redirect(location))
        }
    }
}

fn redirect_with_code(client: &Client, code: &str, state: Option<&str>) -> AppResult<String> {
    let mut url = url::Url::parse(&client.redirect_url)
        .map_err(|e| AppError::Internal(format!("client redirect url: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("code", code);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

/// Change the caller's password and revoke their outstanding refresh tokens.
pub async fn change_password(
    state: &AppState,
    identity: &AuthenticatedIdentity,
    req: &ChangePasswordRequest,
) -> AppResult<ChangePasswordResponse> {
    // Re-read the user: the counter may have moved since the middleware ran.
    let user = state.store.find_user_by_id(&identity.user.id).await?;
    check_password(state, &user, &req.current_password).await?;

    if req.new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let hash = password::hash_password(&req.new_password)?;
    state.store.set_password_hash(&user.id, &hash).await?;
    let revoked = state.store.revoke_refresh_tokens_for_user(&user.id).await?;
    info!(user_id = %user.id, revoked, "password changed");

    Ok(ChangePasswordResponse {
        changed: true,
        revoked_refresh_tokens: revoked,
    })
}

/// Revoke a refresh token held by the caller.
pub async fn logout(
    state: &AppState,
    identity: &AuthenticatedIdentity,
    req: &LogoutRequest,
) -> AppResult<LogoutResponse> {
    let revoked = match req.refresh_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            state
                .store
                .revoke_refresh_token_for_user(&identity.user.id, token)
                .await?
        }
        None => false,
    };
    info!(user_id = %identity.user.id, revoked, "logout");
    Ok(LogoutResponse { revoked })
}

/// Project the resolved identity onto the wire.
pub fn identity(identity: &AuthenticatedIdentity) -> IdentityResponse {
    IdentityResponse {
        user_id: identity.user.id.clone(),
        email: identity.user.email.clone(),
        role: identity.user.role.clone(),
        provider: identity.provider.as_str().to_string(),
        client_id: identity.client_id.clone(),
        organizations: identity.memberships.clone(),
        active_organization: identity
            .active_organization
            .as_ref()
            .map(|m| m.organization_id.clone()),
    }
}
