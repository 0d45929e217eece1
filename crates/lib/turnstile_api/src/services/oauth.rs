//! Authorization server façade: token endpoint grant dispatch and the
//! authorization endpoint redirect.
//!
//! Credential-related rejections are collapsed to `invalid_client` or
//! `invalid_grant`; the sub-check that failed is only logged.

use tracing::{debug, info};
use turnstile_core::auth::{AuthError, codes, lockout, password, pkce, tokens};
use turnstile_core::models::auth::{ChallengeMethod, Client};
use url::form_urlencoded;

use crate::AppState;
use crate::error::OAuthError;
use crate::models::{AuthorizeQuery, TokenRequest, TokenResponse};

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

/// Handle a token request: authenticate the client, then dispatch on
/// `grant_type`.
pub async fn token_request(
    state: &AppState,
    form: &TokenRequest,
    ip: Option<&str>,
) -> Result<TokenResponse, OAuthError> {
    let grant_type = required(form.grant_type.as_deref(), "grant_type")?;
    let client_id = required(form.client_id.as_deref(), "client_id")?;
    let client = authenticate_client(state, client_id, form.client_secret.as_deref()).await?;

    let issued = match grant_type {
        GRANT_AUTHORIZATION_CODE => authorization_code_grant(state, &client, form, ip).await?,
        GRANT_CLIENT_CREDENTIALS => client_credentials_grant(state, &client, ip).await?,
        GRANT_REFRESH_TOKEN => refresh_token_grant(state, &client, form, ip).await?,
        other => {
            debug!(grant_type = other, "unsupported grant type");
            return Err(OAuthError::unsupported_grant_type());
        }
    };
    Ok(TokenResponse::from(issued))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("{field} is required")))
}

/// Resolve the client and, for confidential clients, verify its secret.
async fn authenticate_client(
    state: &AppState,
    client_id: &str,
    secret: Option<&str>,
) -> Result<Client, OAuthError> {
    let client = match state.store.find_client(client_id).await {
        Ok(client) => client,
        Err(AuthError::NotFound(_)) => {
            debug!(client_id, "unknown client");
            return Err(OAuthError::invalid_client());
        }
        Err(e) => return Err(e.into()),
    };
    if client.is_public {
        return Ok(client);
    }
    let verified = secret.is_some_and(|s| password::verify_password(s, &client.secret_hash));
    if !verified {
        debug!(client_id, "client secret rejected");
        return Err(OAuthError::invalid_client());
    }
    Ok(client)
}

async fn authorization_code_grant(
    state: &AppState,
    client: &Client,
    form: &TokenRequest,
    ip: Option<&str>,
) -> Result<tokens::IssuedTokens, OAuthError> {
    let code = required(form.code.as_deref(), "code")?;
    if !redirect_matches(client, form.redirect_uri.as_deref()) {
        debug!(client_id = %client.client_id, "redirect_uri mismatch at token endpoint");
        return Err(OAuthError::invalid_grant());
    }
    let record = codes::redeem(state.store.as_ref(), &client.client_id, code).await?;
    if !pkce::verify(record.pkce.as_ref(), form.code_verifier.as_deref()) {
        debug!(client_id = %client.client_id, "pkce verification failed");
        return Err(OAuthError::invalid_grant());
    }
    let user = state.store.find_user_by_id(&record.user_id).await?;
    lockout::ensure_unlocked(&user)?;
    let issued = tokens::exchange_code(state.store.as_ref(), &record, ip).await?;
    Ok(issued)
}

/// An absent `redirect_uri` defers to the registration.
fn redirect_matches(client: &Client, redirect_uri: Option<&str>) -> bool {
    redirect_uri
        .filter(|uri| !uri.is_empty())
        .is_none_or(|uri| uri == client.redirect_url)
}

async fn client_credentials_grant(
    state: &AppState,
    client: &Client,
    ip: Option<&str>,
) -> Result<tokens::IssuedTokens, OAuthError> {
    let owner = match state.store.find_user_by_id(&client.owner_user_id).await {
        Ok(user) => user,
        Err(AuthError::NotFound(_)) => {
            debug!(client_id = %client.client_id, "client owner missing");
            return Err(OAuthError::invalid_client());
        }
        Err(e) => return Err(e.into()),
    };
    lockout::ensure_unlocked(&owner)?;
    let issued = tokens::issue(state.store.as_ref(), &client.client_id, &owner.id, ip).await?;
    Ok(issued)
}

async fn refresh_token_grant(
    state: &AppState,
    client: &Client,
    form: &TokenRequest,
    ip: Option<&str>,
) -> Result<tokens::IssuedTokens, OAuthError> {
    let token = required(form.refresh_token.as_deref(), "refresh_token")?;
    let old = tokens::find_refresh(state.store.as_ref(), &client.client_id, token).await?;
    // Lockout is checked on the current user row, before anything rotates.
    let user = state.store.find_user_by_id(&old.user_id).await?;
    lockout::ensure_unlocked(&user)?;
    let issued = tokens::redeem_refresh(state.store.as_ref(), &old, ip).await?;
    Ok(issued)
}

// ---------------------------------------------------------------------------
// Authorization endpoint
// ---------------------------------------------------------------------------

/// Validate an authorization request and build the login page URL that
/// carries it forward.
pub async fn authorization_request(
    state: &AppState,
    query: &AuthorizeQuery,
    raw_query: Option<&str>,
) -> Result<String, OAuthError> {
    if query.response_type.as_deref() != Some("code") {
        return Err(OAuthError::unsupported_response_type());
    }
    let client_id = required(query.client_id.as_deref(), "client_id")?;
    let client = match state.store.find_client(client_id).await {
        Ok(client) => client,
        Err(AuthError::NotFound(_)) => {
            return Err(OAuthError::invalid_client()
                .with_status(axum::http::StatusCode::BAD_REQUEST)
                .with_description("unknown client"));
        }
        Err(e) => return Err(e.into()),
    };
    if !redirect_matches(&client, query.redirect_uri.as_deref()) {
        return Err(OAuthError::invalid_request(
            "redirect_uri does not match the registered redirect URL",
        ));
    }

    if let Some(method) = query.code_challenge_method.as_deref().filter(|m| !m.is_empty()) {
        if ChallengeMethod::parse(method).is_none() {
            return Err(OAuthError::unsupported_challenge_method(method));
        }
    }
    let challenge = pkce::parse_challenge(
        query.code_challenge.as_deref(),
        query.code_challenge_method.as_deref(),
    )?;

    let mut forwarded = form_urlencoded::Serializer::new(String::new());
    let mut has_method = false;
    for (key, value) in form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes()) {
        if key == "code_challenge_method" {
            if value.is_empty() {
                continue;
            }
            has_method = true;
        }
        forwarded.append_pair(&key, &value);
    }
    if let Some(challenge) = &challenge {
        if !has_method {
            forwarded.append_pair("code_challenge_method", challenge.method.as_str());
        }
    }

    let separator = if state.config.login_url.contains('?') { '&' } else { '?' };
    let location = format!("{}{separator}{}", state.config.login_url, forwarded.finish());
    info!(client_id, pkce = challenge.is_some(), "authorization request accepted");
    Ok(location)
}
