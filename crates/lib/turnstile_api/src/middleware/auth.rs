//! Authentication middleware: API key, opaque access token or signed bearer.
//!
//! `X-API-Key` takes precedence over `Authorization`. Every rejection looks
//! the same to the caller; the cause is only logged at debug level.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};
use turnstile_core::auth::{AuthError, tokens};
use turnstile_core::models::auth::{AuthProvider, Membership, SessionRecord, User};

use super::client_ip;
use crate::AppState;
use crate::config::OrganizationSelection;
use crate::error::{AppError, GENERIC_UNAUTHORIZED};

/// Static API key header.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the active organization under [`OrganizationSelection::Header`].
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Resolved identity, stored in request extensions for downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub user: User,
    pub provider: AuthProvider,
    /// Application the credential was issued for, if any.
    pub client_id: Option<String>,
    pub memberships: Vec<Membership>,
    pub active_organization: Option<Membership>,
}

/// Axum middleware: authenticates the request and injects
/// [`AuthenticatedIdentity`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user, client_id, provider) = match resolve_principal(&state, request.headers()).await {
        Ok(principal) => principal,
        Err(AuthError::Storage(e)) => return Err(AppError::Internal(e.to_string())),
        Err(e) => {
            debug!(reason = %e, "rejecting request");
            return Err(AppError::Unauthorized(GENERIC_UNAUTHORIZED.into()));
        }
    };

    let memberships = state.store.memberships(&user.id).await?;
    let active_organization = select_organization(
        state.config.organization_selection,
        &memberships,
        request.headers(),
    );

    let ip = client_ip::resolve(request.headers(), request.extensions());
    let session = SessionRecord {
        user_id: user.id.clone(),
        client_id: client_id.clone(),
        last_ip: ip.0,
        provider,
        last_seen: Utc::now(),
    };
    if let Err(e) = state.store.upsert_session(&session).await {
        warn!(user_id = %user.id, error = %e, "session upsert failed");
    }

    request.extensions_mut().insert(AuthenticatedIdentity {
        user,
        provider,
        client_id,
        memberships,
        active_organization,
    });

    Ok(next.run(request).await)
}

async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(User, Option<String>, AuthProvider), AuthError> {
    if let Some(key) = headers.get(API_KEY_HEADER) {
        let key = key
            .to_str()
            .map_err(|_| AuthError::Validation("malformed api key header".into()))?;
        let (user, client_id) = state.store.find_user_by_api_key(key).await?;
        return Ok((user, client_id, AuthProvider::ApiToken));
    }

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NotFound("credential"))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Validation("invalid authorization scheme".into()))?;

    if tokens::is_opaque_access_token(token) {
        let access = state.store.find_access_token(token).await?;
        let user = state.store.find_user_by_id(&access.user_id).await?;
        return Ok((user, Some(access.client_id), AuthProvider::OAuth));
    }

    let claims = state
        .jwt
        .verify(token)
        .ok_or(AuthError::InvalidCredentials)?;
    let user = state.store.find_user_by_id(&claims.sub).await?;
    Ok((user, claims.client_id, AuthProvider::Jwt))
}

/// Pick the active organization according to the configured policy.
pub fn select_organization(
    policy: OrganizationSelection,
    memberships: &[Membership],
    headers: &HeaderMap,
) -> Option<Membership> {
    match policy {
        OrganizationSelection::FirstMembership => memberships.first().cloned(),
        OrganizationSelection::Header => {
            let wanted = headers.get(ORGANIZATION_HEADER)?.to_str().ok()?.trim();
            memberships
                .iter()
                .find(|m| m.organization_id == wanted)
                .cloned()
        }
    }
}
