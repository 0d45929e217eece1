//! First-party authentication handlers.

use axum::extract::State;
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedIdentity;
use crate::middleware::client_ip::ClientIp;
use crate::models::{
    ChangePasswordRequest, ChangePasswordResponse, IdentityResponse, LoginRequest, LogoutRequest,
    LogoutResponse,
};
use crate::services::auth::{self, LoginOutcome};

/// `POST /auth/login`: authenticate with email + password.
///
/// Answers with a bearer token, or with a `302` to the client's redirect URL
/// when the login completes an authorization request.
pub async fn login_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(body): Json<LoginRequest>,
) -> AppResult<Response> {
    let resp = match auth::login(&state, &body, ip.as_deref()).await? {
        LoginOutcome::Token(token) => Json(token).into_response(),
        LoginOutcome::Redirect(location) => {
            (StatusCode::FOUND, [(LOCATION, location)]).into_response()
        }
    };
    Ok(resp)
}

/// `GET /auth/me`: the identity resolved by the middleware.
pub async fn me_handler(
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Json<IdentityResponse> {
    Json(auth::identity(&identity))
}

/// `POST /auth/password`: change the caller's password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<ChangePasswordResponse>> {
    let resp = auth::change_password(&state, &identity, &body).await?;
    Ok(Json(resp))
}

/// `POST /auth/logout`: revoke one of the caller's refresh tokens.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let resp = auth::logout(&state, &identity, &body).await?;
    Ok(Json(resp))
}
