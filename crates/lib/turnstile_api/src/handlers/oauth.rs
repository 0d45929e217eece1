//! OAuth2 endpoint handlers.

use axum::Json;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, RawQuery, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::AppState;
use crate::error::OAuthError;
use crate::middleware::client_ip::ClientIp;
use crate::models::{AuthorizeQuery, TokenRequest, TokenResponse};
use crate::services::oauth;

/// `POST /oauth/token`: exchange a grant for an access/refresh token pair.
pub async fn token_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let Form(form) = form.map_err(|rejection| {
        debug!(%rejection, "token request body rejected");
        OAuthError::invalid_request(rejection.body_text())
    })?;
    let resp = oauth::token_request(&state, &form, ip.as_deref()).await?;
    Ok(Json(resp))
}

/// `GET /oauth/authorize`: validate the request and send the user agent to
/// the login page.
pub async fn authorize_handler(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Result<Response, OAuthError> {
    let Query(query) = query.map_err(|rejection| {
        debug!(%rejection, "authorization query rejected");
        OAuthError::invalid_request(rejection.body_text())
    })?;
    let location = oauth::authorization_request(&state, &query, raw.as_deref()).await?;
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}
