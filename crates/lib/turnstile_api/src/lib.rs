//! # turnstile_api
//!
//! HTTP API library for Turnstile: the OAuth2 token and authorization
//! endpoints, interactive login, and the authentication middleware.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use turnstile_core::auth::AuthError;
use turnstile_core::auth::jwt::JwtKeys;
use turnstile_core::store::AuthStore;

use crate::config::ApiConfig;
use crate::handlers::{auth, oauth};

/// Route paths.
pub mod routes {
    pub const POST_OAUTH_TOKEN: &str = "/oauth/token";
    pub const GET_OAUTH_AUTHORIZE: &str = "/oauth/authorize";
    pub const POST_AUTH_LOGIN: &str = "/auth/login";
    pub const GET_AUTH_ME: &str = "/auth/me";
    pub const POST_AUTH_PASSWORD: &str = "/auth/password";
    pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Users, clients, codes, tokens and sessions.
    pub store: Arc<dyn AuthStore>,
    /// API configuration.
    pub config: ApiConfig,
    /// Bearer token keys derived from `config.jwt_secret`.
    pub jwt: JwtKeys,
}

impl AppState {
    pub fn new(store: Arc<dyn AuthStore>, config: ApiConfig) -> Result<Self, AuthError> {
        let jwt = JwtKeys::from_secret(config.jwt_secret.as_bytes())?;
        Ok(Self { store, config, jwt })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `turnstile_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    turnstile_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_OAUTH_TOKEN, post(oauth::token_handler))
        .route(routes::GET_OAUTH_AUTHORIZE, get(oauth::authorize_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::POST_AUTH_PASSWORD, post(auth::change_password_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
