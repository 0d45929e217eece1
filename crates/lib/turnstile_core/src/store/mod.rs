//! Persistence collaborators.
//!
//! The token lifecycle only needs three capabilities: user lookup and
//! failure-counter updates, client registry lookup, and keyed storage for
//! codes, tokens and sessions. `PgStore` backs them with PostgreSQL;
//! `MemoryStore` keeps everything in process.
//!
//! Every mutation is a single-row conditional update or a short transaction
//! scoped by primary key. Lookups that miss return [`AuthError::NotFound`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::models::auth::{
    AccessToken, AuthorizationCode, Client, Membership, RefreshToken, SessionRecord, TokenPair,
    User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User lookup and credential-state updates.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, AuthError>;

    /// Case-insensitive email lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<User, AuthError>;

    /// Resolve a static API key to its user and the application it belongs to.
    async fn find_user_by_api_key(&self, key: &str)
    -> Result<(User, Option<String>), AuthError>;

    /// Organization memberships, ordered by organization id.
    async fn memberships(&self, user_id: &str) -> Result<Vec<Membership>, AuthError>;

    /// Atomically increment the failure counter, returning the new value.
    async fn record_failed_attempt(&self, user_id: &str) -> Result<i32, AuthError>;

    /// Reset the failure counter and record last-login metadata.
    async fn record_successful_login(
        &self,
        user_id: &str,
        ip_address: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Replace the password hash and reset the failure counter.
    async fn set_password_hash(&self, user_id: &str, password_hash: &str)
    -> Result<(), AuthError>;
}

/// Read-only application registry.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn find_client(&self, client_id: &str) -> Result<Client, AuthError>;
}

/// Storage for authorization codes, token pairs and sessions.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError>;

    /// Non-expired code issued to `client_id`.
    async fn find_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError>;

    /// Persist `pair` and delete `code` as one unit.
    ///
    /// If the code is already gone or expired nothing is persisted and
    /// `NotFound` is returned, so at most one exchange per code succeeds.
    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
        pair: &TokenPair,
    ) -> Result<(), AuthError>;

    async fn insert_token_pair(&self, pair: &TokenPair) -> Result<(), AuthError>;

    /// Non-expired refresh token issued to `client_id`.
    async fn find_refresh_token(
        &self,
        client_id: &str,
        token: &str,
    ) -> Result<RefreshToken, AuthError>;

    /// Persist `pair` and delete `old` as one unit, with the same
    /// at-most-once guarantee as [`GrantStore::exchange_authorization_code`].
    async fn rotate_refresh_token(
        &self,
        old: &RefreshToken,
        pair: &TokenPair,
    ) -> Result<(), AuthError>;

    /// Non-expired opaque access token.
    async fn find_access_token(&self, token: &str) -> Result<AccessToken, AuthError>;

    /// Delete a refresh token only if it belongs to `user_id`.
    async fn revoke_refresh_token_for_user(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<bool, AuthError>;

    /// Delete every refresh token held by `user_id`.
    async fn revoke_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, AuthError>;

    /// Insert or replace the session keyed by `(user_id, client_id)`.
    async fn upsert_session(&self, session: &SessionRecord) -> Result<(), AuthError>;

    /// Physically delete expired codes and tokens.
    async fn purge_expired(&self) -> Result<u64, AuthError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait AuthStore: UserStore + ClientRegistry + GrantStore {}

impl<T: UserStore + ClientRegistry + GrantStore> AuthStore for T {}
