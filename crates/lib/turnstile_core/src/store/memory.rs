//! In-process store.
//!
//! Gives the same at-most-once guarantees as `PgStore`: code exchange and
//! refresh rotation insert the new pair first, then remove the consumed entry
//! with a conditional remove, undoing the insert if another caller won.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ClientRegistry, GrantStore, UserStore};
use crate::auth::AuthError;
use crate::auth::api_keys::hash_api_key;
use crate::models::auth::{
    AccessToken, AuthorizationCode, Client, Membership, RefreshToken, SessionRecord, TokenPair,
    User,
};

/// `DashMap`-backed store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    memberships: DashMap<String, Vec<Membership>>,
    clients: DashMap<String, Client>,
    /// key hash → (user id, client id)
    api_keys: DashMap<String, (String, Option<String>)>,
    codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<String, AccessToken>,
    refresh_tokens: DashMap<String, RefreshToken>,
    sessions: DashMap<(String, String), SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    pub fn add_membership(&self, user_id: &str, membership: Membership) {
        let mut entry = self.memberships.entry(user_id.to_string()).or_default();
        entry.push(membership);
        entry.sort_by(|a, b| a.organization_id.cmp(&b.organization_id));
    }

    pub fn insert_api_key(&self, key: &str, user_id: &str, client_id: Option<&str>) {
        self.api_keys.insert(
            hash_api_key(key),
            (user_id.to_string(), client_id.map(str::to_string)),
        );
    }

    /// Snapshot of a user, including credential state.
    pub fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.value().clone())
    }

    pub fn session(&self, user_id: &str, client_id: Option<&str>) -> Option<SessionRecord> {
        self.sessions
            .get(&(user_id.to_string(), client_id.unwrap_or_default().to_string()))
            .map(|s| s.value().clone())
    }

    /// Live refresh tokens held by `(client_id, user_id)`.
    pub fn refresh_tokens_for(&self, client_id: &str, user_id: &str) -> Vec<RefreshToken> {
        self.refresh_tokens
            .iter()
            .filter(|t| t.client_id == client_id && t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect()
    }

    pub fn access_token_count(&self) -> usize {
        self.access_tokens.len()
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    fn undo_pair(&self, pair: &TokenPair) {
        self.access_tokens.remove(&pair.access.token);
        self.refresh_tokens.remove(&pair.refresh.token);
    }

    fn insert_pair(&self, pair: &TokenPair) -> Result<(), AuthError> {
        if self.access_tokens.contains_key(&pair.access.token)
            || self.refresh_tokens.contains_key(&pair.refresh.token)
        {
            return Err(AuthError::Conflict("token already exists".into()));
        }
        self.access_tokens
            .insert(pair.access.token.clone(), pair.access.clone());
        self.refresh_tokens
            .insert(pair.refresh.token.clone(), pair.refresh.clone());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, AuthError> {
        self.user(user_id).ok_or(AuthError::NotFound("user"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, AuthError> {
        let email = email.to_lowercase();
        self.users
            .iter()
            .find(|u| u.email.to_lowercase() == email)
            .map(|u| u.value().clone())
            .ok_or(AuthError::NotFound("user"))
    }

    async fn find_user_by_api_key(
        &self,
        key: &str,
    ) -> Result<(User, Option<String>), AuthError> {
        let (user_id, client_id) = self
            .api_keys
            .get(&hash_api_key(key))
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::NotFound("api key"))?;
        let user = self.user(&user_id).ok_or(AuthError::NotFound("api key"))?;
        Ok((user, client_id))
    }

    async fn memberships(&self, user_id: &str) -> Result<Vec<Membership>, AuthError> {
        Ok(self
            .memberships
            .get(user_id)
            .map(|m| m.value().clone())
            .unwrap_or_default())
    }

    async fn record_failed_attempt(&self, user_id: &str) -> Result<i32, AuthError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or(AuthError::NotFound("user"))?;
        user.failed_attempts += 1;
        Ok(user.failed_attempts)
    }

    async fn record_successful_login(
        &self,
        user_id: &str,
        _ip_address: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or(AuthError::NotFound("user"))?;
        user.failed_attempts = 0;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or(AuthError::NotFound("user"))?;
        user.password_hash = password_hash.to_string();
        user.failed_attempts = 0;
        Ok(())
    }
}

#[async_trait]
impl ClientRegistry for MemoryStore {
    async fn find_client(&self, client_id: &str) -> Result<Client, AuthError> {
        self.clients
            .get(client_id)
            .map(|c| c.value().clone())
            .ok_or(AuthError::NotFound("client"))
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => {
                Err(AuthError::Conflict("authorization code already exists".into()))
            }
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn find_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let now = Utc::now();
        self.codes
            .get(code)
            .filter(|c| c.client_id == client_id && !c.is_expired(now))
            .map(|c| c.value().clone())
            .ok_or(AuthError::NotFound("authorization code"))
    }

    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
        pair: &TokenPair,
    ) -> Result<(), AuthError> {
        self.insert_pair(pair)?;
        let now = Utc::now();
        let consumed = self.codes.remove_if(&code.code, |_, stored| {
            stored.client_id == code.client_id && !stored.is_expired(now)
        });
        if consumed.is_none() {
            self.undo_pair(pair);
            return Err(AuthError::NotFound("authorization code"));
        }
        Ok(())
    }

    async fn insert_token_pair(&self, pair: &TokenPair) -> Result<(), AuthError> {
        self.insert_pair(pair)
    }

    async fn find_refresh_token(
        &self,
        client_id: &str,
        token: &str,
    ) -> Result<RefreshToken, AuthError> {
        let now = Utc::now();
        self.refresh_tokens
            .get(token)
            .filter(|t| t.client_id == client_id && !t.is_expired(now))
            .map(|t| t.value().clone())
            .ok_or(AuthError::NotFound("refresh token"))
    }

    async fn rotate_refresh_token(
        &self,
        old: &RefreshToken,
        pair: &TokenPair,
    ) -> Result<(), AuthError> {
        self.insert_pair(pair)?;
        let now = Utc::now();
        let consumed = self.refresh_tokens.remove_if(&old.token, |_, stored| {
            stored.client_id == old.client_id && !stored.is_expired(now)
        });
        if consumed.is_none() {
            self.undo_pair(pair);
            return Err(AuthError::NotFound("refresh token"));
        }
        Ok(())
    }

    async fn find_access_token(&self, token: &str) -> Result<AccessToken, AuthError> {
        let now = Utc::now();
        self.access_tokens
            .get(token)
            .filter(|t| t.expires_at > now)
            .map(|t| t.value().clone())
            .ok_or(AuthError::NotFound("access token"))
    }

    async fn revoke_refresh_token_for_user(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        Ok(self
            .refresh_tokens
            .remove_if(token, |_, t| t.user_id == user_id)
            .is_some())
    }

    async fn revoke_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, AuthError> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - self.refresh_tokens.len()) as u64)
    }

    async fn upsert_session(&self, session: &SessionRecord) -> Result<(), AuthError> {
        let key = (
            session.user_id.clone(),
            session.client_id.clone().unwrap_or_default(),
        );
        self.sessions.insert(key, session.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        let now = Utc::now();
        let before = self.codes.len() + self.access_tokens.len() + self.refresh_tokens.len();
        self.codes.retain(|_, c| !c.is_expired(now));
        self.access_tokens.retain(|_, t| t.expires_at > now);
        self.refresh_tokens.retain(|_, t| !t.is_expired(now));
        let after = self.codes.len() + self.access_tokens.len() + self.refresh_tokens.len();
        Ok((before - after) as u64)
    }
}
