//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use super::{ClientRegistry, GrantStore, UserStore};
use crate::auth::AuthError;
use crate::auth::api_keys::hash_api_key;
use crate::models::auth::{
    AccessToken, AuthorizationCode, ChallengeMethod, Client, Membership, PkceChallenge,
    RefreshToken, SessionRecord, TokenPair, User,
};

type UserRow = (String, String, String, String, i32);

type CodeRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type TokenRow = (String, String, String, DateTime<Utc>, DateTime<Utc>);

const USER_COLUMNS: &str = "id, email, password_hash, role, failed_attempts";

fn user_from_row((id, email, password_hash, role, failed_attempts): UserRow) -> User {
    User {
        id,
        email,
        password_hash,
        role,
        failed_attempts,
    }
}

fn code_from_row(row: CodeRow) -> Result<AuthorizationCode, AuthError> {
    let (code, client_id, user_id, challenge, method, issued_at, expires_at) = row;
    let pkce = match challenge {
        None => None,
        Some(challenge) => {
            let method = match method.as_deref() {
                None | Some("") => ChallengeMethod::Plain,
                Some(m) => match ChallengeMethod::parse(m) {
                    Some(method) => method,
                    None => {
                        warn!(client_id = %client_id, "stored code has unknown challenge method");
                        return Err(AuthError::NotFound("authorization code"));
                    }
                },
            };
            Some(PkceChallenge { challenge, method })
        }
    };
    Ok(AuthorizationCode {
        code,
        client_id,
        user_id,
        pkce,
        issued_at,
        expires_at,
    })
}

fn refresh_from_row((token, client_id, user_id, issued_at, expires_at): TokenRow) -> RefreshToken {
    RefreshToken {
        token,
        client_id,
        user_id,
        issued_at,
        expires_at,
    }
}

fn conflict_or_storage(e: sqlx::Error, what: &str) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AuthError::Conflict(format!("{what} already exists"))
        }
        _ => AuthError::Storage(e),
    }
}

/// Insert both halves of a pair on an open connection or transaction.
async fn insert_pair(conn: &mut PgConnection, pair: &TokenPair) -> Result<(), AuthError> {
    let access = &pair.access;
    sqlx::query(
        "INSERT INTO access_tokens (token, client_id, user_id, ip_address, issued_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&access.token)
    .bind(&access.client_id)
    .bind(&access.user_id)
    .bind(&access.ip_address)
    .bind(access.issued_at)
    .bind(access.expires_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_or_storage(e, "access token"))?;

    let refresh = &pair.refresh;
    sqlx::query(
        "INSERT INTO refresh_tokens (token, client_id, user_id, issued_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&refresh.token)
    .bind(&refresh.client_id)
    .bind(&refresh.user_id)
    .bind(refresh.issued_at)
    .bind(refresh.expires_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_or_storage(e, "refresh token"))?;
    Ok(())
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).ok_or(AuthError::NotFound("user"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).ok_or(AuthError::NotFound("user"))
    }

    async fn find_user_by_api_key(
        &self,
        key: &str,
    ) -> Result<(User, Option<String>), AuthError> {
        let row = sqlx::query_as::<_, (String, String, String, String, i32, Option<String>)>(
            "SELECT u.id, u.email, u.password_hash, u.role, u.failed_attempts, k.client_id \
             FROM auth_keys k \
             JOIN users u ON u.id = k.user_id \
             WHERE k.key_hash = $1",
        )
        .bind(hash_api_key(key))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(id, email, password_hash, role, failed_attempts, client_id)| {
            (
                user_from_row((id, email, password_hash, role, failed_attempts)),
                client_id,
            )
        })
        .ok_or(AuthError::NotFound("api key"))
    }

    async fn memberships(&self, user_id: &str) -> Result<Vec<Membership>, AuthError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT organization_id, role FROM organization_members \
             WHERE user_id = $1 ORDER BY organization_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(organization_id, role)| Membership {
                organization_id,
                role,
            })
            .collect())
    }

    async fn record_failed_attempt(&self, user_id: &str) -> Result<i32, AuthError> {
        let count = sqlx::query_scalar::<_, i32>(
            "UPDATE users SET failed_attempts = failed_attempts + 1 \
             WHERE id = $1 RETURNING failed_attempts",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        count.ok_or(AuthError::NotFound("user"))
    }

    async fn record_successful_login(
        &self,
        user_id: &str,
        ip_address: Option<&str>,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET failed_attempts = 0, last_login_at = now(), last_login_ip = $2 \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(ip_address)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("user"));
        }
        Ok(())
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, failed_attempts = 0 WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("user"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientRegistry for PgStore {
    async fn find_client(&self, client_id: &str) -> Result<Client, AuthError> {
        let row = sqlx::query_as::<_, (String, String, bool, String, String)>(
            "SELECT client_id, secret_hash, is_public, redirect_url, owner_user_id \
             FROM applications WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(
            |(client_id, secret_hash, is_public, redirect_url, owner_user_id)| Client {
                client_id,
                secret_hash,
                is_public,
                redirect_url,
                owner_user_id,
            },
        )
        .ok_or(AuthError::NotFound("client"))
    }
}

#[async_trait]
impl GrantStore for PgStore {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO authorization_codes \
             (code, client_id, user_id, code_challenge, code_challenge_method, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(code.pkce.as_ref().map(|p| p.challenge.as_str()))
        .bind(code.pkce.as_ref().map(|p| p.method.as_str()))
        .bind(code.issued_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_storage(e, "authorization code"))?;
        Ok(())
    }

    async fn find_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let row = sqlx::query_as::<_, CodeRow>(
            "SELECT code, client_id, user_id, code_challenge, code_challenge_method, \
                    issued_at, expires_at \
             FROM authorization_codes \
             WHERE code = $1 AND client_id = $2 AND expires_at > now()",
        )
        .bind(code)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => code_from_row(row),
            None => Err(AuthError::NotFound("authorization code")),
        }
    }

    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
        pair: &TokenPair,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;
        insert_pair(&mut tx, pair).await?;
        // A concurrent exchange blocks on the row lock here and then sees
        // zero rows once the winner commits.
        let deleted = sqlx::query(
            "DELETE FROM authorization_codes \
             WHERE code = $1 AND client_id = $2 AND expires_at > now()",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Err(AuthError::NotFound("authorization code"));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_token_pair(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;
        insert_pair(&mut tx, pair).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        client_id: &str,
        token: &str,
    ) -> Result<RefreshToken, AuthError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token, client_id, user_id, issued_at, expires_at \
             FROM refresh_tokens \
             WHERE token = $1 AND client_id = $2 AND expires_at > now()",
        )
        .bind(token)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(refresh_from_row)
            .ok_or(AuthError::NotFound("refresh token"))
    }

    async fn rotate_refresh_token(
        &self,
        old: &RefreshToken,
        pair: &TokenPair,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;
        insert_pair(&mut tx, pair).await?;
        let deleted = sqlx::query(
            "DELETE FROM refresh_tokens \
             WHERE token = $1 AND client_id = $2 AND expires_at > now()",
        )
        .bind(&old.token)
        .bind(&old.client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Err(AuthError::NotFound("refresh token"));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_access_token(&self, token: &str) -> Result<AccessToken, AuthError> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                Option<String>,
                DateTime<Utc>,
                DateTime<Utc>,
            ),
        >(
            "SELECT token, client_id, user_id, ip_address, issued_at, expires_at \
             FROM access_tokens \
             WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(
            |(token, client_id, user_id, ip_address, issued_at, expires_at)| AccessToken {
                token,
                client_id,
                user_id,
                ip_address,
                issued_at,
                expires_at,
            },
        )
        .ok_or(AuthError::NotFound("access token"))
    }

    async fn revoke_refresh_token_for_user(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1 AND user_id = $2")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn revoke_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, AuthError> {
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn upsert_session(&self, session: &SessionRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO sessions (user_id, client_id, last_ip, provider, last_seen) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, client_id) DO UPDATE \
             SET last_ip = EXCLUDED.last_ip, \
                 provider = EXCLUDED.provider, \
                 last_seen = EXCLUDED.last_seen",
        )
        .bind(&session.user_id)
        .bind(session.client_id.as_deref().unwrap_or_default())
        .bind(&session.last_ip)
        .bind(session.provider.as_str())
        .bind(session.last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        let mut purged = 0;
        for table in ["authorization_codes", "access_tokens", "refresh_tokens"] {
            purged += sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= now()"))
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(purged)
    }
}
