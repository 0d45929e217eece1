//! API server configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Which membership becomes the active organization of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrganizationSelection {
    /// First membership, ordered by organization id.
    #[default]
    FirstMembership,
    /// Membership named by the `X-Organization-Id` header, if the user has it.
    Header,
}

impl FromStr for OrganizationSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::FirstMembership),
            "header" => Ok(Self::Header),
            _ => Err(ConfigError::Invalid {
                var: "ACTIVE_ORGANIZATION",
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Bearer token signing secret.
    pub jwt_secret: String,
    /// Interactive login page the authorization endpoint redirects to.
    pub login_url: String,
    pub organization_selection: OrganizationSelection,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("pg_connection_url", &self.pg_connection_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("login_url", &self.login_url)
            .field("organization_selection", &self.organization_selection)
            .finish()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable              | Default                                |
    /// |-----------------------|----------------------------------------|
    /// | `BIND_ADDR`           | `127.0.0.1:3100`                       |
    /// | `DATABASE_URL`        | `postgres://localhost:5432/turnstile`  |
    /// | `JWT_SECRET`          | required                               |
    /// | `LOGIN_URL`           | `/login`                               |
    /// | `ACTIVE_ORGANIZATION` | `first` (`first` or `header`)          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = get("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let organization_selection = match get("ACTIVE_ORGANIZATION") {
            Some(value) => value.parse()?,
            None => OrganizationSelection::default(),
        };
        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".into()),
            pg_connection_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/turnstile".into()),
            jwt_secret,
            login_url: get("LOGIN_URL").unwrap_or_else(|| "/login".into()),
            organization_selection,
        })
    }
}
