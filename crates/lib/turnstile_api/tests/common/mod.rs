//! Shared fixtures: an in-memory store seeded with users and clients, and
//! helpers that drive the router with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use tower::ServiceExt;
use turnstile_api::config::{ApiConfig, OrganizationSelection};
use turnstile_api::{AppState, router};
use turnstile_core::models::auth::{Client, Membership, User};
use turnstile_core::store::{AuthStore, MemoryStore};
use url::form_urlencoded;

pub const SIGNING_SECRET: &str = "integration-test-signing-secret";
pub const ALICE_PASSWORD: &str = "correct horse battery";
pub const BOB_PASSWORD: &str = "tr0ub4dor&3";
pub const APP_SECRET: &str = "s3cr3t";
pub const APP_REDIRECT: &str = "https://app-1.example.com/callback";
pub const API_KEY: &str = "tsk_alice_static_key";

/// Argon2id hash with small parameters; verification reads parameters from
/// the hash string so these verify like production hashes.
pub fn cheap_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, Some(32)).unwrap();
    let salt = SaltString::encode_b64(b"turnstile-tests!").unwrap();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

pub fn user(id: &str, email: &str, password: &str) -> User {
    User {
        id: id.into(),
        email: email.into(),
        password_hash: cheap_hash(password),
        role: "user".into(),
        failed_attempts: 0,
    }
}

/// Seeds:
/// - `u1` alice, member of `org-a` and `org-b`, owns `app-1`, has an API key
/// - `u2` bob, no memberships
/// - `u3` carol, already locked out
/// - `owner`, owns the public client `app-pub`
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(user("u1", "alice@example.com", ALICE_PASSWORD));
    store.insert_user(user("u2", "bob@example.com", BOB_PASSWORD));
    store.insert_user(User {
        failed_attempts: 5,
        ..user("u3", "carol@example.com", "carol-password")
    });
    store.insert_user(user("owner", "owner@example.com", "owner-password"));

    for org in ["org-b", "org-a"] {
        store.add_membership(
            "u1",
            Membership {
                organization_id: org.into(),
                role: "member".into(),
            },
        );
    }

    store.insert_client(Client {
        client_id: "app-1".into(),
        secret_hash: cheap_hash(APP_SECRET),
        is_public: false,
        redirect_url: APP_REDIRECT.into(),
        owner_user_id: "u1".into(),
    });
    store.insert_client(Client {
        client_id: "app-pub".into(),
        secret_hash: String::new(),
        is_public: true,
        redirect_url: "https://public.example.com/cb".into(),
        owner_user_id: "owner".into(),
    });
    store.insert_api_key(API_KEY, "u1", Some("app-1"));
    store
}

pub fn config(selection: OrganizationSelection) -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: "postgres://unused".into(),
        jwt_secret: SIGNING_SECRET.into(),
        login_url: "/login".into(),
        organization_selection: selection,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub app: Router,
}

pub fn harness() -> Harness {
    harness_with(OrganizationSelection::FirstMembership)
}

pub fn harness_with(selection: OrganizationSelection) -> Harness {
    let store = Arc::new(seeded_store());
    let shared: Arc<dyn AuthStore> = store.clone();
    let state = AppState::new(shared, config(selection)).expect("state");
    Harness {
        store,
        app: router(state),
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl Reply {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header")
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("parse JSON")
    };
    Reply {
        status,
        headers,
        json,
    }
}

pub async fn post_token(app: &Router, fields: &[(&str, &str)]) -> Reply {
    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    let req = Request::builder()
        .method("POST")
        .uri("/oauth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    send(app, req).await
}

pub async fn post_json(
    app: &Router,
    path: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Reply {
    let mut req = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, req.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn get(app: &Router, path: &str, headers: &[(&str, &str)]) -> Reply {
    let mut req = Request::builder().uri(path);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    send(app, req.body(Body::empty()).unwrap()).await
}

pub async fn login(app: &Router, email: &str, password: &str) -> Reply {
    post_json(
        app,
        "/auth/login",
        None,
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}
