//! Credential verification over two hash schemes.
//!
//! New passwords are written as Argon2id PHC strings. Hashes migrated from the
//! previous system are base64 blobs: `marker(1) || salt(16) || key(32)`, where
//! `key = PBKDF2-HMAC-SHA256(password, salt, 10_000)`. Legacy hashes verify but
//! are only replaced when the user changes their password.

use std::sync::LazyLock;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;

/// Scheme tag of the current hash format.
const ARGON2_PREFIX: &str = "$argon2id$";

/// Argon2id memory cost in KiB (64 MiB).
#[cfg_attr(test, allow(dead_code))]
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
#[cfg_attr(test, allow(dead_code))]
const ARGON2_ITERATIONS: u32 = 1;
#[cfg_attr(test, allow(dead_code))]
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// First byte of a legacy blob.
const LEGACY_MARKER: u8 = 0x00;
const LEGACY_KEY_LEN: usize = 32;
const LEGACY_BLOB_LEN: usize = 1 + SALT_LEN + LEGACY_KEY_LEN;
const LEGACY_ROUNDS: u32 = 10_000;

/// Hash scheme recognised from a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    LegacyPbkdf2,
    Argon2id,
}

/// Sniff the scheme of a stored hash. `None` means the hash is unusable.
pub fn scheme_of(stored: &str) -> Option<HashScheme> {
    if stored.starts_with(ARGON2_PREFIX) {
        return Some(HashScheme::Argon2id);
    }
    match STANDARD.decode(stored) {
        Ok(blob) if blob.len() == LEGACY_BLOB_LEN && blob[0] == LEGACY_MARKER => {
            Some(HashScheme::LegacyPbkdf2)
        }
        _ => None,
    }
}

fn argon2_instance() -> Result<Argon2<'static>, AuthError> {
    #[cfg(test)]
    let params = Params::new(1024, 1, 1, Some(ARGON2_OUTPUT_LEN));
    #[cfg(not(test))]
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(ARGON2_OUTPUT_LEN),
    );
    let params = params.map_err(|e| AuthError::Internal(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with the current scheme.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| AuthError::Internal(format!("argon2 salt: {e}")))?;
    let hash = argon2_instance()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("argon2 hash: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash of either scheme.
///
/// Never errors: unknown, empty, or malformed hashes fail closed. Derived keys
/// are compared in constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match scheme_of(stored) {
        Some(HashScheme::Argon2id) => verify_argon2(password, stored),
        Some(HashScheme::LegacyPbkdf2) => verify_legacy(password, stored),
        None => false,
    }
}

/// Current-scheme hash that no account uses. Unknown accounts verify against
/// it so they cost the same as known ones.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("turnstile-unknown-account").ok());

/// Spend one current-scheme verification on `password` and reject it.
pub fn verify_dummy(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_argon2(password, hash);
    }
    false
}

fn verify_argon2(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    // Parameters come from the stored string, not from the instance.
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn verify_legacy(password: &str, stored: &str) -> bool {
    let Ok(blob) = STANDARD.decode(stored) else {
        return false;
    };
    if blob.len() != LEGACY_BLOB_LEN || blob[0] != LEGACY_MARKER {
        return false;
    }
    let salt = &blob[1..1 + SALT_LEN];
    let expected = &blob[1 + SALT_LEN..];
    let mut derived = [0u8; LEGACY_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, LEGACY_ROUNDS, &mut derived);
    derived.ct_eq(expected).into()
}
