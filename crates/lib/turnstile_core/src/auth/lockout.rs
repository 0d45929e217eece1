//! Brute-force lockout policy.
//!
//! There is no time-based unlock: only a successful credential change or an
//! administrative reset clears the counter.

use super::AuthError;
use crate::models::auth::User;

/// Failed attempts at which an account stops accepting credentials.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Whether an account with `failed_attempts` consecutive failures is locked.
pub fn is_locked(failed_attempts: i32) -> bool {
    failed_attempts >= MAX_FAILED_ATTEMPTS
}

/// Reject a locked user before any credential is looked at.
pub fn ensure_unlocked(user: &User) -> Result<(), AuthError> {
    if is_locked(user.failed_attempts) {
        tracing::warn!(user_id = %user.id, "rejecting attempt on locked account");
        return Err(AuthError::AccountLocked);
    }
    Ok(())
}
