//! PKCE (RFC 7636) challenge handling.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AuthError;
use crate::models::auth::{ChallengeMethod, PkceChallenge};

/// Compute the S256 code challenge for a verifier.
pub fn compute_s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Build the challenge to bind to a new code from raw request parameters.
///
/// A challenge without a method is normalised to `plain`. A method without a
/// challenge, or an unknown method, is rejected.
pub fn parse_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<Option<PkceChallenge>, AuthError> {
    let challenge = challenge.filter(|c| !c.is_empty());
    let method = method.filter(|m| !m.is_empty());
    match (challenge, method) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(AuthError::Validation(
            "code_challenge_method given without code_challenge".into(),
        )),
        (Some(challenge), method) => {
            let method = match method {
                None => ChallengeMethod::Plain,
                Some(m) => ChallengeMethod::parse(m).ok_or_else(|| {
                    AuthError::Validation(format!("unsupported code_challenge_method '{m}'"))
                })?,
            };
            Ok(Some(PkceChallenge {
                challenge: challenge.to_string(),
                method,
            }))
        }
    }
}

/// Check a presented verifier against the challenge bound at issuance.
///
/// No challenge accepts anything, including no verifier.
pub fn verify(challenge: Option<&PkceChallenge>, verifier: Option<&str>) -> bool {
    let Some(challenge) = challenge else {
        return true;
    };
    let Some(verifier) = verifier else {
        return false;
    };
    let expected = challenge.challenge.as_bytes();
    match challenge.method {
        ChallengeMethod::S256 => {
            let computed = compute_s256_challenge(verifier);
            computed.as_bytes().ct_eq(expected).into()
        }
        ChallengeMethod::Plain => verifier.as_bytes().ct_eq(expected).into(),
    }
}
