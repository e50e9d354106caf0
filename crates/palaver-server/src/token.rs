//! Bearer-token verification for WebSocket sessions.
//!
//! Token issuance belongs to the HTTP login surface; this side only needs
//! to structurally validate a presented token and extract the user id it
//! references. Tokens have the form `pv1.<uuid>`.

use palaver_core::{AuthError, CredentialVerifier};
use palaver_store::UserId;
use uuid::Uuid;

/// Scheme prefix of a valid session token.
pub const TOKEN_PREFIX: &str = "pv1.";

/// Verifier for `pv1.<uuid>` bearer tokens.
#[derive(Debug, Default)]
pub struct BearerTokenVerifier;

impl BearerTokenVerifier {
    /// Create a verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render the token for a user id (used by ops tooling and tests).
    #[must_use]
    pub fn issue(user: UserId) -> String {
        format!("{TOKEN_PREFIX}{}", user.as_uuid())
    }
}

impl CredentialVerifier for BearerTokenVerifier {
    fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::InvalidCredential("No token provided"));
        }
        let body = credential
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(AuthError::InvalidCredential("Unrecognized token scheme"))?;
        Uuid::parse_str(body)
            .map(UserId::from)
            .map_err(|_| AuthError::InvalidCredential("Invalid token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_verify_roundtrip() {
        let user = UserId::generate();
        let token = BearerTokenVerifier::issue(user);
        assert_eq!(BearerTokenVerifier::new().verify(&token).unwrap(), user);
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let verifier = BearerTokenVerifier::new();
        assert!(verifier.verify("").is_err());
        assert!(verifier.verify("pv2.not-the-scheme").is_err());
        assert!(verifier.verify("pv1.not-a-uuid").is_err());
    }
}
