//! Session authentication.
//!
//! Token issuance and signature verification belong to the HTTP surface;
//! the core only consumes a [`CredentialVerifier`] that structurally
//! validates an opaque bearer credential and resolves it to a user id.
//! [`Authenticator`] completes the contract by confirming the user still
//! exists. Pure query, no side effects, no retry.

use palaver_store::{ChatStore, StoreError, User, UserId};
use std::sync::Arc;
use thiserror::Error;

/// Authentication failures, terminal for the attempt. The connection
/// stays open and the client may retry.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential is malformed, expired, or unverifiable.
    #[error("Invalid credential: {0}")]
    InvalidCredential(&'static str),

    /// The credential is well-formed but no matching user exists.
    #[error("User not found")]
    UnknownUser,

    /// The store could not be consulted.
    #[error("Credential lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Resolves an opaque bearer credential to a user id.
///
/// Implementations perform structural validation only; existence of the
/// user is checked by [`Authenticator`].
pub trait CredentialVerifier: Send + Sync {
    /// Validate the credential and extract the user id it references.
    fn verify(&self, credential: &str) -> Result<UserId, AuthError>;
}

/// The session authenticator: verifier plus store-existence check.
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
    store: Arc<dyn ChatStore>,
}

impl Authenticator {
    /// Create an authenticator.
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialVerifier>, store: Arc<dyn ChatStore>) -> Self {
        Self { verifier, store }
    }

    /// Resolve a credential to the user it identifies.
    ///
    /// # Errors
    ///
    /// `InvalidCredential` when the credential fails structural
    /// validation, `UnknownUser` when it references no existing user.
    pub async fn authenticate(&self, credential: &str) -> Result<User, AuthError> {
        let user_id = self.verifier.verify(credential)?;
        self.store
            .user(user_id)
            .await?
            .ok_or(AuthError::UnknownUser)
    }
}
