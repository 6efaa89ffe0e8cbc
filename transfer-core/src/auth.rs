//! Authentication seam
//!
//! Credential storage and verification live outside this core. The engine
//! accepts an opaque [`UserId`] and never sees raw credentials; callers
//! resolve credentials through an [`AuthCollaborator`] first.

use crate::types::UserId;
use thiserror::Error;

/// Opaque credential material handed to the collaborator, never inspected
/// by the core.
#[derive(Clone)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Secret token or password; the core never reads this
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of logs
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication failure, surfaced verbatim to the caller
#[derive(Error, Debug)]
pub enum AuthFailure {
    /// Credentials did not resolve to a user
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The collaborator could not be reached
    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

/// External authentication collaborator
pub trait AuthCollaborator: Send + Sync {
    /// Resolve credentials to an opaque user ID
    fn resolve_user(&self, credentials: &Credentials) -> Result<UserId, AuthFailure>;
}
