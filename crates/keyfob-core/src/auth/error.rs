use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Secret backend error: {0}")]
    Secret(#[from] SecretError),

    #[error("Could not persist token: {0}")]
    Persist(#[source] SecretError),

    #[error("Could not log in to {service} (no credentials)")]
    AllCredentialSourcesExhausted { service: String },
}

impl AuthError {
    /// True when the session can never become authenticated
    pub fn is_exhausted(&self) -> bool {
        matches!(self, AuthError::AllCredentialSourcesExhausted { .. })
    }
}
