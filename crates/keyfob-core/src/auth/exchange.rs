use thiserror::Error;

use super::Token;
use crate::secrets::StoredCredential;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Token exchange rejected: {0}")]
    Rejected(String),

    #[error("Token exchange transport error: {0}")]
    Transport(String),

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// The two grants an `AuthSession` needs from the remote service.
pub trait TokenExchange {
    /// Trade a refresh token for a new token pair
    fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError>;

    /// Trade a username/password for an initial token pair
    fn login(&self, credential: &StoredCredential) -> Result<Token, ExchangeError>;
}

impl<T: TokenExchange + ?Sized> TokenExchange for Box<T> {
    fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError> {
        (**self).refresh(refresh_token)
    }

    fn login(&self, credential: &StoredCredential) -> Result<Token, ExchangeError> {
        (**self).login(credential)
    }
}
