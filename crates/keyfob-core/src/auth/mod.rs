//! Authentication module: the credential lifecycle for one remote service.
//!
//! This module provides:
//! - `Token` / `TokenCache`: a token pair with expiry, persisted in a secret backend
//! - `CredentialResolver`: operator-provisioned login/password lookup
//! - `TokenExchange`: the refresh and password grants of the remote service
//! - `AuthSession`: the state machine choosing between reuse, refresh and login

pub mod credentials;
pub mod error;
pub mod exchange;
pub mod session;
pub mod token;

pub use credentials::CredentialResolver;
pub use error::AuthError;
pub use exchange::{ExchangeError, TokenExchange};
pub use session::{AuthSession, SessionState, FORCE_REFRESH_VAR};
pub use token::{Token, TokenCache};
