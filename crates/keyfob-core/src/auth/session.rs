use tracing::{debug, error, info, trace, warn};

use super::{AuthError, CredentialResolver, Token, TokenCache, TokenExchange};

/// Environment variable that forces a refresh even for an unexpired token
pub const FORCE_REFRESH_VAR: &str = "FORCE_TOKEN_REFRESH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Token),
    /// Every credential source was tried and none worked
    LoginFailed,
}

/// Decides how to obtain a usable token for one remote service.
///
/// The ladder is: cached token as-is, then refresh of the cached token, then
/// a password login with the stored credential. The first rung that works
/// is persisted (unless it was the cached token itself) and adopted. When no
/// rung works the session ends in `LoginFailed`.
///
/// A session authenticates at most once and holds no locks; callers that
/// share one must serialize access themselves.
pub struct AuthSession<E: TokenExchange> {
    display_name: String,
    host: String,
    tokens: TokenCache,
    credentials: CredentialResolver,
    exchange: E,
    force_refresh_var: String,
    state: SessionState,
}

impl<E: TokenExchange> AuthSession<E> {
    /// `host` is the credential lookup host (e.g. `pixiv.net`);
    /// `display_name` only appears in log lines and errors.
    pub fn new(
        display_name: impl Into<String>,
        host: impl Into<String>,
        tokens: TokenCache,
        credentials: CredentialResolver,
        exchange: E,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            host: host.into(),
            tokens,
            credentials,
            exchange,
            force_refresh_var: FORCE_REFRESH_VAR.to_string(),
            state: SessionState::Unauthenticated,
        }
    }

    /// Read the force-refresh override from a different variable
    pub fn with_force_refresh_var(mut self, name: impl Into<String>) -> Self {
        self.force_refresh_var = name.into();
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn token(&self) -> Option<&Token> {
        match self.state {
            SessionState::Authenticated(ref token) => Some(token),
            _ => None,
        }
    }

    /// Authenticate, trying each credential source in turn.
    ///
    /// Calling this on an authenticated session is a caller bug: it logs a
    /// warning and returns the current token without touching the network.
    /// A session that already failed keeps failing without retrying.
    pub fn ensure_authenticated(&mut self) -> Result<&Token, AuthError> {
        match self.state {
            SessionState::Authenticated(_) => {
                warn!(service = %self.display_name, "BUG: ensure_authenticated() called twice");
            }
            SessionState::LoginFailed => return Err(self.exhausted()),
            SessionState::Unauthenticated => match self.run_ladder() {
                Ok(token) => {
                    debug!(service = %self.display_name, subject = %token.subject_id, "authenticated");
                    self.state = SessionState::Authenticated(token);
                }
                Err(e) => {
                    if e.is_exhausted() {
                        self.state = SessionState::LoginFailed;
                    }
                    return Err(e);
                }
            },
        }

        match self.state {
            SessionState::Authenticated(ref token) => Ok(token),
            _ => Err(self.exhausted()),
        }
    }

    fn run_ladder(&mut self) -> Result<Token, AuthError> {
        if let Some(cached) = self.tokens.load()? {
            trace!(token = ?cached, "loaded token");

            if self.force_refresh_requested() {
                debug!(var = %self.force_refresh_var, "token refresh forced by environment");
            } else if cached.is_valid() {
                debug!("access token within expiry time, using as-is");
                return Ok(cached);
            } else {
                debug!(expired_at = %cached.expires_at, "access token has expired, renewing");
            }

            match self.exchange.refresh(&cached.refresh_token) {
                Ok(token) => {
                    trace!(token = ?token, "retrieved token");
                    self.persist(&token)?;
                    return Ok(token);
                }
                // The stale token stays in the cache; a failed refresh is
                // assumed transient and the next run may succeed with it.
                Err(e) => warn!(error = %e, "could not refresh access token"),
            }
        }

        match self.credentials.load(&self.host)? {
            Some(credential) => {
                info!(login = %credential.login, "logging in to {}", self.display_name);
                match self.exchange.login(&credential) {
                    Ok(token) => {
                        trace!(token = ?token, "retrieved token");
                        self.persist(&token)?;
                        return Ok(token);
                    }
                    Err(e) => warn!(error = %e, "could not log in using username & password"),
                }
            }
            None => debug!(host = %self.host, "no stored credential to log in with"),
        }

        error!("could not log in to {} (no credentials)", self.display_name);
        Err(self.exhausted())
    }

    fn persist(&self, token: &Token) -> Result<(), AuthError> {
        self.tokens.store(token).map_err(|e| {
            error!(error = %e, "could not persist new token");
            AuthError::Persist(e)
        })
    }

    /// Checked on every evaluation so an operator can flip it mid-process
    fn force_refresh_requested(&self) -> bool {
        env_flag(&self.force_refresh_var)
    }

    fn exhausted(&self) -> AuthError {
        AuthError::AllCredentialSourcesExhausted {
            service: self.display_name.clone(),
        }
    }
}

/// A variable counts as set unless it is absent, empty, or a "false" spelling
fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off"
        ),
        Err(_) => false,
    }
}
