use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::secrets::{SecretError, SecretKey, SecretStore};

/// Secret namespace under which tokens are kept
const TOKEN_NAMESPACE: &str = "oauth-token";

/// An access/refresh token pair with its absolute expiry.
///
/// `expires_at` has whole-second precision so that a token survives the trip
/// through storage unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// Opaque remote user identifier. Older payloads call it `user_id` and
    /// may store it as a number.
    #[serde(alias = "user_id", deserialize_with = "string_or_number")]
    pub subject_id: String,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        subject_id: impl Into<String>,
    ) -> Self {
        let expires_at = DateTime::from_timestamp(expires_at.timestamp(), 0).unwrap_or(expires_at);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            subject_id: subject_id.into(),
        }
    }

    /// Build a token from an exchange response's relative lifetime
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
        subject_id: impl Into<String>,
    ) -> Self {
        Self::new(access_token, refresh_token, Utc::now() + expires_in, subject_id)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

/// Keep a short prefix so log lines can still tell tokens apart
fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}…", prefix)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Persists one service's token in a secret backend.
pub struct TokenCache {
    store: Box<dyn SecretStore>,
    key: SecretKey,
}

impl TokenCache {
    /// `domain` names the service, e.g. `api.pixiv.net`
    pub fn new(store: Box<dyn SecretStore>, domain: &str) -> Self {
        Self {
            store,
            key: SecretKey::new(TOKEN_NAMESPACE, domain),
        }
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    /// Load the stored token.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored payload does
    /// not decode; only an unreachable backend is an error.
    pub fn load(&self) -> Result<Option<Token>, SecretError> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, backend = self.store.name(), "no stored token");
                return Ok(None);
            }
            Err(SecretError::Malformed(reason)) => {
                warn!(key = %self.key, %reason, "unreadable token entry, ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_str::<Token>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored token is corrupt, ignoring");
                Ok(None)
            }
        }
    }

    /// Replace the stored token
    pub fn store(&self, token: &Token) -> Result<(), SecretError> {
        let payload =
            serde_json::to_string(token).map_err(|e| SecretError::Malformed(e.to_string()))?;
        self.store.store(&self.key, &payload)?;
        debug!(key = %self.key, expires_at = %token.expires_at, "token stored");
        Ok(())
    }

    /// Delete the stored token; succeeds when nothing is stored
    pub fn forget(&self) -> Result<(), SecretError> {
        self.store.clear(&self.key)?;
        debug!(key = %self.key, "token forgotten");
        Ok(())
    }
}
