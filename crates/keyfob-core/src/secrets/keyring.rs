use ::keyring::Entry;
use tracing::trace;

use super::{SecretError, SecretKey, SecretStore};

/// Keychain service prefix; the full service name is `keyfob:<namespace>/<host>`
const SERVICE_PREFIX: &str = "keyfob";

/// Keychain user used when a key carries no login
const DEFAULT_USER: &str = "default";

/// OS keychain backend (macOS Keychain, Windows Credential Manager, Linux keyutils)
#[derive(Debug, Clone, Default)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(key: &SecretKey) -> Result<Entry, SecretError> {
        let service = format!("{}:{}", SERVICE_PREFIX, key.machine());
        let user = key.login.as_deref().unwrap_or(DEFAULT_USER);
        Entry::new(&service, user).map_err(map_keyring_error)
    }
}

fn map_keyring_error(e: ::keyring::Error) -> SecretError {
    match e {
        ::keyring::Error::BadEncoding(_) => {
            SecretError::Malformed("keychain entry is not valid UTF-8".to_string())
        }
        other => SecretError::BackendUnavailable(other.to_string()),
    }
}

impl SecretStore for KeyringStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError> {
        trace!(key = %key, "keyring store");
        Self::entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        trace!(key = %key, "keyring lookup");
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        trace!(key = %key, "keyring clear");
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}
