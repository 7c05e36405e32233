//! Secret storage backends.
//!
//! Every backend implements [`SecretStore`]: a durable key/value store for
//! secrets addressed by a [`SecretKey`]. Backends available:
//! - `KeyringStore`: OS keychain via the `keyring` crate
//! - `SecretToolStore`: libsecret through the `secret-tool` command
//! - `NetrcStore`: read-only `~/.netrc` lookups
//! - `SealedFileStore`: a passphrase-sealed file on disk
//! - `MemoryStore`: process-local map, used by tests and ephemeral runs

pub mod keyring;
pub mod memory;
pub mod netrc;
pub mod sealed;
pub mod secret_tool;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::keyring::KeyringStore;
pub use memory::MemoryStore;
pub use netrc::NetrcStore;
pub use sealed::SealedFileStore;
pub use secret_tool::SecretToolStore;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Secret backend {0} is read-only")]
    ReadOnly(&'static str),

    #[error("Malformed secret data: {0}")]
    Malformed(String),
}

/// Identifies one secret: a namespace (e.g. `api`, `oauth-token`), a host,
/// and optionally the login it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretKey {
    pub namespace: String,
    pub host: String,
    pub login: Option<String>,
}

impl SecretKey {
    pub fn new(namespace: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            host: host.into(),
            login: None,
        }
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Composite `namespace/host` name, as used for netrc machines and keyring services
    pub fn machine(&self) -> String {
        format!("{}/{}", self.namespace, self.host)
    }

    /// Attribute set identifying this secret in libsecret
    pub fn attributes(&self) -> BTreeMap<&'static str, &str> {
        let mut attrs = BTreeMap::new();
        attrs.insert("service", self.namespace.as_str());
        attrs.insert("host", self.host.as_str());
        if let Some(ref login) = self.login {
            attrs.insert("login", login.as_str());
        }
        attrs
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.login {
            Some(ref login) => write!(f, "{}#{}", self.machine(), login),
            None => f.write_str(&self.machine()),
        }
    }
}

/// A static login provisioned by the operator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub login: String,
    #[serde(rename = "password")]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("login", &self.login)
            .field("secret", &"<redacted>")
            .field("account", &self.account)
            .finish()
    }
}

/// Durable key/value storage for secrets.
///
/// Lookups return `Ok(None)` on a miss; `Err` is reserved for a backend that
/// could not answer at all.
pub trait SecretStore {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Write `value` under `key`, replacing any previous value
    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError>;

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError>;

    /// Delete the secret; deleting a missing secret succeeds
    fn clear(&self, key: &SecretKey) -> Result<(), SecretError>;

    /// Look up a login/password pair. The default decodes a JSON payload
    /// written by [`SecretStore::store`]; backends with native structure
    /// (netrc) override it.
    fn get_credential(&self, key: &SecretKey) -> Result<Option<StoredCredential>, SecretError> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SecretError::Malformed(format!("credential for {}: {}", key, e))),
            None => Ok(None),
        }
    }
}

impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError> {
        (**self).store(key, value)
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        (**self).get(key)
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        (**self).clear(key)
    }

    fn get_credential(&self, key: &SecretKey) -> Result<Option<StoredCredential>, SecretError> {
        (**self).get_credential(key)
    }
}

/// Write a credential in the JSON layout read back by the default
/// [`SecretStore::get_credential`].
pub fn store_credential(
    store: &dyn SecretStore,
    key: &SecretKey,
    credential: &StoredCredential,
) -> Result<(), SecretError> {
    let payload = serde_json::to_string(credential)
        .map_err(|e| SecretError::Malformed(e.to_string()))?;
    store.store(key, &payload)
}
