use tracing::{debug, warn};

use crate::secrets::{SecretError, SecretKey, SecretStore, StoredCredential};

/// Looks up operator-provisioned logins, keyed by `<namespace>/<host>`.
pub struct CredentialResolver {
    store: Box<dyn SecretStore>,
    namespace: String,
}

impl CredentialResolver {
    pub fn new(store: Box<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn key_for(&self, host: &str) -> SecretKey {
        SecretKey::new(self.namespace.as_str(), host)
    }

    /// Find the stored login for `host`.
    ///
    /// A miss (or an entry that cannot be decoded) is `Ok(None)`. A backend
    /// that cannot be queried at all is an error, so "nothing configured" and
    /// "keyring daemon down" stay distinguishable.
    pub fn load(&self, host: &str) -> Result<Option<StoredCredential>, SecretError> {
        let key = self.key_for(host);
        match self.store.get_credential(&key) {
            Ok(Some(credential)) => {
                debug!(key = %key, login = %credential.login, "found stored credential");
                Ok(Some(credential))
            }
            Ok(None) => {
                debug!(key = %key, backend = self.store.name(), "no stored credential");
                Ok(None)
            }
            Err(SecretError::Malformed(reason)) => {
                warn!(key = %key, %reason, "ignoring unusable credential entry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{store_credential, MemoryStore, SecretToolStore};

    #[test]
    fn test_load_found_and_missing() {
        let store = MemoryStore::new();
        let resolver = CredentialResolver::new(Box::new(store.clone()), "api");
        assert_eq!(resolver.load("pixiv.net").unwrap(), None);

        let cred = StoredCredential {
            login: "alice".to_string(),
            secret: "hunter2".to_string(),
            account: None,
        };
        store_credential(&store, &resolver.key_for("pixiv.net"), &cred).unwrap();
        assert_eq!(resolver.load("pixiv.net").unwrap(), Some(cred));
    }

    #[test]
    fn test_garbage_entry_is_absent() {
        let store = MemoryStore::new();
        let resolver = CredentialResolver::new(Box::new(store.clone()), "api");
        store.store(&resolver.key_for("pixiv.net"), "hunter2").unwrap();
        assert_eq!(resolver.load("pixiv.net").unwrap(), None);
    }

    #[test]
    fn test_unavailable_backend_propagates() {
        let resolver = CredentialResolver::new(
            Box::new(SecretToolStore::with_program("/nonexistent/secret-tool")),
            "api",
        );
        assert!(matches!(
            resolver.load("pixiv.net"),
            Err(SecretError::BackendUnavailable(_))
        ));
    }
}
