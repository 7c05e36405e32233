//! Application configuration management.
//!
//! Configuration is stored at `~/.config/keyfob/config.json` and covers the
//! OAuth client registration, which secret backends hold tokens and logins,
//! and memoization capacity. A missing file means defaults. OAuth client
//! credentials can also come from `KEYFOB_CLIENT_ID` / `KEYFOB_CLIENT_SECRET`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::FORCE_REFRESH_VAR;
use crate::cache::DEFAULT_CAPACITY;
use crate::secrets::{
    KeyringStore, MemoryStore, NetrcStore, SealedFileStore, SecretStore, SecretToolStore,
};

/// Application name used for config directory paths
pub const APP_NAME: &str = "keyfob";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default sealed secrets file name, inside the config directory
const SEALED_FILE: &str = "secrets.sealed";

pub const CLIENT_ID_ENV: &str = "KEYFOB_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "KEYFOB_CLIENT_SECRET";

const DEFAULT_AUTH_URL: &str = "https://oauth.secure.pixiv.net/auth/token";
const DEFAULT_API_URL: &str = "https://public-api.secure.pixiv.net";

/// OAuth client registration, injected into the token exchange.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub api_url: String,
    /// Whether the token endpoint accepts our own `client_secret`. When off,
    /// the secret is never sent.
    pub custom_client_secret: bool,
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            custom_client_secret: true,
        }
    }
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .field("custom_client_secret", &self.custom_client_secret)
            .finish()
    }
}

/// Where secrets of one kind are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Keyring,
    SecretTool,
    Netrc,
    Sealed,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyring" => Ok(Self::Keyring),
            "secret-tool" => Ok(Self::SecretTool),
            "netrc" => Ok(Self::Netrc),
            "sealed" => Ok(Self::Sealed),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown secret backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: OAuthClientConfig,
    pub token_backend: BackendKind,
    pub credential_backend: BackendKind,
    /// Service name tokens are filed under
    pub token_domain: String,
    pub credential_namespace: String,
    pub credential_host: String,
    pub display_name: String,
    pub memo_capacity: usize,
    pub force_refresh_var: String,
    pub sealed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: OAuthClientConfig::default(),
            token_backend: BackendKind::Keyring,
            credential_backend: BackendKind::Netrc,
            token_domain: "api.pixiv.net".to_string(),
            credential_namespace: "api".to_string(),
            credential_host: "pixiv.net".to_string(),
            display_name: "Pixiv API".to_string(),
            memo_capacity: DEFAULT_CAPACITY,
            force_refresh_var: FORCE_REFRESH_VAR.to_string(),
            sealed_path: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Take OAuth client credentials from the environment when set
    pub fn apply_env(&mut self) {
        if let Ok(id) = std::env::var(CLIENT_ID_ENV) {
            if !id.is_empty() {
                self.client.client_id = id;
            }
        }
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            if !secret.is_empty() {
                self.client.client_secret = Some(secret);
            }
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Build the store for `kind`
    pub fn open_backend(&self, kind: BackendKind) -> Result<Box<dyn SecretStore>> {
        Ok(match kind {
            BackendKind::Keyring => Box::new(KeyringStore::new()),
            BackendKind::SecretTool => Box::new(SecretToolStore::new()),
            BackendKind::Netrc => Box::new(NetrcStore::from_env()?),
            BackendKind::Sealed => {
                let path = match self.sealed_path {
                    Some(ref path) => path.clone(),
                    None => Self::config_dir()?.join(SEALED_FILE),
                };
                Box::new(SealedFileStore::from_env(path)?)
            }
            BackendKind::Memory => Box::new(MemoryStore::new()),
        })
    }

    /// Fail early when the OAuth client registration is missing
    pub fn require_client(&self) -> Result<&OAuthClientConfig> {
        if self.client.client_id.is_empty() {
            anyhow::bail!(
                "No OAuth client_id configured; set {} or add it to the config file",
                CLIENT_ID_ENV
            );
        }
        Ok(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/keyfob/config.json")).unwrap();
        assert_eq!(config.token_backend, BackendKind::Keyring);
        assert_eq!(config.credential_backend, BackendKind::Netrc);
        assert_eq!(config.memo_capacity, 1024);
        assert_eq!(config.force_refresh_var, "FORCE_TOKEN_REFRESH");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"token_backend": "secret-tool", "client": {"client_id": "abc"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.token_backend, BackendKind::SecretTool);
        assert_eq!(config.client.client_id, "abc");
        assert_eq!(config.client.auth_url, DEFAULT_AUTH_URL);
        assert!(config.require_client().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.memo_capacity = 16;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap().memo_capacity, 16);
    }

    #[test]
    fn test_require_client() {
        assert!(Config::default().require_client().is_err());
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("sealed".parse::<BackendKind>().unwrap(), BackendKind::Sealed);
        assert!("floppy".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let client = OAuthClientConfig {
            client_secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", client).contains("s3cret"));
    }
}
