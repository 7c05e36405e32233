//! Passphrase-sealed secrets file.
//!
//! All secrets live in one file: a JSON map encrypted with XChaCha20-Poly1305
//! under a key derived from the operator's passphrase with Argon2id.
//!
//! File layout: `KFS1` | salt (16 bytes) | nonce (24 bytes) | ciphertext.
//! A fresh salt and nonce are drawn on every write.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use tracing::{debug, trace};

use super::{SecretError, SecretKey, SecretStore};

/// Environment variable holding the sealing passphrase
pub const PASSPHRASE_ENV: &str = "KEYFOB_SEAL_PASSPHRASE";

const MAGIC: &[u8; 4] = b"KFS1";
const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 24;
const KEY_LENGTH: usize = 32;
const HEADER_LENGTH: usize = MAGIC.len() + SALT_LENGTH + NONCE_LENGTH;

type SecretMap = BTreeMap<String, String>;

pub struct SealedFileStore {
    path: PathBuf,
    passphrase: String,
}

impl fmt::Debug for SealedFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SealedFileStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Read the passphrase from `KEYFOB_SEAL_PASSPHRASE`
    pub fn from_env(path: impl Into<PathBuf>) -> Result<Self, SecretError> {
        match std::env::var(PASSPHRASE_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => Ok(Self::new(path, passphrase)),
            _ => Err(SecretError::BackendUnavailable(format!(
                "{} is not set",
                PASSPHRASE_ENV
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LENGTH], SecretError> {
        let mut key = [0u8; KEY_LENGTH];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| SecretError::BackendUnavailable(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    fn seal(&self, map: &SecretMap) -> Result<Vec<u8>, SecretError> {
        let plaintext =
            serde_json::to_vec(map).map_err(|e| SecretError::Malformed(e.to_string()))?;

        let mut salt = [0u8; SALT_LENGTH];
        let mut nonce = [0u8; NONCE_LENGTH];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| SecretError::BackendUnavailable(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(HEADER_LENGTH + ciphertext.len());
        sealed.extend_from_slice(MAGIC);
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn unseal(&self, sealed: &[u8]) -> Result<SecretMap, SecretError> {
        if sealed.len() < HEADER_LENGTH || &sealed[..MAGIC.len()] != MAGIC {
            return Err(SecretError::Malformed(format!(
                "{} is not a sealed secrets file",
                self.path.display()
            )));
        }

        let (salt, rest) = sealed[MAGIC.len()..].split_at(SALT_LENGTH);
        let (nonce, ciphertext) = rest.split_at(NONCE_LENGTH);

        let key = self.derive_key(salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                SecretError::Malformed("wrong passphrase or corrupted secrets file".to_string())
            })?;

        serde_json::from_slice(&plaintext).map_err(|e| SecretError::Malformed(e.to_string()))
    }

    fn read_map(&self) -> Result<SecretMap, SecretError> {
        match std::fs::read(&self.path) {
            Ok(sealed) => self.unseal(&sealed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SecretMap::new()),
            Err(e) => Err(SecretError::BackendUnavailable(format!(
                "could not read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Replace the file through a temp file + rename so readers never see a
    /// half-written file
    fn write_map(&self, map: &SecretMap) -> Result<(), SecretError> {
        let io_err = |e: std::io::Error| {
            SecretError::BackendUnavailable(format!("could not write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let sealed = self.seal(map)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, sealed).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), entries = map.len(), "sealed secrets written");
        Ok(())
    }
}

impl SecretStore for SealedFileStore {
    fn name(&self) -> &'static str {
        "sealed"
    }

    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError> {
        trace!(key = %key, "sealed store");
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        trace!(key = %key, "sealed lookup");
        Ok(self.read_map()?.remove(&key.to_string()))
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        trace!(key = %key, "sealed clear");
        let mut map = self.read_map()?;
        if map.remove(&key.to_string()).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
