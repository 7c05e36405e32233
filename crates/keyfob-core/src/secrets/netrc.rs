//! Read-only lookups in a netrc file.
//!
//! Machines are named `<namespace>/<host>` (e.g. `api/pixiv.net`) so one
//! netrc can hold separate logins for a site's web and API front ends.
//! `default` entries are parsed but never matched, and `macdef` bodies are
//! skipped.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{SecretError, SecretKey, SecretStore, StoredCredential};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NetrcEntry {
    /// None for the `default` entry
    machine: Option<String>,
    login: Option<String>,
    password: Option<String>,
    account: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetrcStore {
    path: PathBuf,
}

impl NetrcStore {
    /// Use `$NETRC` if set, otherwise `~/.netrc`
    pub fn from_env() -> Result<Self, SecretError> {
        if let Some(path) = std::env::var_os("NETRC") {
            return Ok(Self::new(PathBuf::from(path)));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            SecretError::BackendUnavailable("could not find home directory".to_string())
        })?;
        Ok(Self::new(home.join(".netrc")))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Result<Vec<NetrcEntry>, SecretError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_netrc(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "netrc file not found");
                Ok(Vec::new())
            }
            Err(e) => Err(SecretError::BackendUnavailable(format!(
                "could not read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn find(&self, key: &SecretKey) -> Result<Option<NetrcEntry>, SecretError> {
        let machine = key.machine();
        trace!(machine = %machine, login = ?key.login, "netrc lookup");
        Ok(self.entries()?.into_iter().find(|entry| {
            entry.machine.as_deref() == Some(machine.as_str())
                && match key.login {
                    Some(ref login) => entry.login.as_ref() == Some(login),
                    None => true,
                }
        }))
    }
}

fn parse_netrc(contents: &str) -> Vec<NetrcEntry> {
    let mut entries = Vec::new();
    let mut current: Option<NetrcEntry> = None;
    let mut in_macdef = false;

    for line in contents.lines() {
        if in_macdef {
            // A macro body runs until the next blank line
            if line.trim().is_empty() {
                in_macdef = false;
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.starts_with('#') {
                // Comment runs to end of line
                break;
            }
            match token {
                "machine" | "default" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    let machine = if token == "machine" {
                        tokens.next().map(str::to_string)
                    } else {
                        None
                    };
                    current = Some(NetrcEntry {
                        machine,
                        ..Default::default()
                    });
                }
                "login" | "password" | "account" => {
                    let value = tokens.next().map(str::to_string);
                    if let Some(ref mut entry) = current {
                        match token {
                            "login" => entry.login = value,
                            "password" => entry.password = value,
                            _ => entry.account = value,
                        }
                    }
                }
                "macdef" => {
                    in_macdef = true;
                    break;
                }
                _ => {}
            }
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

impl SecretStore for NetrcStore {
    fn name(&self) -> &'static str {
        "netrc"
    }

    fn store(&self, _key: &SecretKey, _value: &str) -> Result<(), SecretError> {
        Err(SecretError::ReadOnly("netrc"))
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        Ok(self.find(key)?.and_then(|entry| entry.password))
    }

    fn clear(&self, _key: &SecretKey) -> Result<(), SecretError> {
        Err(SecretError::ReadOnly("netrc"))
    }

    fn get_credential(&self, key: &SecretKey) -> Result<Option<StoredCredential>, SecretError> {
        let Some(entry) = self.find(key)? else {
            return Ok(None);
        };
        match (entry.login, entry.password) {
            (Some(login), Some(secret)) => Ok(Some(StoredCredential {
                login,
                secret,
                account: entry.account,
            })),
            _ => Err(SecretError::Malformed(format!(
                "netrc entry for {} lacks login or password",
                key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
machine api/pixiv.net login alice password hunter2 account main
machine pixiv.net
    login alice-web
    password web-secret

macdef init
machine api/pixiv.net login mallory password nope

default login anonymous password guest
";

    fn write_sample() -> (tempfile::TempDir, NetrcStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netrc");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, NetrcStore::new(path))
    }

    #[test]
    fn test_parse_skips_macdef_body() {
        let entries = parse_netrc(SAMPLE);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].machine.as_deref(), Some("api/pixiv.net"));
        assert_eq!(entries[1].login.as_deref(), Some("alice-web"));
        assert_eq!(entries[2].machine, None);
        assert_eq!(entries[2].login.as_deref(), Some("anonymous"));
    }

    #[test]
    fn test_get_credential_by_machine() {
        let (_dir, store) = write_sample();
        let cred = store
            .get_credential(&SecretKey::new("api", "pixiv.net"))
            .unwrap()
            .unwrap();
        assert_eq!(cred.login, "alice");
        assert_eq!(cred.secret, "hunter2");
        assert_eq!(cred.account.as_deref(), Some("main"));
    }

    #[test]
    fn test_login_filter_and_default_ignored() {
        let (_dir, store) = write_sample();
        let key = SecretKey::new("api", "pixiv.net").with_login("bob");
        assert_eq!(store.get(&key).unwrap(), None);
        assert_eq!(
            store.get_credential(&SecretKey::new("api", "example.com")).unwrap(),
            None
        );
    }

    #[test]
    fn test_comments_are_not_tokens() {
        let entries = parse_netrc(
            "\
machine api/pixiv.net login alice password hunter2
# rotate this password yearly, machine default login
machine pixiv.net login bob password web # old password was 1234
",
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].login.as_deref(), Some("alice"));
        assert_eq!(entries[0].password.as_deref(), Some("hunter2"));
        assert_eq!(entries[1].machine.as_deref(), Some("pixiv.net"));
        assert_eq!(entries[1].password.as_deref(), Some("web"));
    }

    #[test]
    fn test_comment_after_entry_keeps_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netrc");
        std::fs::write(
            &path,
            "machine api/pixiv.net login alice password hunter2\n# rotate this password yearly\n",
        )
        .unwrap();

        let cred = NetrcStore::new(path)
            .get_credential(&SecretKey::new("api", "pixiv.net"))
            .unwrap()
            .unwrap();
        assert_eq!(cred.secret, "hunter2");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = NetrcStore::new("/nonexistent/keyfob/netrc");
        assert_eq!(store.get(&SecretKey::new("api", "pixiv.net")).unwrap(), None);
    }

    #[test]
    fn test_read_only() {
        let (_dir, store) = write_sample();
        let key = SecretKey::new("api", "pixiv.net");
        assert!(matches!(store.store(&key, "x"), Err(SecretError::ReadOnly(_))));
        assert!(matches!(store.clear(&key), Err(SecretError::ReadOnly(_))));
    }
}
