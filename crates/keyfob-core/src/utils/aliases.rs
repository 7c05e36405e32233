//! Member alias table.
//!
//! `member_names.txt` in the config directory maps member ids to the names
//! used in tags, one `id = name` pair per line. Lines starting with `;` or
//! `#` and blank lines are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::Config;

const ALIASES_FILE: &str = "member_names.txt";

#[derive(Debug, Clone, Default)]
pub struct MemberAliases {
    names: HashMap<String, String>,
}

impl MemberAliases {
    pub fn default_path() -> Result<PathBuf> {
        Ok(Config::config_dir()?.join(ALIASES_FILE))
    }

    /// Load from `path`. A missing file gives an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading member aliases");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "member alias file not found; ignoring");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read alias file {}", path.display()))
            }
        };
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut names = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    names.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => warn!(line = lineno + 1, "skipping malformed alias line"),
            }
        }
        Self { names }
    }

    pub fn get(&self, member_id: u64) -> Option<&str> {
        self.names.get(&member_id.to_string()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, String)> for MemberAliases {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let aliases = MemberAliases::parse(
            "; comment\n# another\n\n 42 = rabbit \n7=hatter\nno separator here\n=orphan\n",
        );
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases.get(42), Some("rabbit"));
        assert_eq!(aliases.get(7), Some("hatter"));
        assert_eq!(aliases.get(8), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = MemberAliases::load(&dir.path().join(ALIASES_FILE)).unwrap();
        assert!(aliases.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ALIASES_FILE);
        std::fs::write(&path, "100=dormouse\n").unwrap();

        let aliases = MemberAliases::load(&path).unwrap();
        assert_eq!(aliases.get(100), Some("dormouse"));
    }
}
