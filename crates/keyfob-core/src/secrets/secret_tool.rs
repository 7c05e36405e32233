//! libsecret backend driven through the `secret-tool` command.
//!
//! Each operation is one blocking subprocess call. The exit status tells
//! success from failure; stderr tells "nothing stored" (silent) from "the
//! secret service could not be reached" (diagnostic output).

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use tracing::{debug, trace};

use super::{SecretError, SecretKey, SecretStore};

const DEFAULT_PROGRAM: &str = "secret-tool";

/// Label prefix shown in keyring managers (seahorse, KWallet)
const LABEL_PREFIX: &str = "keyfob";

#[derive(Debug, Clone)]
pub struct SecretToolStore {
    program: PathBuf,
}

impl Default for SecretToolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretToolStore {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }

    /// Use a different executable (a wrapper script, or a fake in tests)
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, action: &str, key: &SecretKey) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(action);
        if action == "store" {
            cmd.arg(format!("--label={} {}", LABEL_PREFIX, key));
        }
        for (attr, value) in key.attributes() {
            cmd.arg(attr).arg(value);
        }
        cmd
    }

    fn run(&self, mut cmd: Command, input: Option<&str>) -> Result<Output, SecretError> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| {
            SecretError::BackendUnavailable(format!(
                "could not run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).map_err(|e| {
                    SecretError::BackendUnavailable(format!("could not pass secret: {}", e))
                })?;
            }
        }

        child.wait_with_output().map_err(|e| {
            SecretError::BackendUnavailable(format!(
                "{} did not complete: {}",
                self.program.display(),
                e
            ))
        })
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

impl SecretStore for SecretToolStore {
    fn name(&self) -> &'static str {
        "secret-tool"
    }

    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError> {
        trace!(key = %key, "libsecret store");
        let output = self.run(self.command("store", key), Some(value))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SecretError::BackendUnavailable(format!(
                "libsecret store failed ({}): {}",
                output.status,
                stderr_text(&output)
            )))
        }
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        trace!(key = %key, "libsecret lookup");
        let output = self.run(self.command("lookup", key), None)?;
        if output.status.success() {
            let value = String::from_utf8(output.stdout)
                .map_err(|_| SecretError::Malformed("secret is not valid UTF-8".to_string()))?;
            return Ok(Some(value));
        }

        let stderr = stderr_text(&output);
        if stderr.is_empty() {
            debug!(key = %key, "no libsecret item");
            Ok(None)
        } else {
            Err(SecretError::BackendUnavailable(format!(
                "libsecret lookup failed: {}",
                stderr
            )))
        }
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        trace!(key = %key, "libsecret clear");
        let output = self.run(self.command("clear", key), None)?;
        let stderr = stderr_text(&output);
        if output.status.success() || stderr.is_empty() {
            Ok(())
        } else {
            Err(SecretError::BackendUnavailable(format!(
                "libsecret clear failed: {}",
                stderr
            )))
        }
    }
}
