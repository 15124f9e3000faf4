//! Remote shell access over ssh/scp
//!
//! Remote work is expressed as a [`RemoteScript`]: operator-supplied values
//! are bound to shell variables through [`RemoteScript::var`], which quotes
//! them, and the script body only ever refers to those variables. The script
//! is piped to `bash -s` on the host so one session returns one exit status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::DeploymentConfig;
use crate::deploy::process::{CommandRunner, CommandSpec};
use crate::errors::DeployError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Heredoc terminator used for files written by remote scripts
pub const HEREDOC_DELIMITER: &str = "DOCKHAND_EOF";

/// Quote a word for a POSIX shell, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// A shell script to run on the target host
#[derive(Debug, Clone)]
pub struct RemoteScript {
    strict: bool,
    lines: Vec<String>,
}

impl RemoteScript {
    /// Script that aborts on the first failing command
    pub fn strict() -> Self {
        Self {
            strict: true,
            lines: Vec::new(),
        }
    }

    /// Script that keeps going after failures; its exit status is advisory
    pub fn lenient() -> Self {
        Self {
            strict: false,
            lines: Vec::new(),
        }
    }

    /// Bind a shell variable to a quoted value
    pub fn var(mut self, name: &str, value: impl AsRef<str>) -> Self {
        debug_assert!(name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
        self.lines
            .push(format!("{}={}", name, shell_quote(value.as_ref())));
        self
    }

    /// Append a fixed line of script. Never pass operator input here.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// Write `content` verbatim to the file named by `target` (a shell
    /// expression such as `"$CONF"`), without parameter expansion
    pub fn write_file(mut self, target: &str, content: &str) -> Result<Self, DeployError> {
        if content.lines().any(|l| l.trim() == HEREDOC_DELIMITER) {
            return Err(DeployError::Internal(format!(
                "file content contains the heredoc delimiter {}",
                HEREDOC_DELIMITER
            )));
        }
        self.lines.push(format!(
            "$SUDO tee {} >/dev/null <<'{}'",
            target, HEREDOC_DELIMITER
        ));
        self.lines.push(content.trim_end_matches('\n').to_string());
        self.lines.push(HEREDOC_DELIMITER.to_string());
        Ok(self)
    }

    pub fn render(&self) -> String {
        let mut script = String::new();
        if self.strict {
            script.push_str("set -euo pipefail\n");
        }
        // sudo -n fails instead of prompting
        script.push_str("SUDO=\"\"\nif [ \"$(id -u)\" -ne 0 ]; then SUDO=\"sudo -n\"; fi\n");
        for line in &self.lines {
            script.push_str(line);
            script.push('\n');
        }
        script
    }
}

/// Key-authenticated ssh/scp access to the target host
#[derive(Debug, Clone)]
pub struct SshTarget {
    destination: String,
    scp_prefix: String,
    key: PathBuf,
    connect_timeout: Duration,
}

impl SshTarget {
    pub fn new(config: &DeploymentConfig, connect_timeout: Duration) -> Self {
        let scp_prefix = config.scp_target("");
        Self {
            destination: config.ssh_destination(),
            scp_prefix,
            key: config.ssh_key.clone(),
            connect_timeout,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ]
    }

    /// `ssh ... exit`: succeeds only if key authentication works
    pub fn probe_command(&self) -> CommandSpec {
        CommandSpec::new("Remote reachability check", "ssh")
            .args(self.options())
            .arg(&self.destination)
            .arg("exit")
            .quiet()
    }

    /// Pipe a script to `bash -s` in a single session
    pub fn script_command(&self, step: &'static str, script: &RemoteScript) -> CommandSpec {
        CommandSpec::new(step, "ssh")
            .args(self.options())
            .arg(&self.destination)
            .arg("bash -s")
            .stdin(script.render())
    }

    /// `scp -r` a local directory to `remote_path`, which must not exist yet
    pub fn copy_dir_command(&self, step: &'static str, local: &Path, remote_path: &str) -> CommandSpec {
        CommandSpec::new(step, "scp")
            .arg("-r")
            .arg("-q")
            .args(self.options())
            .arg(local.display().to_string())
            .arg(format!("{}{}", self.scp_prefix, remote_path))
    }

    /// Run a script, failing on a non-zero exit status
    pub async fn run_script(
        &self,
        runner: &dyn CommandRunner,
        step: &'static str,
        script: &RemoteScript,
    ) -> Result<String, DeployError> {
        let output = runner.run(&self.script_command(step, script)).await?;
        Ok(output.stdout)
    }

    /// Check key-based access with bounded retries.
    ///
    /// `retries` extra attempts are made after the first, separated by
    /// exponential backoff. Exhausting them is fatal.
    pub async fn check_reachable(
        &self,
        runner: &dyn CommandRunner,
        retries: u32,
        backoff: &CooldownOptions,
    ) -> Result<(), DeployError> {
        let probe = self.probe_command();
        let attempts = retries + 1;

        for attempt in 0..attempts {
            let output = runner.output(&probe).await?;
            if output.is_success() {
                info!("SSH connection to {} established", self.destination);
                return Ok(());
            }

            let reason = output.stderr.lines().last().unwrap_or("").trim().to_string();
            if attempt + 1 < attempts {
                let delay = calc_exp_backoff(backoff, attempt);
                warn!(
                    "SSH attempt {}/{} to {} failed ({}); retrying in {:?}",
                    attempt + 1,
                    attempts,
                    self.destination,
                    reason,
                    delay
                );
                tokio::time::sleep(delay).await;
            } else {
                warn!(
                    "SSH attempt {}/{} to {} failed ({})",
                    attempt + 1,
                    attempts,
                    self.destination,
                    reason
                );
            }
        }

        Err(DeployError::Unreachable {
            host: self.destination.clone(),
            attempts,
        })
    }
}
