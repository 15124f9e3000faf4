//! Error types for dockhand

use thiserror::Error;

/// Exit code for invalid operator input or configuration
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code when the working copy has no build descriptor
pub const EXIT_NO_DESCRIPTOR: i32 = 3;
/// Exit code for local I/O failures
pub const EXIT_IO: i32 = 4;
/// Exit code when the target host cannot be reached over SSH
pub const EXIT_UNREACHABLE: i32 = 5;

/// Main error type for a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No Dockerfile or Compose file found in {0}")]
    NoBuildDescriptor(String),

    #[error("Host {host} is unreachable over SSH after {attempts} attempt(s)")]
    Unreachable { host: String, attempts: u32 },

    #[error("{step} failed: `{command}` exited with {}{}", fmt_code(.code), fmt_stderr(.stderr))]
    Command {
        step: &'static str,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DeployError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// A failed command reports its own exit status, the way a shell
    /// running under `set -e` would.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Validation { .. } | DeployError::Config(_) | DeployError::Prompt(_) => {
                EXIT_VALIDATION
            }
            DeployError::NoBuildDescriptor(_) => EXIT_NO_DESCRIPTOR,
            DeployError::Unreachable { .. } => EXIT_UNREACHABLE,
            DeployError::Command { code, .. } => match code {
                Some(code) if (1..=255).contains(code) => *code,
                _ => 1,
            },
            DeployError::Io(_) | DeployError::Json(_) => EXIT_IO,
            DeployError::Http(_) | DeployError::Internal(_) => 1,
        }
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn fmt_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr)
    }
}
