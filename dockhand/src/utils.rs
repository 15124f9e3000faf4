//! Utility functions

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder written in place of secrets in logs and errors
pub const REDACTED: &str = "********";

/// Version information for the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Suffix for names too short to be a valid container name
const SHORT_NAME_SUFFIX: &str = "-app";

/// Derive a container/image name from a working-copy directory name.
///
/// The result is a valid Docker image reference component and container
/// name: lower-case alphanumeric runs joined by a single `.`, `_` or `-`,
/// starting and ending with an alphanumeric character, at least two
/// characters long. Any other run of characters becomes one `-`. A
/// single-character result gets [`SHORT_NAME_SUFFIX`]. Returns `None` when
/// nothing alphanumeric is left.
pub fn derive_name(dir_name: &str) -> Option<String> {
    let mut name = String::new();
    let mut separator: Option<char> = None;

    for c in dir_name.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if let Some(sep) = separator.take() {
                if !name.is_empty() {
                    name.push(sep);
                }
            }
            name.push(c);
        } else {
            separator = match separator {
                None if matches!(c, '.' | '_' | '-') => Some(c),
                _ => Some('-'),
            };
        }
    }

    match name.len() {
        0 => None,
        1 => Some(format!("{}{}", name, SHORT_NAME_SUFFIX)),
        _ => Some(name),
    }
}

/// Replace every occurrence of the given secrets in `text`
pub fn redact(text: &str, secrets: &[SecretString]) -> String {
    secrets
        .iter()
        .map(|s| s.expose_secret())
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
}
