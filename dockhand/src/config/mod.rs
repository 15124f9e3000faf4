//! Deployment configuration

pub mod params;
pub mod prompt;
pub mod settings;

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::params::repo_name_of;

/// Validated, read-only configuration for one run
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Repository to deploy (http or https)
    pub repo_url: Url,

    /// Access token for HTTPS clone/fetch
    pub token: SecretString,

    /// Branch to deploy
    pub branch: String,

    /// Remote login user
    pub ssh_user: String,

    /// Remote host name or IP address
    pub server: String,

    /// Private key used for ssh and scp
    pub ssh_key: PathBuf,

    /// Port the application listens on inside the host
    pub app_port: u16,

    /// HTTPS username paired with the token
    pub git_username: String,
}

impl DeploymentConfig {
    /// Repository name, used as the working copy directory name
    pub fn repo_name(&self) -> String {
        repo_name_of(&self.repo_url).unwrap_or_else(|| "app".to_string())
    }

    /// Transport URL carrying the token as HTTPS credentials
    pub fn authenticated_url(&self) -> SecretString {
        let mut url = self.repo_url.clone();
        // Only fails for cannot-be-a-base URLs, which validation rejects
        let _ = url.set_username(&self.git_username);
        let _ = url.set_password(Some(self.token.expose_secret()));
        SecretString::from(url.to_string())
    }

    /// Strings that must never reach a log line or error message
    pub fn secrets(&self) -> Vec<SecretString> {
        let mut secrets = vec![self.token.clone()];
        let mut probe = self.repo_url.clone();
        if probe.set_password(Some(self.token.expose_secret())).is_ok() {
            if let Some(encoded) = probe.password() {
                if encoded != self.token.expose_secret() {
                    secrets.push(SecretString::from(encoded.to_string()));
                }
            }
        }
        secrets
    }

    /// `user@host` destination for ssh
    pub fn ssh_destination(&self) -> String {
        format!("{}@{}", self.ssh_user, self.server)
    }

    /// `user@host:path` target for scp, bracketing IPv6 hosts
    pub fn scp_target(&self, remote_path: &str) -> String {
        if self.server.contains(':') {
            format!("{}@[{}]:{}", self.ssh_user, self.server, remote_path)
        } else {
            format!("{}@{}:{}", self.ssh_user, self.server, remote_path)
        }
    }
}
