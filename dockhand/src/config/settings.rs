//! Settings file management

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Settings loaded from an optional JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for per-run log files (defaults to `<workdir>/.dockhand/logs`)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Parent directory of working copies
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// HTTPS username paired with the access token
    #[serde(default = "default_git_username")]
    pub git_username: String,

    /// Remote host configuration
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Post-deploy probe configuration
    #[serde(default)]
    pub probe: ProbeSettings,

    /// Operator-supplied deployment fields
    #[serde(default)]
    pub deployment: DeploymentSettings,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_git_username() -> String {
    "oauth2".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            workdir: default_workdir(),
            git_username: default_git_username(),
            remote: RemoteSettings::default(),
            probe: ProbeSettings::default(),
            deployment: DeploymentSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Err(DeployError::Config(format!(
                "settings file {} does not exist",
                file.path().display()
            )));
        }
        file.read_json::<Settings>().await.map_err(|e| {
            DeployError::Config(format!("unable to read {}: {}", file.path().display(), e))
        })
    }
}

/// Remote host settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    /// Parent directory of the transferred working copy on the host
    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    /// Active reverse-proxy configuration slot
    #[serde(default = "default_proxy_config_path")]
    pub proxy_config_path: String,

    /// SSH connect timeout for the reachability probe
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra reachability attempts after the first one
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Backoff base between reachability attempts
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    /// Wait after starting the container before reporting its status
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_remote_root() -> String {
    "/opt/dockhand".to_string()
}

fn default_proxy_config_path() -> String {
    "/etc/nginx/sites-available/default".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_connect_retries() -> u32 {
    2
}

fn default_retry_base_delay() -> u64 {
    2
}

fn default_settle_delay() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            remote_root: default_remote_root(),
            proxy_config_path: default_proxy_config_path(),
            connect_timeout_secs: default_connect_timeout(),
            connect_retries: default_connect_retries(),
            retry_base_delay_secs: default_retry_base_delay(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

/// HTTP probe settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Timeout for each HTTP probe
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
        }
    }
}

/// Deployment fields that may be preset in the settings file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentSettings {
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub token: Option<SecretString>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub ssh_user: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    /// Accepts `"3000"` or `3000`
    #[serde(default, deserialize_with = "port_value")]
    pub port: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Text(String),
    Number(u64),
}

fn port_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<PortValue>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        PortValue::Text(text) => text,
        PortValue::Number(number) => number.to_string(),
    }))
}
