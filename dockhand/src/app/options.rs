//! Command-line options

use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;

use crate::config::params::RawParams;
use crate::logs::LogLevel;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Provision a Linux host over SSH and deploy a containerized application
/// from a Git repository behind an Nginx reverse proxy.
///
/// Missing deployment parameters are prompted for when running on a
/// terminal.
#[derive(Parser, Debug)]
#[command(name = "dockhand")]
#[command(version, long_version = LONG_VERSION, about, long_about = None)]
pub struct Cli {
    /// Git repository URL (http or https)
    #[arg(long, env = "DOCKHAND_REPO_URL")]
    pub repo_url: Option<String>,

    /// Personal access token for cloning over HTTPS
    #[arg(long, env = "DOCKHAND_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Branch to deploy [default: main]
    #[arg(long, env = "DOCKHAND_BRANCH")]
    pub branch: Option<String>,

    /// SSH username on the target host
    #[arg(long, env = "DOCKHAND_SSH_USER")]
    pub ssh_user: Option<String>,

    /// Target host name or IP address
    #[arg(long, env = "DOCKHAND_SERVER")]
    pub server: Option<String>,

    /// Private key used for SSH and SCP
    #[arg(long, env = "DOCKHAND_SSH_KEY")]
    pub ssh_key: Option<PathBuf>,

    /// Port the application listens on
    #[arg(long, env = "DOCKHAND_PORT")]
    pub port: Option<String>,

    /// JSON settings file
    #[arg(long, env = "DOCKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory that holds working copies
    #[arg(long, env = "DOCKHAND_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Directory for per-run log files [default: <workdir>/.dockhand/logs]
    #[arg(long, env = "DOCKHAND_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCKHAND_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Never prompt; missing parameters are errors
    #[arg(long)]
    pub non_interactive: bool,

    /// Clone locally but only log the remote commands
    #[arg(long)]
    pub dry_run: bool,

    /// Remove a previous deployment instead of deploying
    #[arg(long)]
    pub teardown: bool,
}

impl Cli {
    /// Deployment parameters given on the command line or in the environment
    pub fn params(&self) -> RawParams {
        RawParams {
            repo_url: self.repo_url.clone(),
            token: self.token.clone().map(SecretString::from),
            branch: self.branch.clone(),
            ssh_user: self.ssh_user.clone(),
            server: self.server.clone(),
            ssh_key: self.ssh_key.clone(),
            port: self.port.clone(),
        }
    }
}
