//! Post-deploy validation
//!
//! Every check here is advisory: failures are collected as warnings in the
//! [`ValidationReport`] and never abort the run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::config::DeploymentConfig;
use crate::deploy::container::RemoteApp;
use crate::deploy::process::CommandRunner;
use crate::deploy::remote::{RemoteScript, SshTarget};
use crate::errors::DeployError;

const STEP: &str = "Post-deploy validation";

/// HTTP reachability probe
#[async_trait]
pub trait Probe: Send + Sync {
    /// Status code returned for a GET of `url`
    async fn status(&self, url: &Url) -> Result<u16, DeployError>;
}

/// [`Probe`] backed by reqwest
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn status(&self, url: &Url) -> Result<u16, DeployError> {
        let response = self.client.get(url.clone()).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Outcome of the validation checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub docker_active: Option<bool>,
    pub nginx_active: Option<bool>,
    pub running_containers: Option<u32>,
    /// `docker ps` rows on the host: name, status and published ports
    pub container_table: Vec<String>,
    /// Status of `http://localhost` as seen from the host
    pub remote_http_status: Option<u16>,
    /// Status of `http://<server>/` as seen from here
    pub public_http_status: Option<u16>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Fill the remote fields from `key=value` lines printed by
    /// [`remote_checks_script`]
    fn absorb(&mut self, stdout: &str) {
        for line in stdout.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key {
                "docker" => self.docker_active = Some(value == "active"),
                "nginx" => self.nginx_active = Some(value == "active"),
                "containers" => self.running_containers = value.parse().ok(),
                "container" if !value.is_empty() => self.container_table.push(value.to_string()),
                "http" => self.remote_http_status = value.parse().ok().filter(|c| *c != 0),
                _ => {}
            }
        }
    }
}

/// Lenient script reporting service, container and local HTTP state
pub fn remote_checks_script(app: &RemoteApp) -> RemoteScript {
    RemoteScript::lenient()
        .var("APP_NAME", &app.name)
        .var("PROJECT", app.project_name())
        .line("echo \"docker=$(systemctl is-active docker 2>/dev/null)\"")
        .line("echo \"nginx=$(systemctl is-active nginx 2>/dev/null)\"")
        .line("echo \"containers=$( { $SUDO docker ps -q --filter \"name=^${APP_NAME}\\$\"; $SUDO docker ps -q --filter \"label=com.docker.compose.project=$PROJECT\"; } 2>/dev/null | sort -u | wc -l)\"")
        .line("$SUDO docker ps --format '{{.Names}}  {{.Status}}  {{.Ports}}' 2>/dev/null | sed 's/^/container=/'")
        .line("echo \"http=$(curl -s -o /dev/null -w '%{http_code}' --max-time 10 http://localhost)\"")
}

/// URL of the application behind the proxy, bracketing IPv6 hosts
pub fn public_url(server: &str) -> Result<Url, DeployError> {
    let host = if server.contains(':') {
        format!("[{}]", server)
    } else {
        server.to_string()
    };
    Url::parse(&format!("http://{}/", host))
        .map_err(|e| DeployError::Internal(format!("invalid probe URL for {}: {}", server, e)))
}

fn is_ok_status(code: u16) -> bool {
    (200..400).contains(&code)
}

/// Run the remote checks and, when a probe is given, the public probe.
/// Never fails.
pub async fn validate(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    app: &RemoteApp,
    config: &DeploymentConfig,
    probe: Option<&dyn Probe>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let checks = target.script_command(STEP, &remote_checks_script(app));
    match runner.output(&checks).await {
        Ok(output) => report.absorb(&output.stdout),
        Err(e) => report.warn(format!("Remote checks could not run: {}", e)),
    }

    match report.docker_active {
        Some(true) => info!("Docker service is active"),
        _ => report.warn("Docker service is not reported active".to_string()),
    }
    match report.nginx_active {
        Some(true) => info!("Nginx service is active"),
        _ => report.warn("Nginx service is not reported active".to_string()),
    }
    match report.running_containers {
        Some(n) if n > 0 => info!("{} container(s) running for {}", n, app.name),
        _ => report.warn(format!("No running container found for {}", app.name)),
    }
    if !report.container_table.is_empty() {
        info!("Running containers on {}:", target.destination());
        for row in &report.container_table {
            info!("  {}", row);
        }
    }
    match report.remote_http_status {
        Some(code) if is_ok_status(code) => info!("http://localhost on the host answered {}", code),
        Some(code) => report.warn(format!("http://localhost on the host answered {}", code)),
        None => report.warn("http://localhost on the host did not answer".to_string()),
    }

    if let Some(probe) = probe {
        match public_url(&config.server) {
            Ok(url) => match probe.status(&url).await {
                Ok(code) => {
                    report.public_http_status = Some(code);
                    if is_ok_status(code) {
                        info!("{} answered {}", url, code);
                    } else {
                        report.warn(format!("{} answered {}", url, code));
                    }
                }
                Err(e) => report.warn(format!("{} is not reachable: {}", url, e)),
            },
            Err(e) => report.warn(e.to_string()),
        }
    }

    if report.is_clean() {
        info!("Validation passed");
    } else {
        warn!("Validation finished with {} warning(s)", report.warnings.len());
    }
    report
}
