//! Remote environment preparation

use tracing::info;

use crate::config::DeploymentConfig;
use crate::deploy::process::CommandRunner;
use crate::deploy::remote::{RemoteScript, SshTarget};
use crate::errors::DeployError;

const STEP: &str = "Remote environment preparation";

/// Script that brings the host to the required state. Every block checks
/// before it changes anything, so a second run only refreshes the package
/// index.
pub fn provision_script(config: &DeploymentConfig) -> RemoteScript {
    RemoteScript::strict()
        .var("DEPLOY_USER", &config.ssh_user)
        .line("export DEBIAN_FRONTEND=noninteractive")
        .line("echo \"Updating package index...\"")
        .line("$SUDO apt-get update -y -qq")
        .line("if ! command -v docker >/dev/null 2>&1; then")
        .line("  echo \"Installing Docker...\"")
        .line("  $SUDO apt-get install -y -qq docker.io")
        .line("fi")
        .line("if ! docker compose version >/dev/null 2>&1 && ! command -v docker-compose >/dev/null 2>&1; then")
        .line("  echo \"Installing Docker Compose...\"")
        .line("  $SUDO apt-get install -y -qq docker-compose-plugin || $SUDO apt-get install -y -qq docker-compose")
        .line("fi")
        .line("if ! command -v nginx >/dev/null 2>&1; then")
        .line("  echo \"Installing Nginx...\"")
        .line("  $SUDO apt-get install -y -qq nginx")
        .line("fi")
        .line("if ! id -nG \"$DEPLOY_USER\" | tr ' ' '\\n' | grep -qx docker; then")
        .line("  echo \"Adding $DEPLOY_USER to the docker group...\"")
        .line("  $SUDO usermod -aG docker \"$DEPLOY_USER\"")
        .line("fi")
        .line("$SUDO systemctl enable --now docker nginx")
        .line("echo \"docker: $(docker --version)\"")
        .line("echo \"nginx: $(nginx -v 2>&1)\"")
}

/// Prepare the host in a single SSH session. Any failure is fatal.
pub async fn prepare_host(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    config: &DeploymentConfig,
) -> Result<(), DeployError> {
    info!("Preparing remote environment on {}", target.destination());
    target
        .run_script(runner, STEP, &provision_script(config))
        .await?;
    info!("Remote environment ready");
    Ok(())
}
