//! Artifact transfer and container launch

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::deploy::detect::{BuildMethod, COMPOSE_FILES};
use crate::deploy::process::CommandRunner;
use crate::deploy::remote::{RemoteScript, SshTarget};
use crate::errors::DeployError;

const TRANSFER_STEP: &str = "Artifact transfer";
const LAUNCH_STEP: &str = "Container launch";
const TEARDOWN_STEP: &str = "Teardown";

/// Prefer the compose plugin, fall back to the standalone binary
const COMPOSE_FN: &str = "compose() { if $SUDO docker compose version >/dev/null 2>&1; then $SUDO docker compose \"$@\"; else $SUDO docker-compose \"$@\"; fi; }";

/// Placement of one application on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApp {
    /// Derived name: image tag, container name and Compose project
    pub name: String,

    /// Parent directory of the application copy
    pub remote_root: String,
}

impl RemoteApp {
    pub fn new(name: impl Into<String>, remote_root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Directory holding the deployed copy
    pub fn app_dir(&self) -> String {
        format!("{}/{}", self.remote_root.trim_end_matches('/'), self.name)
    }

    /// Directory receiving a transfer before it replaces [`Self::app_dir`]
    pub fn staging_dir(&self) -> String {
        format!("{}/.{}.incoming", self.remote_root.trim_end_matches('/'), self.name)
    }

    /// Compose project names may not contain dots
    pub fn project_name(&self) -> String {
        self.name.replace('.', "_")
    }

    fn script(&self, strict: bool) -> RemoteScript {
        let script = if strict {
            RemoteScript::strict()
        } else {
            RemoteScript::lenient()
        };
        script
            .var("APP_NAME", &self.name)
            .var("PROJECT", self.project_name())
            .var("REMOTE_ROOT", &self.remote_root)
            .var("APP_DIR", self.app_dir())
            .var("STAGING", self.staging_dir())
    }
}

/// Clear the staging directory and make the remote root writable by the
/// login user
pub fn stage_script(app: &RemoteApp) -> RemoteScript {
    app.script(true)
        .line("$SUDO mkdir -p \"$REMOTE_ROOT\"")
        .line("$SUDO chown \"$(id -u):$(id -g)\" \"$REMOTE_ROOT\"")
        .line("$SUDO rm -rf \"$STAGING\"")
}

/// Replace the previous copy with the staged one
pub fn swap_script(app: &RemoteApp) -> RemoteScript {
    app.script(true)
        .line("$SUDO rm -rf \"$APP_DIR\"")
        .line("mv \"$STAGING\" \"$APP_DIR\"")
        .line("echo \"Application files in $APP_DIR\"")
}

/// Copy the working copy to the host, replacing any prior copy.
///
/// The copy lands in a staging directory first, so an interrupted transfer
/// never leaves a half-written application directory behind.
pub async fn transfer(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    app: &RemoteApp,
    working_copy: &Path,
) -> Result<(), DeployError> {
    info!(
        "Transferring {} to {}:{}",
        working_copy.display(),
        target.destination(),
        app.app_dir()
    );
    target
        .run_script(runner, TRANSFER_STEP, &stage_script(app))
        .await?;
    runner
        .run(&target.copy_dir_command(TRANSFER_STEP, working_copy, &app.staging_dir()))
        .await?;
    target
        .run_script(runner, TRANSFER_STEP, &swap_script(app))
        .await?;
    Ok(())
}

/// Build and start the application, replacing any previous deployment
/// under the same name
pub fn launch_script(
    app: &RemoteApp,
    method: &BuildMethod,
    port: u16,
    settle: Duration,
) -> RemoteScript {
    let script = app
        .script(true)
        .var("APP_PORT", port.to_string())
        .var("SETTLE", settle.as_secs().to_string())
        .line("cd \"$APP_DIR\"");

    match method {
        BuildMethod::Compose(file) => script
            .var("COMPOSE_FILE", file)
            .line(COMPOSE_FN)
            .line("echo \"Stopping existing stack $PROJECT...\"")
            .line("compose -p \"$PROJECT\" -f \"$COMPOSE_FILE\" down --remove-orphans")
            .line("echo \"Starting stack $PROJECT...\"")
            .line("compose -p \"$PROJECT\" -f \"$COMPOSE_FILE\" up -d --build")
            .line("sleep \"$SETTLE\"")
            .line("compose -p \"$PROJECT\" -f \"$COMPOSE_FILE\" ps")
            .line("compose -p \"$PROJECT\" -f \"$COMPOSE_FILE\" logs --tail 20 || true"),
        BuildMethod::Dockerfile => script
            .line("echo \"Building image $APP_NAME...\"")
            .line("$SUDO docker build -t \"$APP_NAME\" .")
            .line("if $SUDO docker ps -a --format '{{.Names}}' | grep -Fx \"$APP_NAME\" >/dev/null; then")
            .line("  echo \"Removing existing container $APP_NAME...\"")
            .line("  $SUDO docker rm -f \"$APP_NAME\" >/dev/null")
            .line("fi")
            .line("echo \"Starting container $APP_NAME on port $APP_PORT...\"")
            .line("$SUDO docker run -d --name \"$APP_NAME\" --restart unless-stopped -p \"$APP_PORT:$APP_PORT\" \"$APP_NAME\"")
            .line("sleep \"$SETTLE\"")
            .line("$SUDO docker ps --filter \"name=^${APP_NAME}\\$\"")
            .line("$SUDO docker logs --tail 20 \"$APP_NAME\" || true"),
    }
}

pub async fn launch(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    app: &RemoteApp,
    method: &BuildMethod,
    port: u16,
    settle: Duration,
) -> Result<(), DeployError> {
    info!("Launching {} via {} on port {}", app.name, method, port);
    target
        .run_script(runner, LAUNCH_STEP, &launch_script(app, method, port, settle))
        .await?;
    info!("Container started");
    Ok(())
}

/// Remove what an aborted run left behind: the staging directory and a
/// container that was created but is not running
pub fn abort_cleanup_script(app: &RemoteApp) -> RemoteScript {
    app.script(false)
        .line("$SUDO rm -rf \"$STAGING\"")
        .line("if [ \"$($SUDO docker inspect -f '{{.State.Running}}' \"$APP_NAME\" 2>/dev/null)\" = \"false\" ]; then")
        .line("  $SUDO docker rm -f \"$APP_NAME\" >/dev/null")
        .line("fi")
}

/// Remove the container or stack and the application files
pub fn teardown_script(app: &RemoteApp) -> RemoteScript {
    let mut script = app
        .script(true)
        .line(COMPOSE_FN)
        .line("if [ -d \"$APP_DIR\" ]; then")
        .line("  cd \"$APP_DIR\"");
    for file in COMPOSE_FILES {
        script = script.line(format!(
            "  if [ -f {file} ]; then compose -p \"$PROJECT\" -f {file} down --remove-orphans || true; fi"
        ));
    }
    script
        .line("  cd /")
        .line("fi")
        .line("if $SUDO docker ps -a --format '{{.Names}}' | grep -Fx \"$APP_NAME\" >/dev/null; then")
        .line("  echo \"Removing container $APP_NAME...\"")
        .line("  $SUDO docker rm -f \"$APP_NAME\" >/dev/null")
        .line("fi")
        .line("if $SUDO docker image inspect \"$APP_NAME\" >/dev/null 2>&1; then")
        .line("  $SUDO docker image rm \"$APP_NAME\" >/dev/null || true")
        .line("fi")
        .line("$SUDO rm -rf \"$APP_DIR\" \"$STAGING\"")
        .line("echo \"Removed $APP_DIR\"")
}

pub async fn teardown(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    app: &RemoteApp,
) -> Result<(), DeployError> {
    info!("Removing {} from {}", app.name, target.destination());
    target
        .run_script(runner, TEARDOWN_STEP, &teardown_script(app))
        .await?;
    Ok(())
}
