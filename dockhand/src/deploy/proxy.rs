//! Nginx reverse-proxy configuration

use tracing::info;

use crate::deploy::process::CommandRunner;
use crate::deploy::remote::{RemoteScript, SshTarget};
use crate::errors::DeployError;

const STEP: &str = "Reverse proxy configuration";

/// Server block forwarding port 80 to the application on loopback
pub fn render_rule(port: u16) -> String {
    format!(
        r#"server {{
    listen 80;
    listen [::]:80;
    server_name _;

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"#
    )
}

/// Write the rule, keep it only if `nginx -t` accepts the result
pub fn install_script(config_path: &str, port: u16) -> Result<RemoteScript, DeployError> {
    RemoteScript::strict()
        .var("CONF", config_path)
        .line("BACKUP=\"$CONF.bak\"")
        .line("HAD_PREVIOUS=0")
        .line("if [ -f \"$CONF\" ]; then $SUDO cp -p \"$CONF\" \"$BACKUP\"; HAD_PREVIOUS=1; fi")
        .write_file("\"$CONF\"", &render_rule(port))
        .map(|script| {
            script
                .line("if $SUDO nginx -t; then")
                .line("  $SUDO systemctl reload nginx")
                .line("  echo \"Nginx reloaded\"")
                .line("else")
                .line("  echo \"nginx -t rejected the new rule, restoring the previous configuration\" >&2")
                .line("  if [ \"$HAD_PREVIOUS\" = 1 ]; then $SUDO mv \"$BACKUP\" \"$CONF\"; else $SUDO rm -f \"$CONF\"; fi")
                .line("  exit 1")
                .line("fi")
        })
}

/// Remove the rule and any enabled link to it, then reload
pub fn remove_script(config_path: &str) -> RemoteScript {
    RemoteScript::strict()
        .var("CONF", config_path)
        .line("for link in /etc/nginx/sites-enabled/*; do")
        .line("  if [ -L \"$link\" ] && [ \"$(readlink -f \"$link\")\" = \"$CONF\" ]; then $SUDO rm -f \"$link\"; fi")
        .line("done")
        .line("$SUDO rm -f \"$CONF\" \"$CONF.bak\"")
        .line("if command -v nginx >/dev/null 2>&1; then")
        .line("  $SUDO nginx -t")
        .line("  $SUDO systemctl reload nginx")
        .line("fi")
}

pub async fn install_rule(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    config_path: &str,
    port: u16,
) -> Result<(), DeployError> {
    info!(
        "Configuring Nginx on {}: port 80 -> 127.0.0.1:{} ({})",
        target.destination(),
        port,
        config_path
    );
    target
        .run_script(runner, STEP, &install_script(config_path, port)?)
        .await?;
    Ok(())
}

pub async fn remove_rule(
    runner: &dyn CommandRunner,
    target: &SshTarget,
    config_path: &str,
) -> Result<(), DeployError> {
    info!("Removing Nginx rule {} on {}", config_path, target.destination());
    target
        .run_script(runner, "Teardown", &remove_script(config_path))
        .await?;
    Ok(())
}
