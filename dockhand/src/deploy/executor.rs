//! Deployment pipeline executor

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::params::{collect, RawParams};
use crate::config::prompt::Prompter;
use crate::config::settings::Settings;
use crate::config::DeploymentConfig;
use crate::deploy::container::{self, RemoteApp};
use crate::deploy::detect::{detect_build_method, BuildMethod};
use crate::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState, PipelineStep};
use crate::deploy::git::{self, WorkingCopy};
use crate::deploy::process::CommandRunner;
use crate::deploy::provision::prepare_host;
use crate::deploy::proxy;
use crate::deploy::remote::SshTarget;
use crate::deploy::validate::{validate, Probe, ValidationReport};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::storage::layout::WorkspaceLayout;
use crate::utils::{derive_name, CooldownOptions};

/// Tunables for one run
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub remote_root: String,
    pub proxy_config_path: String,
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub backoff: CooldownOptions,
    pub settle_delay: Duration,
    pub git_username: String,
}

impl From<&Settings> for DeployOptions {
    fn from(settings: &Settings) -> Self {
        let remote = &settings.remote;
        Self {
            remote_root: remote.remote_root.clone(),
            proxy_config_path: remote.proxy_config_path.clone(),
            connect_timeout: Duration::from_secs(remote.connect_timeout_secs),
            connect_retries: remote.connect_retries,
            backoff: CooldownOptions {
                base_delay: Duration::from_secs(remote.retry_base_delay_secs),
                ..Default::default()
            },
            settle_delay: Duration::from_secs(remote.settle_delay_secs),
            git_username: settings.git_username.clone(),
        }
    }
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub name: String,
    pub method: BuildMethod,
    pub working_copy: WorkingCopy,
    pub remote_dir: String,
    pub validation: ValidationReport,
}

/// Partial artifacts to remove if the run aborts
#[derive(Debug, Clone)]
enum Cleanup {
    /// Staging directory and a created-but-stopped container on the host
    Remote { target: SshTarget, app: RemoteApp },
}

/// Runs the deployment pipeline, one step at a time
pub struct Deployer {
    local: Arc<dyn CommandRunner>,
    remote: Arc<dyn CommandRunner>,
    probe: Option<Arc<dyn Probe>>,
    layout: WorkspaceLayout,
    options: DeployOptions,
    fsm: PipelineFsm,
    cleanup: Vec<Cleanup>,
}

impl Deployer {
    /// `local` runs git on this machine, `remote` runs ssh and scp. The
    /// public HTTP check is skipped when `probe` is `None`.
    pub fn new(
        local: Arc<dyn CommandRunner>,
        remote: Arc<dyn CommandRunner>,
        probe: Option<Arc<dyn Probe>>,
        layout: WorkspaceLayout,
        options: DeployOptions,
    ) -> Self {
        Self {
            local,
            remote,
            probe,
            layout,
            options,
            fsm: PipelineFsm::new(),
            cleanup: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.fsm.state()
    }

    /// Run every step in order. The first fatal error aborts the run,
    /// removes partial artifacts and is returned unchanged.
    pub async fn deploy(
        &mut self,
        params: RawParams,
        prompter: Option<&dyn Prompter>,
    ) -> Result<DeployReport, DeployError> {
        self.fsm = PipelineFsm::new();
        self.cleanup.clear();

        let result = self.pipeline(params, prompter).await;
        if let Err(e) = &result {
            error!("Deployment aborted: {}", e);
            self.abort().await;
        }
        result
    }

    async fn pipeline(
        &mut self,
        params: RawParams,
        prompter: Option<&dyn Prompter>,
    ) -> Result<DeployReport, DeployError> {
        self.begin(PipelineStep::ParameterCollection)?;
        let result = collect(params, prompter, &self.options.git_username).await;
        let config = self.finish(result)?;
        info!(
            "Deploying {} (branch {}) to {} on port {}",
            config.repo_url,
            config.branch,
            config.ssh_destination(),
            config.app_port
        );

        self.begin(PipelineStep::SourceAcquisition)?;
        let result = git::acquire(self.local.as_ref(), &config, &self.layout).await;
        let (working_copy, _) = self.finish(result)?;

        self.begin(PipelineStep::BuildDetection)?;
        let result = detect(&working_copy).await;
        let (method, name) = self.finish(result)?;

        let target = SshTarget::new(&config, self.options.connect_timeout);
        let app = RemoteApp::new(name.clone(), self.options.remote_root.clone());

        self.begin(PipelineStep::Reachability)?;
        let result = target
            .check_reachable(self.remote.as_ref(), self.options.connect_retries, &self.options.backoff)
            .await;
        self.finish(result)?;

        self.begin(PipelineStep::Provisioning)?;
        let result = prepare_host(self.remote.as_ref(), &target, &config).await;
        self.finish(result)?;

        self.begin(PipelineStep::Launch)?;
        self.cleanup.push(Cleanup::Remote {
            target: target.clone(),
            app: app.clone(),
        });
        let result = self.transfer_and_launch(&target, &app, &working_copy, &method, &config).await;
        self.finish(result)?;

        self.begin(PipelineStep::ProxyConfiguration)?;
        let result = proxy::install_rule(
            self.remote.as_ref(),
            &target,
            &self.options.proxy_config_path,
            config.app_port,
        )
        .await;
        self.finish(result)?;
        self.cleanup.clear();

        self.begin(PipelineStep::Validation)?;
        let probe = self.probe.as_deref();
        let validation = validate(self.remote.as_ref(), &target, &app, &config, probe).await;
        self.finish(Ok(()))?;

        Ok(DeployReport {
            name,
            method,
            working_copy,
            remote_dir: app.app_dir(),
            validation,
        })
    }

    async fn transfer_and_launch(
        &self,
        target: &SshTarget,
        app: &RemoteApp,
        working_copy: &WorkingCopy,
        method: &BuildMethod,
        config: &DeploymentConfig,
    ) -> Result<(), DeployError> {
        container::transfer(self.remote.as_ref(), target, app, &working_copy.path).await?;
        container::launch(
            self.remote.as_ref(),
            target,
            app,
            method,
            config.app_port,
            self.options.settle_delay,
        )
        .await
    }

    /// Remove a previous deployment: container or stack, application files
    /// and the proxy rule
    pub async fn teardown(
        &mut self,
        params: RawParams,
        prompter: Option<&dyn Prompter>,
    ) -> Result<String, DeployError> {
        info!("==> Parameter collection");
        let config = collect(params, prompter, &self.options.git_username).await?;
        let name = derived_name(&config.repo_name())?;

        let target = SshTarget::new(&config, self.options.connect_timeout);
        let app = RemoteApp::new(name.clone(), self.options.remote_root.clone());

        info!("==> Remote reachability check");
        target
            .check_reachable(self.remote.as_ref(), self.options.connect_retries, &self.options.backoff)
            .await?;

        info!("==> Teardown");
        container::teardown(self.remote.as_ref(), &target, &app).await?;
        proxy::remove_rule(self.remote.as_ref(), &target, &self.options.proxy_config_path).await?;
        Ok(name)
    }

    fn begin(&mut self, step: PipelineStep) -> Result<(), DeployError> {
        info!("==> {}", step);
        self.fsm
            .process(PipelineEvent::Start(step))
            .map_err(DeployError::Internal)
    }

    fn finish<T>(&mut self, result: Result<T, DeployError>) -> Result<T, DeployError> {
        let event = match &result {
            Ok(_) => PipelineEvent::StepSucceeded,
            Err(e) => PipelineEvent::StepFailed(e.to_string()),
        };
        self.fsm.process(event).map_err(DeployError::Internal)?;
        result
    }

    /// Best-effort removal of partial artifacts; failures are only logged
    async fn abort(&mut self) {
        if let PipelineState::Failed(step) = self.fsm.state() {
            warn!("Failed at {}", step);
        }
        for cleanup in self.cleanup.drain(..).rev() {
            match cleanup {
                Cleanup::Remote { target, app } => {
                    info!("Cleaning up partial deployment of {} on {}", app.name, target.destination());
                    let script = container::abort_cleanup_script(&app);
                    let command = target.script_command("Cleanup", &script);
                    if let Err(e) = self.remote.output(&command).await {
                        warn!("Cleanup on {} failed: {}", target.destination(), e);
                    }
                }
            }
        }
    }
}

async fn detect(working_copy: &WorkingCopy) -> Result<(BuildMethod, String), DeployError> {
    let method = detect_build_method(&Dir::new(&working_copy.path)).await?;
    let name = derived_name(&working_copy.dir_name)?;
    info!("Build method: {}, container name: {}", method, name);
    Ok((method, name))
}

fn derived_name(dir_name: &str) -> Result<String, DeployError> {
    derive_name(dir_name).ok_or_else(|| {
        DeployError::Config(format!(
            "cannot derive a container name from {:?}",
            dir_name
        ))
    })
}
