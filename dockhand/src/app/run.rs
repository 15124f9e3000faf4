//! Top-level run: settings, logging, pipeline and exit status

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::app::options::Cli;
use crate::config::params::RawParams;
use crate::config::prompt::{Prompter, TerminalPrompter};
use crate::config::settings::Settings;
use crate::deploy::executor::{DeployOptions, DeployReport, Deployer};
use crate::deploy::process::{CommandRunner, DryRunRunner, SystemRunner};
use crate::deploy::validate::{HttpProbe, Probe};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::{init_logging, LogGuard, LogOptions};
use crate::storage::layout::WorkspaceLayout;
use crate::utils::version_info;

/// An invocation with settings loaded, logging initialized and every
/// parameter the operator has to type already gathered
pub struct Session {
    cli: Cli,
    settings: Settings,
    layout: WorkspaceLayout,
    params: RawParams,
    log_guard: LogGuard,
}

/// Load settings, start logging and prompt for missing parameters.
///
/// Runs before interrupt handling is installed, so Ctrl+C at a prompt
/// terminates the process with the default disposition. The error value is
/// the process exit status.
pub async fn prepare(cli: Cli) -> Result<Session, i32> {
    let settings = match load_settings(&cli).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e.exit_code());
        }
    };

    let layout = WorkspaceLayout::new(cli.workdir.clone().unwrap_or_else(|| settings.workdir.clone()))
        .with_log_dir(cli.log_dir.clone().or_else(|| settings.log_dir.clone()));

    let log_options = LogOptions {
        log_level: cli.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        ansi: std::io::stdout().is_terminal(),
        log_dir: layout.logs_dir().path().to_path_buf(),
    };
    let log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e.exit_code());
        }
    };

    let version = version_info();
    info!("dockhand {} ({})", version.version, version.git_hash);
    info!("Logging to {}", log_guard.path().display());

    let terminal = TerminalPrompter;
    let interactive = !cli.non_interactive && std::io::stdin().is_terminal();
    let prompter: Option<&dyn Prompter> = if interactive { Some(&terminal) } else { None };

    let params = match gather_params(&cli, &settings, prompter) {
        Ok(params) => params,
        Err(e) => {
            error!("{}", e);
            return Err(e.exit_code());
        }
    };

    Ok(Session {
        cli,
        settings,
        layout,
        params,
        log_guard,
    })
}

impl Session {
    /// Run the pipeline and return the process exit status. This is the
    /// only place pipeline errors are turned into an exit code.
    pub async fn run(self) -> i32 {
        let Session {
            cli,
            settings,
            layout,
            params,
            log_guard,
        } = self;

        let code = match execute(&cli, &settings, layout, params).await {
            Ok(()) => 0,
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        };
        if code != 0 {
            error!("Exiting with status {}; see {}", code, log_guard.path().display());
        }
        code
    }
}

async fn load_settings(cli: &Cli) -> Result<Settings, DeployError> {
    match &cli.config {
        Some(path) => Settings::load(&File::new(path)).await,
        None => Ok(Settings::default()),
    }
}

/// Merge command line, environment and settings file, then ask for whatever
/// is still missing. Answers are validated later by the pipeline.
fn gather_params(
    cli: &Cli,
    settings: &Settings,
    prompter: Option<&dyn Prompter>,
) -> Result<RawParams, DeployError> {
    let params = cli.params().or(RawParams::from(settings.deployment.clone()));
    match prompter {
        Some(prompter) => params.prompt_missing(prompter),
        None => Ok(params),
    }
}

async fn execute(
    cli: &Cli,
    settings: &Settings,
    layout: WorkspaceLayout,
    params: RawParams,
) -> Result<(), DeployError> {
    let local: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let (remote, probe): (Arc<dyn CommandRunner>, Option<Arc<dyn Probe>>) = if cli.dry_run {
        warn!("Dry run: remote commands are logged, not executed");
        (Arc::new(DryRunRunner), None)
    } else {
        (Arc::new(SystemRunner), http_probe(settings))
    };

    let mut deployer = Deployer::new(local, remote, probe, layout, DeployOptions::from(settings));

    if cli.teardown {
        let name = deployer.teardown(params, None).await?;
        info!("Teardown of {} completed successfully", name);
        return Ok(());
    }

    let report = deployer.deploy(params, None).await?;
    log_summary(&report);
    info!("Deployment completed successfully");
    Ok(())
}

fn http_probe(settings: &Settings) -> Option<Arc<dyn Probe>> {
    match HttpProbe::new(Duration::from_secs(settings.probe.timeout_secs)) {
        Ok(probe) => Some(Arc::new(probe)),
        Err(e) => {
            warn!("HTTP probe unavailable, skipping the public check: {}", e);
            None
        }
    }
}

fn log_summary(report: &DeployReport) {
    info!("Application: {} ({})", report.name, report.method);
    match &report.working_copy.commit {
        Some(commit) => info!("Commit: {}", commit),
        None => info!("Commit: unknown"),
    }
    info!("Remote directory: {}", report.remote_dir);
    for warning in &report.validation.warnings {
        warn!("Validation: {}", warning);
    }
}
