//! End-to-end pipeline tests against fake runners

use std::sync::Arc;

use dockhand::config::params::RawParams;
use dockhand::deploy::detect::BuildMethod;
use dockhand::deploy::executor::Deployer;
use dockhand::deploy::fsm::{PipelineState, PipelineStep};
use dockhand::deploy::process::{CommandOutput, DryRunRunner};
use dockhand::errors::{DeployError, EXIT_NO_DESCRIPTOR, EXIT_UNREACHABLE, EXIT_VALIDATION};
use dockhand::storage::layout::WorkspaceLayout;

use crate::support::{
    failure, fast_options, git_responder, healthy_host, params, ssh_key, FakeProbe, RecordingRunner,
    REPO_NAME,
};

struct Harness {
    _tmp: tempfile::TempDir,
    workdir: std::path::PathBuf,
    params: RawParams,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = tmp.path().join("work");
        let params = params(&ssh_key(tmp.path()));
        Self {
            _tmp: tmp,
            workdir,
            params,
        }
    }

    fn deployer(
        &self,
        local: &Arc<RecordingRunner>,
        remote: &Arc<RecordingRunner>,
        probe: Option<Arc<FakeProbe>>,
    ) -> Deployer {
        Deployer::new(
            local.clone(),
            remote.clone(),
            probe.map(|p| p as Arc<dyn dockhand::deploy::validate::Probe>),
            WorkspaceLayout::new(&self.workdir),
            fast_options(),
        )
    }
}

#[tokio::test]
async fn test_dockerfile_deployment_runs_every_step() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile", "docker-compose.yml"]));
    let remote = RecordingRunner::with(healthy_host);
    let probe = FakeProbe::answering(200);
    let mut deployer = harness.deployer(&local, &remote, Some(probe.clone()));

    let report = deployer.deploy(harness.params.clone(), None).await.unwrap();

    assert_eq!(deployer.state(), PipelineState::Succeeded);
    assert_eq!(report.name, REPO_NAME);
    assert_eq!(report.method, BuildMethod::Dockerfile);
    assert_eq!(report.remote_dir, format!("/opt/dockhand/{REPO_NAME}"));
    assert!(report.validation.is_clean(), "{:?}", report.validation.warnings);
    assert_eq!(report.validation.container_table.len(), 1);
    assert!(report.validation.container_table[0].starts_with("hng-stage1  Up"));
    assert_eq!(probe.urls.lock().unwrap().as_slice(), ["http://203.0.113.7/"]);

    assert_eq!(
        remote.steps(),
        [
            "Remote reachability check",
            "Remote environment preparation",
            "Artifact transfer",
            "Artifact transfer",
            "Artifact transfer",
            "Container launch",
            "Reverse proxy configuration",
            "Post-deploy validation",
        ]
    );
    let programs: Vec<String> = remote.calls().iter().map(|c| c.program.clone()).collect();
    assert_eq!(programs, ["ssh", "ssh", "ssh", "scp", "ssh", "ssh", "ssh", "ssh"]);

    let calls = remote.calls();
    let script = calls[5].stdin.as_deref().unwrap();
    assert!(script.contains("APP_NAME=hng-stage1\n"));
    assert!(script.contains("docker run -d"));

    assert!(calls[6]
        .stdin
        .as_deref()
        .unwrap()
        .contains("proxy_pass http://127.0.0.1:3000;"));
}

#[tokio::test]
async fn test_token_never_shown() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(healthy_host);
    let mut deployer = harness.deployer(&local, &remote, None);

    deployer.deploy(harness.params.clone(), None).await.unwrap();

    for shown in local.displays().into_iter().chain(remote.displays()) {
        assert!(!shown.contains("T0ken"), "token leaked: {shown}");
    }
    for call in remote.calls() {
        assert!(!call.stdin.unwrap_or_default().contains("T0ken"));
    }
}

#[tokio::test]
async fn test_malformed_url_runs_nothing() {
    let harness = Harness::new();
    let local = RecordingRunner::ok();
    let remote = RecordingRunner::ok();
    let mut deployer = harness.deployer(&local, &remote, None);

    let mut params = harness.params.clone();
    params.repo_url = Some("github.com/acme/hng-stage1".to_string());
    let err = deployer.deploy(params, None).await.unwrap_err();

    assert!(matches!(err, DeployError::Validation { field: "repository URL", .. }));
    assert_eq!(err.exit_code(), EXIT_VALIDATION);
    assert_eq!(deployer.state(), PipelineState::Failed(PipelineStep::ParameterCollection));
    assert!(local.calls().is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_empty_token_prevents_clone() {
    let harness = Harness::new();
    let local = RecordingRunner::ok();
    let remote = RecordingRunner::ok();
    let mut deployer = harness.deployer(&local, &remote, None);

    let mut params = harness.params.clone();
    params.token = Some("   ".into());
    let err = deployer.deploy(params, None).await.unwrap_err();

    assert!(matches!(err, DeployError::Validation { field: "access token", .. }));
    assert!(local.calls().is_empty());
    assert!(!harness.workdir.join(REPO_NAME).exists());
}

#[tokio::test]
async fn test_non_numeric_port_is_rejected_before_any_command() {
    let harness = Harness::new();
    let local = RecordingRunner::ok();
    let remote = RecordingRunner::ok();
    let mut deployer = harness.deployer(&local, &remote, None);

    let mut params = harness.params.clone();
    params.port = Some("http".to_string());
    let err = deployer.deploy(params, None).await.unwrap_err();

    assert!(matches!(err, DeployError::Validation { field: "application port", .. }));
    assert!(local.calls().is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_missing_build_descriptor_stops_before_ssh() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["README.md"]));
    let remote = RecordingRunner::ok();
    let mut deployer = harness.deployer(&local, &remote, None);

    let err = deployer.deploy(harness.params.clone(), None).await.unwrap_err();

    assert!(matches!(err, DeployError::NoBuildDescriptor(_)));
    assert_eq!(err.exit_code(), EXIT_NO_DESCRIPTOR);
    assert_eq!(deployer.state(), PipelineState::Failed(PipelineStep::BuildDetection));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_compose_project_is_recreated() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["compose.yaml"]));
    let remote = RecordingRunner::with(healthy_host);
    let mut deployer = harness.deployer(&local, &remote, None);

    let report = deployer.deploy(harness.params.clone(), None).await.unwrap();
    assert_eq!(report.method, BuildMethod::Compose("compose.yaml".to_string()));

    let launch = remote
        .calls()
        .into_iter()
        .find(|c| c.step == "Container launch")
        .unwrap();
    let script = launch.stdin.unwrap();
    assert!(script.contains("COMPOSE_FILE=compose.yaml\n"));
    assert!(script.contains("down --remove-orphans"));
    assert!(script.contains("up -d --build"));
}

#[tokio::test]
async fn test_rerun_updates_in_place_and_repeats_remote_sequence() {
    let harness = Harness::new();
    let first_local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let first_remote = RecordingRunner::with(healthy_host);
    harness
        .deployer(&first_local, &first_remote, None)
        .deploy(harness.params.clone(), None)
        .await
        .unwrap();

    let second_local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let second_remote = RecordingRunner::with(healthy_host);
    harness
        .deployer(&second_local, &second_remote, None)
        .deploy(harness.params.clone(), None)
        .await
        .unwrap();

    assert!(second_local.calls().iter().all(|c| c.args[0] != "clone"));
    assert_eq!(second_local.calls()[0].args[0], "fetch");

    let first: Vec<_> = first_remote.calls().into_iter().map(|c| (c.display(), c.stdin)).collect();
    let second: Vec<_> = second_remote.calls().into_iter().map(|c| (c.display(), c.stdin)).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_exit_code_is_the_failing_command_status() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(|spec| {
        if spec.step == "Remote environment preparation" {
            failure(100, "E: Unable to locate package nginx")
        } else {
            CommandOutput::success()
        }
    });
    let mut deployer = harness.deployer(&local, &remote, None);

    let err = deployer.deploy(harness.params.clone(), None).await.unwrap_err();

    assert_eq!(err.exit_code(), 100);
    assert!(err.to_string().contains("Unable to locate package nginx"));
    assert_eq!(deployer.state(), PipelineState::Failed(PipelineStep::Provisioning));
    // Nothing after the failing step, and nothing to clean up yet
    assert_eq!(
        remote.steps(),
        ["Remote reachability check", "Remote environment preparation"]
    );
}

#[tokio::test]
async fn test_failed_launch_cleans_up_remote_artifacts() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(|spec| {
        if spec.step == "Container launch" {
            failure(125, "docker: Error response from daemon: port is already allocated.")
        } else {
            CommandOutput::success()
        }
    });
    let mut deployer = harness.deployer(&local, &remote, None);

    let err = deployer.deploy(harness.params.clone(), None).await.unwrap_err();

    assert_eq!(err.exit_code(), 125);
    assert_eq!(deployer.state(), PipelineState::Failed(PipelineStep::Launch));
    let calls = remote.calls();
    let cleanup = calls.last().unwrap();
    assert_eq!(cleanup.step, "Cleanup");
    let script = cleanup.stdin.as_deref().unwrap();
    assert!(script.contains("$SUDO rm -rf \"$STAGING\""));
    assert!(!calls.iter().any(|c| c.step == "Reverse proxy configuration"));
}

#[tokio::test]
async fn test_unreachable_host_after_retries() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(|_| failure(255, "ssh: connect to host 203.0.113.7 port 22: Connection timed out"));
    let mut deployer = harness.deployer(&local, &remote, None);

    let err = deployer.deploy(harness.params.clone(), None).await.unwrap_err();

    assert!(matches!(err, DeployError::Unreachable { attempts: 2, .. }));
    assert_eq!(err.exit_code(), EXIT_UNREACHABLE);
    assert_eq!(remote.calls().len(), 2);
}

#[tokio::test]
async fn test_probe_failures_never_fail_the_run() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(|spec| {
        if spec.step == "Post-deploy validation" {
            failure(1, "")
        } else {
            CommandOutput::success()
        }
    });
    let mut deployer = harness.deployer(&local, &remote, Some(FakeProbe::unreachable()));

    let report = deployer.deploy(harness.params.clone(), None).await.unwrap();

    assert_eq!(deployer.state(), PipelineState::Succeeded);
    assert!(!report.validation.is_clean());
    assert!(report
        .validation
        .warnings
        .iter()
        .any(|w| w.contains("not reachable")));
}

#[tokio::test]
async fn test_bad_gateway_is_a_warning() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let remote = RecordingRunner::with(healthy_host);
    let mut deployer = harness.deployer(&local, &remote, Some(FakeProbe::answering(502)));

    let report = deployer.deploy(harness.params.clone(), None).await.unwrap();
    assert_eq!(report.validation.public_http_status, Some(502));
    assert_eq!(report.validation.warnings.len(), 1);
}

#[tokio::test]
async fn test_dry_run_only_logs_remote_commands() {
    let harness = Harness::new();
    let local = RecordingRunner::with(git_responder(&["Dockerfile"]));
    let mut deployer = Deployer::new(
        local.clone(),
        Arc::new(DryRunRunner),
        None,
        WorkspaceLayout::new(&harness.workdir),
        fast_options(),
    );

    let report = deployer.deploy(harness.params.clone(), None).await.unwrap();
    assert_eq!(report.method, BuildMethod::Dockerfile);
    assert_eq!(local.calls()[0].args[0], "clone");
}

#[tokio::test]
async fn test_teardown_removes_app_and_proxy_rule() {
    let harness = Harness::new();
    let local = RecordingRunner::ok();
    let remote = RecordingRunner::ok();
    let mut deployer = harness.deployer(&local, &remote, None);

    let name = deployer.teardown(harness.params.clone(), None).await.unwrap();

    assert_eq!(name, REPO_NAME);
    assert!(local.calls().is_empty());
    assert_eq!(remote.steps(), ["Remote reachability check", "Teardown", "Teardown"]);
    let calls = remote.calls();
    assert!(calls[1].stdin.as_deref().unwrap().contains("docker rm -f"));
    assert!(calls[2]
        .stdin
        .as_deref()
        .unwrap()
        .contains("CONF=/etc/nginx/sites-available/default\n"));
}
