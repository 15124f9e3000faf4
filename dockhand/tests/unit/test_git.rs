//! Source acquisition tests

use std::path::PathBuf;

use secrecy::SecretString;
use url::Url;

use dockhand::config::DeploymentConfig;
use dockhand::deploy::git::{acquire, SyncKind};
use dockhand::deploy::process::CommandOutput;
use dockhand::errors::DeployError;
use dockhand::storage::layout::WorkspaceLayout;

use crate::support::{failure, git_responder, RecordingRunner, REPO_NAME, REPO_URL, TOKEN};

fn config() -> DeploymentConfig {
    DeploymentConfig {
        repo_url: Url::parse(REPO_URL).unwrap(),
        token: SecretString::from(TOKEN),
        branch: "main".to_string(),
        ssh_user: "ubuntu".to_string(),
        server: "203.0.113.7".to_string(),
        ssh_key: PathBuf::from("/dev/null"),
        app_port: 3000,
        git_username: "oauth2".to_string(),
    }
}

#[tokio::test]
async fn test_clone_into_empty_workdir() {
    let workdir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::with(git_responder(&["Dockerfile"]));

    let (copy, kind) = acquire(runner.as_ref(), &config(), &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap();

    assert_eq!(kind, SyncKind::Cloned);
    assert_eq!(copy.path, workdir.path().join(REPO_NAME));
    assert_eq!(copy.dir_name, REPO_NAME);
    assert_eq!(copy.commit.as_deref(), Some("abc1234"));

    let calls = runner.calls();
    assert_eq!(calls[0].args[..4], ["clone", "--branch", "main", "--single-branch"]);
    assert!(calls[0]
        .env
        .contains(&("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())));
    assert_eq!(calls[1].args, ["remote", "set-url", "origin", REPO_URL]);

    // The token reaches git but never a displayed command
    assert!(calls[0].args[4].starts_with("https://oauth2:"));
    for shown in runner.displays() {
        assert!(!shown.contains("T0ken"), "token leaked: {shown}");
    }
}

#[tokio::test]
async fn test_existing_working_copy_is_updated_in_place() {
    let workdir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workdir.path().join(REPO_NAME).join(".git")).unwrap();
    let runner = RecordingRunner::with(git_responder(&[]));

    let (_, kind) = acquire(runner.as_ref(), &config(), &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap();
    assert_eq!(kind, SyncKind::Updated);

    let subcommands: Vec<String> = runner.calls().iter().map(|c| c.args[0].clone()).collect();
    assert_eq!(subcommands, ["fetch", "rev-parse", "checkout", "merge", "rev-parse"]);
    for call in runner.calls() {
        assert_eq!(call.current_dir, Some(workdir.path().join(REPO_NAME)));
    }
    assert_eq!(runner.calls()[3].args, ["merge", "--ff-only", "FETCH_HEAD"]);
}

#[tokio::test]
async fn test_missing_local_branch_is_created_from_fetch_head() {
    let workdir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workdir.path().join(REPO_NAME).join(".git")).unwrap();
    let runner = RecordingRunner::with(|spec| {
        if spec.args.iter().any(|a| a == "--verify") {
            failure(1, "")
        } else {
            CommandOutput::success()
        }
    });

    acquire(runner.as_ref(), &config(), &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap();
    assert_eq!(runner.calls()[2].args, ["checkout", "-b", "main", "FETCH_HEAD", "--"]);
}

#[tokio::test]
async fn test_plain_directory_in_the_way_is_fatal() {
    let workdir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workdir.path().join(REPO_NAME)).unwrap();
    let runner = RecordingRunner::ok();

    let err = acquire(runner.as_ref(), &config(), &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Config(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_failed_clone_leaves_nothing_behind() {
    let workdir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::with(|spec| {
        let dest = PathBuf::from(spec.args.last().unwrap());
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        failure(128, "fatal: Authentication failed")
    });

    let err = acquire(runner.as_ref(), &config(), &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 128);
    assert!(!workdir.path().join(REPO_NAME).exists());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_repository_named_logs_beside_the_log_directory() {
    let workdir = tempfile::tempdir().unwrap();
    let layout = WorkspaceLayout::new(workdir.path());
    std::fs::create_dir_all(layout.logs_dir().path()).unwrap();
    let config = DeploymentConfig {
        repo_url: Url::parse("https://github.com/acme/logs.git").unwrap(),
        ..config()
    };
    let runner = RecordingRunner::with(git_responder(&["Dockerfile"]));

    let (copy, kind) = acquire(runner.as_ref(), &config, &layout).await.unwrap();

    assert_eq!(kind, SyncKind::Cloned);
    assert_eq!(copy.path, workdir.path().join("logs"));
    assert!(layout.logs_dir().path().is_dir());
}

#[tokio::test]
async fn test_reserved_repository_name_is_rejected() {
    let workdir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig {
        repo_url: Url::parse("https://github.com/acme/.dockhand.git").unwrap(),
        ..config()
    };
    let runner = RecordingRunner::ok();

    let err = acquire(runner.as_ref(), &config, &WorkspaceLayout::new(workdir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Config(_)));
    assert!(runner.calls().is_empty());
}
