//! Source acquisition from a Git repository

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::DeploymentConfig;
use crate::deploy::process::{CommandRunner, CommandSpec};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::storage::layout::WorkspaceLayout;

const STEP: &str = "Source acquisition";

/// Local checkout of the deployed branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    /// Checkout directory
    pub path: PathBuf,

    /// Directory name, the base of the derived container name
    pub dir_name: String,

    /// Short hash of the checked-out commit, when known
    pub commit: Option<String>,
}

/// How the working copy was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Cloned,
    Updated,
}

/// Clone the repository, or update an existing working copy in place.
///
/// The token only ever travels inside the transport URL of a single git
/// invocation; it is never written to `.git/config`.
pub async fn acquire(
    runner: &dyn CommandRunner,
    config: &DeploymentConfig,
    layout: &WorkspaceLayout,
) -> Result<(WorkingCopy, SyncKind), DeployError> {
    let dir_name = config.repo_name();
    if layout.is_reserved(&dir_name) {
        return Err(DeployError::Config(format!(
            "repository name {} is reserved for dockhand's own files",
            dir_name
        )));
    }
    let dir = layout.working_copy_dir(&dir_name);

    info!(
        "Syncing Git repository: {} (branch: {}) to {}",
        config.repo_url,
        config.branch,
        dir.path().display()
    );

    let kind = if dir.exists().await {
        if !dir.subdir(".git").is_occupied().await {
            return Err(DeployError::Config(format!(
                "{} exists but is not a Git working copy",
                dir.path().display()
            )));
        }
        update(runner, config, &dir).await?;
        SyncKind::Updated
    } else if dir.is_occupied().await {
        return Err(DeployError::Config(format!(
            "{} exists and is not a directory",
            dir.path().display()
        )));
    } else {
        Dir::new(&layout.base_dir).create().await?;
        clone(runner, config, &dir).await?;
        SyncKind::Cloned
    };

    let commit = head_commit(runner, &dir).await;
    match (&kind, &commit) {
        (SyncKind::Cloned, Some(c)) => info!("Cloned {} at {}", config.branch, c),
        (SyncKind::Updated, Some(c)) => info!("Updated {} in place, now at {}", config.branch, c),
        _ => info!("Working copy ready at {}", dir.path().display()),
    }

    Ok((
        WorkingCopy {
            path: dir.path().to_path_buf(),
            dir_name,
            commit,
        },
        kind,
    ))
}

fn git(config: &DeploymentConfig) -> CommandSpec {
    CommandSpec::new(STEP, "git")
        .env("GIT_TERMINAL_PROMPT", "0")
        .redacting(&config.secrets())
}

async fn clone(
    runner: &dyn CommandRunner,
    config: &DeploymentConfig,
    dir: &Dir,
) -> Result<(), DeployError> {
    debug!("Cloning repository to {}...", dir.path().display());
    let clone = git(config)
        .args(["clone", "--branch", config.branch.as_str(), "--single-branch"])
        .secret_arg(&config.authenticated_url())
        .arg(dir.path().display().to_string());

    if let Err(e) = runner.run(&clone).await {
        // Remove whatever the failed clone left behind
        if let Err(cleanup) = dir.delete().await {
            warn!("Failed to remove partial clone {}: {}", dir.path().display(), cleanup);
        }
        return Err(e);
    }

    let set_url = git(config)
        .current_dir(dir.path())
        .args(["remote", "set-url", "origin", config.repo_url.as_str()])
        .quiet();
    runner.run(&set_url).await?;
    Ok(())
}

async fn update(
    runner: &dyn CommandRunner,
    config: &DeploymentConfig,
    dir: &Dir,
) -> Result<(), DeployError> {
    debug!("Target directory exists, updating in place...");
    let branch = config.branch.as_str();

    let fetch = git(config)
        .current_dir(dir.path())
        .arg("fetch")
        .secret_arg(&config.authenticated_url())
        .arg(branch);
    runner.run(&fetch).await?;

    let has_local_branch = git(config)
        .current_dir(dir.path())
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("refs/heads/{}", branch))
        .quiet();
    let checkout = if runner.output(&has_local_branch).await?.is_success() {
        git(config)
            .current_dir(dir.path())
            .args(["checkout", branch, "--"])
    } else {
        git(config)
            .current_dir(dir.path())
            .args(["checkout", "-b", branch, "FETCH_HEAD", "--"])
    };
    runner.run(&checkout).await?;

    let merge = git(config)
        .current_dir(dir.path())
        .args(["merge", "--ff-only", "FETCH_HEAD"]);
    runner.run(&merge).await?;
    Ok(())
}

async fn head_commit(runner: &dyn CommandRunner, dir: &Dir) -> Option<String> {
    let spec = CommandSpec::new(STEP, "git")
        .current_dir(dir.path())
        .args(["rev-parse", "--short", "HEAD"])
        .quiet();
    match runner.output(&spec).await {
        Ok(output) if output.is_success() => {
            let commit = output.stdout.trim();
            (!commit.is_empty()).then(|| commit.to_string())
        }
        _ => None,
    }
}
