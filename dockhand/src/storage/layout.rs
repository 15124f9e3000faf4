//! Local workspace layout

use std::path::PathBuf;

use crate::filesys::dir::Dir;

/// Workspace entry reserved for dockhand's own files; never a working copy
pub const STATE_DIR_NAME: &str = ".dockhand";

/// Where working copies and run logs live on the operator's machine
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Parent directory of all working copies
    pub base_dir: PathBuf,

    /// Override for the log directory
    pub log_dir: Option<PathBuf>,
}

impl WorkspaceLayout {
    /// Create a new workspace layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            log_dir: None,
        }
    }

    /// Use a log directory outside the workspace
    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }

    /// Get the working copy directory for a repository
    pub fn working_copy_dir(&self, repo_name: &str) -> Dir {
        Dir::new(self.base_dir.join(repo_name))
    }

    /// Get the logs directory, `<base>/.dockhand/logs` unless overridden
    pub fn logs_dir(&self) -> Dir {
        match &self.log_dir {
            Some(dir) => Dir::new(dir.clone()),
            None => Dir::new(self.base_dir.join(STATE_DIR_NAME).join("logs")),
        }
    }

    /// Whether `repo_name` would resolve to a directory dockhand owns
    pub fn is_reserved(&self, repo_name: &str) -> bool {
        repo_name == STATE_DIR_NAME
    }
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
