//! Parameter collection and validation

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::{Host, Url};

use crate::config::prompt::Prompter;
use crate::config::settings::DeploymentSettings;
use crate::config::DeploymentConfig;
use crate::errors::DeployError;
use crate::filesys::file::File;

/// Branch used when the operator does not name one
pub const DEFAULT_BRANCH: &str = "main";

/// Operator input as collected, before validation
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub repo_url: Option<String>,
    pub token: Option<SecretString>,
    pub branch: Option<String>,
    pub ssh_user: Option<String>,
    pub server: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub port: Option<String>,
}

impl RawParams {
    /// Fill fields missing here from a lower-precedence source
    pub fn or(self, fallback: RawParams) -> RawParams {
        RawParams {
            repo_url: self.repo_url.or(fallback.repo_url),
            token: self.token.or(fallback.token),
            branch: self.branch.or(fallback.branch),
            ssh_user: self.ssh_user.or(fallback.ssh_user),
            server: self.server.or(fallback.server),
            ssh_key: self.ssh_key.or(fallback.ssh_key),
            port: self.port.or(fallback.port),
        }
    }

    /// Ask the operator for every field that is still missing.
    ///
    /// The branch prompt offers `main` as its default; all other answers are
    /// taken verbatim and checked later by [`RawParams::validate`].
    pub fn prompt_missing(mut self, prompter: &dyn Prompter) -> Result<RawParams, DeployError> {
        if self.repo_url.is_none() {
            self.repo_url = Some(prompter.input("Git repository URL", None)?);
        }
        if self.token.is_none() {
            self.token = Some(prompter.secret("Personal access token")?);
        }
        if self.branch.is_none() {
            self.branch = Some(prompter.input("Branch", Some(DEFAULT_BRANCH))?);
        }
        if self.ssh_user.is_none() {
            self.ssh_user = Some(prompter.input("SSH username", None)?);
        }
        if self.server.is_none() {
            self.server = Some(prompter.input("Server IP address", None)?);
        }
        if self.ssh_key.is_none() {
            self.ssh_key = Some(PathBuf::from(prompter.input("SSH key path", None)?));
        }
        if self.port.is_none() {
            self.port = Some(prompter.input("Application port", None)?);
        }
        Ok(self)
    }

    /// Validate every field, failing on the first invalid one.
    ///
    /// Fields are checked in collection order: repository URL, token, branch,
    /// SSH user, server, key path, port.
    pub async fn validate(self, git_username: &str) -> Result<DeploymentConfig, DeployError> {
        let repo_url = validate_repo_url(self.repo_url.as_deref())?;
        let token = validate_token(self.token)?;
        let branch = validate_branch(self.branch.as_deref())?;
        let ssh_user = validate_ssh_user(self.ssh_user.as_deref())?;
        let server = validate_server(self.server.as_deref())?;
        let ssh_key = validate_ssh_key(self.ssh_key.as_deref()).await?;
        let app_port = validate_port(self.port.as_deref())?;

        if git_username.is_empty() {
            return Err(DeployError::Config("git username must not be empty".to_string()));
        }

        debug!("Validated parameters for {}", repo_url);
        Ok(DeploymentConfig {
            repo_url,
            token,
            branch,
            ssh_user,
            server,
            ssh_key,
            app_port,
            git_username: git_username.to_string(),
        })
    }
}

/// Merge the parameter sources and validate the result.
///
/// `params` holds the command line and environment values already merged
/// over the settings file. A prompter, when given, fills whatever is still
/// missing; without one a missing field fails validation.
pub async fn collect(
    params: RawParams,
    prompter: Option<&dyn Prompter>,
    git_username: &str,
) -> Result<DeploymentConfig, DeployError> {
    let params = match prompter {
        Some(prompter) => params.prompt_missing(prompter)?,
        None => params,
    };
    params.validate(git_username).await
}

impl From<DeploymentSettings> for RawParams {
    fn from(settings: DeploymentSettings) -> Self {
        RawParams {
            repo_url: settings.repo_url,
            token: settings.token,
            branch: settings.branch,
            ssh_user: settings.ssh_user,
            server: settings.server,
            ssh_key: settings.ssh_key,
            port: settings.port,
        }
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, DeployError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DeployError::validation(field, "value is required")),
    }
}

pub fn validate_repo_url(value: Option<&str>) -> Result<Url, DeployError> {
    let raw = required("repository URL", value)?;
    let url = Url::parse(raw)
        .map_err(|e| DeployError::validation("repository URL", format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DeployError::validation(
            "repository URL",
            format!("{raw}: must start with http:// or https://"),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(DeployError::validation("repository URL", format!("{raw}: missing host")));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(DeployError::validation(
            "repository URL",
            "must not embed credentials; pass the token separately",
        ));
    }
    if repo_name_of(&url).is_none() {
        return Err(DeployError::validation(
            "repository URL",
            format!("{raw}: missing repository path"),
        ));
    }
    Ok(url)
}

/// Last path segment of a repository URL without a `.git` suffix
pub fn repo_name_of(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let name = segment.strip_suffix(".git").unwrap_or(segment);
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn validate_token(value: Option<SecretString>) -> Result<SecretString, DeployError> {
    match value {
        Some(token) if !token.expose_secret().trim().is_empty() => {
            Ok(SecretString::from(token.expose_secret().trim()))
        }
        _ => Err(DeployError::validation("access token", "value is required")),
    }
}

pub fn validate_branch(value: Option<&str>) -> Result<String, DeployError> {
    let branch = match value.map(str::trim) {
        None | Some("") => DEFAULT_BRANCH,
        Some(branch) => branch,
    };

    let invalid = branch.starts_with('-')
        || branch.contains("..")
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));
    if invalid {
        return Err(DeployError::validation(
            "branch",
            format!("{branch}: not a valid branch name"),
        ));
    }
    Ok(branch.to_string())
}

pub fn validate_ssh_user(value: Option<&str>) -> Result<String, DeployError> {
    let user = required("SSH username", value)?;
    let mut chars = user.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(first_ok && rest_ok) {
        return Err(DeployError::validation(
            "SSH username",
            format!("{user}: only letters, digits, '_', '.' and '-' are allowed"),
        ));
    }
    Ok(user.to_string())
}

pub fn validate_server(value: Option<&str>) -> Result<String, DeployError> {
    let server = required("server address", value)?;
    // Host::parse accepts bracketed IPv6 only; ssh wants it bare
    let candidate = if server.contains(':') && !server.starts_with('[') {
        format!("[{server}]")
    } else {
        server.to_string()
    };
    match Host::parse(&candidate) {
        Ok(Host::Domain(domain)) if domain.starts_with('-') || domain.contains('/') => Err(
            DeployError::validation("server address", format!("{server}: not a valid host")),
        ),
        Ok(_) => Ok(server.trim_start_matches('[').trim_end_matches(']').to_string()),
        Err(e) => Err(DeployError::validation(
            "server address",
            format!("{server}: {e}"),
        )),
    }
}

pub async fn validate_ssh_key(value: Option<&Path>) -> Result<PathBuf, DeployError> {
    let raw = match value {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => return Err(DeployError::validation("SSH key path", "value is required")),
    };
    let path = expand_home(raw);
    let file = File::new(&path);
    if !file.exists().await {
        return Err(DeployError::validation(
            "SSH key path",
            format!("{} does not exist or is not a file", path.display()),
        ));
    }
    if !file.is_readable().await {
        return Err(DeployError::validation(
            "SSH key path",
            format!("{} is not readable", path.display()),
        ));
    }
    Ok(path)
}

pub fn validate_port(value: Option<&str>) -> Result<u16, DeployError> {
    let raw = required("application port", value)?;
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(DeployError::validation(
            "application port",
            format!("{raw}: must be numeric"),
        ));
    }
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(DeployError::validation(
            "application port",
            format!("{raw}: must be between 1 and 65535"),
        )),
    }
}

/// Expand a leading `~` to the operator's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
