//! Build-method detection

use std::fmt;

use tracing::info;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// Compose file names, in lookup order
pub const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// How the application container is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMethod {
    /// Single image built from `Dockerfile`
    Dockerfile,

    /// Stack described by the named Compose file
    Compose(String),
}

impl fmt::Display for BuildMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMethod::Dockerfile => write!(f, "Dockerfile"),
            BuildMethod::Compose(file) => write!(f, "Compose ({})", file),
        }
    }
}

/// Inspect the working-copy root. A `Dockerfile` wins over a Compose file.
pub async fn detect_build_method(root: &Dir) -> Result<BuildMethod, DeployError> {
    if root.file("Dockerfile").exists().await {
        info!("Dockerfile found, using docker build");
        return Ok(BuildMethod::Dockerfile);
    }

    for name in COMPOSE_FILES {
        if root.file(name).exists().await {
            info!("{} found, using docker compose", name);
            return Ok(BuildMethod::Compose(name.to_string()));
        }
    }

    Err(DeployError::NoBuildDescriptor(
        root.path().display().to_string(),
    ))
}
