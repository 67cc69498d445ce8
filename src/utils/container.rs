//! Container runtime detection and operations (Docker/Podman)

use anyhow::{Result, anyhow};
use std::process::Command;
use std::time::Duration;

use super::process::output_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

/// stderr fragments meaning the manifest simply does not exist
const MISSING_MANIFEST: &[&str] = &[
    "no such manifest",
    "manifest unknown",
    "not found",
    "manifest_unknown",
];

impl ContainerRuntime {
    /// Detect which container runtime is available
    pub fn detect() -> Result<Self> {
        // Check for docker first
        if which::which("docker").is_ok() {
            tracing::debug!("Using container runtime: docker");
            return Ok(ContainerRuntime::Docker);
        }

        // Fall back to podman
        if which::which("podman").is_ok() {
            tracing::debug!("Using container runtime: podman");
            return Ok(ContainerRuntime::Podman);
        }

        Err(anyhow!(
            "Neither docker nor podman found. Install one of them, or set \
             registry.backend = \"http\":\n  \
             - Docker: https://docs.docker.com/get-docker/\n  \
             - Podman: https://podman.io/getting-started/installation"
        ))
    }

    /// Get the command name for this runtime
    pub fn command(&self) -> &str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// Whether `image` exists in its remote registry, without pulling it.
    ///
    /// Uses the runtime's stored registry credentials. A run longer than
    /// `limit` is killed and reported as [`super::process::ProcessError::TimedOut`].
    pub fn manifest_exists(&self, image: &str, limit: Duration) -> Result<bool> {
        let output = output_with_timeout(
            Command::new(self.command()).args(["manifest", "inspect", image]),
            limit,
        )?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_manifest(&stderr) {
            return Ok(false);
        }

        Err(anyhow!(
            "{} manifest inspect {} failed: {}",
            self.command(),
            image,
            stderr.trim()
        ))
    }
}

fn is_missing_manifest(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    MISSING_MANIFEST.iter().any(|m| lower.contains(m))
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}
