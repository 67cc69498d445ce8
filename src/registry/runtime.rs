//! Registry backend that asks the local docker/podman

use std::time::Duration;

use crate::deploy::{ImageRegistry, RegistryError};
use crate::utils::ContainerRuntime;
use crate::utils::process::ProcessError;

use super::http::is_valid_tag;

/// Checks tags with `<runtime> manifest inspect`, reusing the runtime's login
pub struct RuntimeRegistry {
    host: String,
    runtime: ContainerRuntime,
    timeout: Duration,
}

impl RuntimeRegistry {
    pub fn new(host: impl Into<String>, runtime: ContainerRuntime, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            runtime,
            timeout,
        }
    }
}

impl ImageRegistry for RuntimeRegistry {
    fn host(&self) -> &str {
        &self.host
    }

    fn tag_exists(&self, repository: &str, tag: &str) -> Result<bool, RegistryError> {
        if !is_valid_tag(tag) {
            return Ok(false);
        }

        let image = format!("{}/{}:{}", self.host, repository, tag);
        self.runtime
            .manifest_exists(&image, self.timeout)
            .map_err(|e| match e.downcast_ref::<ProcessError>() {
                Some(ProcessError::TimedOut { .. }) => RegistryError::Timeout { image },
                _ => RegistryError::Request {
                    image,
                    message: format!("{:#}", e),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_tag_skips_runtime() {
        let registry =
            RuntimeRegistry::new("ghcr.io", ContainerRuntime::Docker, Duration::from_secs(5));
        assert_eq!(registry.host(), "ghcr.io");
        assert_eq!(registry.tag_exists("acme/app", "feature/x"), Ok(false));
    }
}
