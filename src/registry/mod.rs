//! Image registry backends

pub mod http;
pub mod runtime;

use anyhow::Result;

use crate::config::{RegistryBackend, Settings};
use crate::deploy::ImageRegistry;
use crate::utils::ContainerRuntime;

pub use http::HttpRegistry;
pub use runtime::RuntimeRegistry;

/// Build the registry selected by `registry.backend`
pub fn build_registry(settings: &Settings) -> Result<Box<dyn ImageRegistry>> {
    let registry = &settings.registry;
    tracing::debug!(host = %registry.host, backend = ?registry.backend, "using image registry");

    match registry.backend {
        RegistryBackend::Http => Ok(Box::new(HttpRegistry::new(
            registry.host.clone(),
            registry.timeout(),
        )?)),
        RegistryBackend::Runtime => Ok(Box::new(RuntimeRegistry::new(
            registry.host.clone(),
            ContainerRuntime::detect()?,
            registry.timeout(),
        ))),
    }
}
