//! Helm values builder for a release

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::NamedTempFile;

use crate::deploy::{DeployConfig, EnvVars, ImageRef, MiniServiceConfig};

const DEFAULT_ALLOWED_ORIGINS: &str = "*";
const DEFAULT_MIGRATE: &str = "FALSE";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageValues {
    pub repository: String,
    pub tag: String,
}

/// Application settings, rendered by the chart into container env vars
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    pub allowed_origins: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub migrate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_submit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MiniServiceValues {
    pub enabled: bool,
    pub deposit_service: Toggle,
    pub settlement_service: Toggle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValues {
    pub app: AppValues,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,
}

/// Values document passed to `helm install/upgrade -f`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseValues {
    pub image: ImageValues,
    pub config: ConfigValues,
    pub mini_service: MiniServiceValues,
}

/// Builds [`ReleaseValues`] from a resolved image and the request config
#[derive(Debug, Clone, Default)]
pub struct ValuesBuilder {
    image: Option<ImageRef>,
    env_vars: EnvVars,
    mini_service: MiniServiceConfig,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ValuesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, image: &ImageRef) -> Self {
        self.image = Some(image.clone());
        self
    }

    pub fn env_vars(mut self, env_vars: &EnvVars) -> Self {
        self.env_vars = env_vars.clone();
        self
    }

    pub fn mini_service(mut self, mini_service: MiniServiceConfig) -> Self {
        self.mini_service = mini_service;
        self
    }

    pub fn config(self, config: &DeployConfig) -> Self {
        self.env_vars(&config.env_vars)
            .mini_service(config.mini_service)
    }

    pub fn build(self) -> Result<ReleaseValues> {
        let image = self
            .image
            .context("An image is required to build release values")?;
        let env = &self.env_vars;

        let app = AppValues {
            chain_id: non_blank(&env.chain_id),
            allowed_origins: non_blank(&env.allowed_origins)
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            deploy: non_blank(&env.deploy_value),
            remote: non_blank(&env.remote_value),
            migrate: non_blank(&env.migrate_value)
                .map(|v| v.to_uppercase())
                .unwrap_or_else(|| DEFAULT_MIGRATE.to_string()),
            migrate_image: non_blank(&env.migrate_image_value),
            image: non_blank(&env.image_value),
            auto_submit: non_blank(&env.auto_submit_value),
            settlement_contract_address: non_blank(&env.settlement_contract_address),
            rpc_provider: non_blank(&env.rpc_provider),
        };

        Ok(ReleaseValues {
            image: ImageValues {
                repository: image.name(),
                tag: image.tag.clone(),
            },
            config: ConfigValues {
                app,
                extra_env: env.custom.clone(),
            },
            mini_service: MiniServiceValues {
                enabled: self.mini_service.enabled,
                deposit_service: Toggle {
                    enabled: self.mini_service.deposit(),
                },
                settlement_service: Toggle {
                    enabled: self.mini_service.settlement(),
                },
            },
        })
    }
}

impl ReleaseValues {
    pub fn builder() -> ValuesBuilder {
        ValuesBuilder::new()
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize release values")
    }

    /// Write the values to a temporary file that lives as long as the handle
    pub fn write_temp(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("helm-deployer-values-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create values file")?;
        file.write_all(self.to_yaml()?.as_bytes())
            .context("Failed to write values file")?;
        file.flush().context("Failed to flush values file")?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageRef {
        ImageRef {
            registry: "ghcr.io".to_string(),
            repository: "acme/app".to_string(),
            tag: "feature-login-fix".to_string(),
            verified: true,
        }
    }

    #[test]
    fn test_defaults_applied() {
        let values = ReleaseValues::builder().image(&image()).build().unwrap();
        assert_eq!(values.image.repository, "ghcr.io/acme/app");
        assert_eq!(values.image.tag, "feature-login-fix");
        assert_eq!(values.config.app.allowed_origins, "*");
        assert_eq!(values.config.app.migrate, "FALSE");
        assert!(values.mini_service.deposit_service.enabled);
    }

    #[test]
    fn test_builder_requires_image() {
        assert!(ValuesBuilder::new().build().is_err());
    }

    #[test]
    fn test_yaml_generation() {
        let mut env = EnvVars {
            chain_id: Some("56".to_string()),
            rpc_provider: Some(" ".to_string()),
            migrate_value: Some("true".to_string()),
            ..Default::default()
        };
        env.custom.insert("LOG_LEVEL".to_string(), "debug".to_string());

        let config = DeployConfig {
            env_vars: env,
            mini_service: MiniServiceConfig {
                enabled: true,
                deposit_service_enabled: false,
                settlement_service_enabled: true,
            },
        };

        let yaml = ReleaseValues::builder()
            .image(&image())
            .config(&config)
            .build()
            .unwrap()
            .to_yaml()
            .unwrap();

        assert!(yaml.contains("repository: ghcr.io/acme/app"));
        assert!(yaml.contains("LOG_LEVEL: debug"));
        assert!(!yaml.contains("rpcProvider"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let app = &parsed["config"]["app"];
        assert_eq!(app["chainId"].as_str(), Some("56"));
        assert_eq!(app["migrate"].as_str(), Some("TRUE"));
        assert_eq!(
            parsed["miniService"]["depositService"]["enabled"],
            serde_yaml::Value::Bool(false)
        );
        assert_eq!(
            parsed["miniService"]["settlementService"]["enabled"],
            serde_yaml::Value::Bool(true)
        );
    }

    #[test]
    fn test_write_temp() {
        let values = ReleaseValues::builder().image(&image()).build().unwrap();
        let file = values.write_temp().unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert!(contents.contains("tag: feature-login-fix"));
    }
}
