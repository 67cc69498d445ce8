//! Deploy request model and validation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

use super::repository::{self, Repository};

static CONTENT_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{32}$").expect("content hash pattern is valid"));

/// Rejections raised before any collaborator is contacted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid repository URL '{0}' (expected https://<host>/<owner>/<repo>[/tree/<branch>])")]
    InvalidRepository(String),

    #[error("invalid namespace '{0}' (must be a lowercase DNS-1123 label of at most 63 characters)")]
    InvalidNamespace(String),

    #[error("invalid release name '{0}' (must be lowercase alphanumeric or '-', at most 53 characters)")]
    InvalidReleaseName(String),

    #[error("{field} must be a 32-character hexadecimal content hash, got '{value}'")]
    InvalidContentHash { field: &'static str, value: String },

    #[error("migrateImageValue is required when migrateValue is TRUE")]
    MissingMigrateImage,
}

/// Recognized deployment parameters plus free-form overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvVars {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate_value: Option<String>,
    /// Content hash of the image to migrate from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate_image_value: Option<String>,
    /// Content hash of the image being deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_submit_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_provider: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl EnvVars {
    /// Treat blank form values as absent
    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn migrate_enabled(&self) -> bool {
        Self::present(&self.migrate_value)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        for (field, value) in [
            ("imageValue", &self.image_value),
            ("migrateImageValue", &self.migrate_image_value),
        ] {
            if let Some(v) = Self::present(value)
                && !CONTENT_HASH.is_match(v)
            {
                return Err(RequestError::InvalidContentHash {
                    field,
                    value: v.to_string(),
                });
            }
        }

        if self.migrate_enabled() && Self::present(&self.migrate_image_value).is_none() {
            return Err(RequestError::MissingMigrateImage);
        }

        Ok(())
    }
}

/// Toggles for the optional auxiliary services deployed next to the main one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiniServiceConfig {
    pub enabled: bool,
    pub deposit_service_enabled: bool,
    pub settlement_service_enabled: bool,
}

impl Default for MiniServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            deposit_service_enabled: true,
            settlement_service_enabled: true,
        }
    }
}

impl MiniServiceConfig {
    pub fn deposit(&self) -> bool {
        self.enabled && self.deposit_service_enabled
    }

    pub fn settlement(&self) -> bool {
        self.enabled && self.settlement_service_enabled
    }
}

/// Release configuration handed to the cluster client on install/upgrade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    pub env_vars: EnvVars,
    pub mini_service: MiniServiceConfig,
}

/// A request to deploy a repository into a namespace.
///
/// Immutable once submitted. A caller that receives `ExistingDeployment`
/// resubmits a copy built with [`DeployRequest::as_upgrade`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    #[serde(alias = "githubUrl")]
    pub repository_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub namespace: String,
    #[serde(default)]
    pub force_image_tag: bool,
    #[serde(default)]
    pub upgrade_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(flatten)]
    pub config: DeployConfig,
}

/// The parts of a request that survive validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub repository: Repository,
    /// Explicit branch, else the branch embedded in the URL
    pub branch: Option<String>,
    /// Explicit release name, else the repository naming convention
    pub release_name: String,
}

impl DeployRequest {
    pub fn new(repository_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: None,
            namespace: namespace.into(),
            force_image_tag: false,
            upgrade_only: false,
            release_name: None,
            config: DeployConfig::default(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_release_name(mut self, name: impl Into<String>) -> Self {
        self.release_name = Some(name.into());
        self
    }

    pub fn with_config(mut self, config: DeployConfig) -> Self {
        self.config = config;
        self
    }

    pub fn force_image_tag(mut self, force: bool) -> Self {
        self.force_image_tag = force;
        self
    }

    /// Resubmission of this request as an explicit upgrade of `release`
    pub fn as_upgrade(&self, release: impl Into<String>) -> Self {
        Self {
            upgrade_only: true,
            release_name: Some(release.into()),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<ValidatedRequest, RequestError> {
        repository::validate_namespace(&self.namespace)?;
        let repository = Repository::parse(&self.repository_url)?;

        let branch = self
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .or_else(|| repository.branch.clone());

        let explicit = self
            .release_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let release_name = explicit
            .map(str::to_string)
            .unwrap_or_else(|| repository.release_name());
        repository::validate_release_name(&release_name)?;

        self.config.env_vars.validate()?;

        Ok(ValidatedRequest {
            repository,
            branch,
            release_name,
        })
    }
}
