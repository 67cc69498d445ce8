//! Configuration file support for helm-deployer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub helm: HelmSettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub behavior: Behavior,
}

/// Default values for common operations
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Defaults {
    /// Namespace used when --namespace is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Kubeconfig used when neither --kubeconfig nor KUBECONFIG is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<String>,
}

/// How image tags are verified
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Query the registry's HTTP API directly
    #[default]
    Http,
    /// Ask the local docker/podman (`manifest inspect`)
    Runtime,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistrySettings {
    #[serde(default = "default_registry_host")]
    pub host: String,

    #[serde(default)]
    pub backend: RegistryBackend,

    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HelmSettings {
    #[serde(default = "default_helm_binary")]
    pub binary: String,

    /// Chart reference passed to `helm install/upgrade`
    #[serde(default = "default_chart")]
    pub chart: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,

    /// Extra arguments appended to every install/upgrade, shell-quoted
    #[serde(default)]
    pub extra_args: String,

    #[serde(default = "default_helm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub create_namespace: bool,

    #[serde(default = "default_true")]
    pub wait: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClusterSettings {
    /// Bound on each Kubernetes API call
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
}

/// Behavior settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Behavior {
    /// Offer to resubmit as an upgrade when a release already exists
    #[serde(default = "default_true")]
    pub confirm_upgrade: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,
}

// Default value functions
fn default_registry_host() -> String {
    "ghcr.io".to_string()
}

fn default_registry_timeout() -> u64 {
    15
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_chart() -> String {
    "oci://ghcr.io/helm-deployer/charts/app".to_string()
}

fn default_helm_timeout() -> u64 {
    300
}

fn default_api_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            host: default_registry_host(),
            backend: RegistryBackend::default(),
            timeout_secs: default_registry_timeout(),
        }
    }
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            chart: default_chart(),
            chart_version: None,
            extra_args: String::new(),
            timeout_secs: default_helm_timeout(),
            create_namespace: default_true(),
            wait: default_true(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            api_timeout_secs: default_api_timeout(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confirm_upgrade: default_true(),
            show_progress: default_true(),
        }
    }
}

impl RegistrySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl HelmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Split `extra_args` the way a shell would
    pub fn extra_args(&self) -> Result<Vec<String>> {
        shell_words::split(&self.extra_args)
            .with_context(|| format!("Invalid helm.extra_args: {}", self.extra_args))
    }
}

impl ClusterSettings {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

impl Settings {
    /// Load settings from an explicit file, the standard locations, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .helm-deployer.toml in current directory
    /// 2. ~/.config/helm-deployer/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".helm-deployer.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("helm-deployer").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String> {
        let header = "# helm-deployer configuration file\n\
                      # Place this file at ~/.config/helm-deployer/config.toml or .helm-deployer.toml in your project\n\n";
        Ok(format!("{}{}", header, Settings::default().to_toml()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.registry.host, "ghcr.io");
        assert_eq!(settings.registry.backend, RegistryBackend::Http);
        assert_eq!(settings.helm.binary, "helm");
        assert!(settings.helm.create_namespace);
        assert!(settings.behavior.confirm_upgrade);
        assert_eq!(settings.cluster.api_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_str = r#"
[defaults]
namespace = "staging"

[registry]
host = "registry.example.com"
backend = "runtime"

[helm]
chart = "./charts/app"
extra_args = "--atomic --set 'labels.team=core platform'"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.defaults.namespace.as_deref(), Some("staging"));
        assert_eq!(settings.registry.host, "registry.example.com");
        assert_eq!(settings.registry.backend, RegistryBackend::Runtime);
        assert_eq!(settings.registry.timeout_secs, 15);
        assert_eq!(settings.helm.chart, "./charts/app");
        assert_eq!(
            settings.helm.extra_args().unwrap(),
            vec!["--atomic", "--set", "labels.team=core platform"]
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"[cluster]\napi_timeout_secs = 5\n").unwrap();

        let settings = Settings::load(Some(temp.path())).unwrap();
        assert_eq!(settings.cluster.api_timeout_secs, 5);
        assert_eq!(settings.helm.timeout_secs, 300);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(Settings::load(Some(Path::new("/nonexistent/helm-deployer.toml"))).is_err());
    }

    #[test]
    fn test_example_config_round_trips() {
        let example = Settings::example_config().unwrap();
        assert!(example.contains("helm-deployer configuration"));
        assert!(example.contains("[registry]"));
        assert!(example.contains("[helm]"));
        let parsed: Settings = toml::from_str(&example).unwrap();
        assert_eq!(parsed.helm.chart, default_chart());
    }

    #[test]
    fn test_unbalanced_extra_args_rejected() {
        let helm = HelmSettings {
            extra_args: "--set 'oops".to_string(),
            ..Default::default()
        };
        assert!(helm.extra_args().is_err());
    }
}
