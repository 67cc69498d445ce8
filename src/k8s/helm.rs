//! Helm CLI wrapper utilities

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::settings::HelmSettings;
use crate::deploy::{ClusterError, ClusterErrorKind};
use crate::utils::process::{ProcessError, output_with_timeout};

/// Extra time allowed past helm's own `--timeout` before the process is killed
const WAIT_GRACE: Duration = Duration::from_secs(30);

static INGRESS_CONFLICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)ingress.*(already defined|already exists|conflict|cannot be imported)")
        .expect("ingress conflict pattern is valid")
});

/// Release as printed by `helm install/upgrade --output json`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HelmRelease {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub info: HelmReleaseInfo,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HelmReleaseInfo {
    #[serde(default)]
    pub status: String,
}

/// Which helm subcommand a release operation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOp {
    Install,
    Upgrade,
}

impl ReleaseOp {
    fn subcommand(&self) -> &'static str {
        match self {
            ReleaseOp::Install => "install",
            ReleaseOp::Upgrade => "upgrade",
        }
    }
}

/// Classify helm's stderr into a structured error kind.
///
/// This is the only place where failure text is interpreted.
pub fn classify_failure(stderr: &str) -> ClusterErrorKind {
    let lower = stderr.to_lowercase();

    if lower.contains("another operation (install/upgrade/rollback) is in progress")
        || lower.contains("another operation in progress")
    {
        ClusterErrorKind::OperationInProgress
    } else if INGRESS_CONFLICT.is_match(&lower) {
        ClusterErrorKind::IngressConflict
    } else if lower.contains("timed out waiting") || lower.contains("context deadline exceeded")
    {
        ClusterErrorKind::Timeout
    } else if lower.contains("kubernetes cluster unreachable")
        || lower.contains("connection refused")
        || lower.contains("no such host")
    {
        ClusterErrorKind::Connectivity
    } else if lower.contains("forbidden") || lower.contains("unauthorized") {
        ClusterErrorKind::Unauthorized
    } else {
        ClusterErrorKind::Other
    }
}

/// Thin wrapper around the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
    kubeconfig: Option<PathBuf>,
    chart: String,
    chart_version: Option<String>,
    extra_args: Vec<String>,
    timeout: Duration,
    create_namespace: bool,
    wait: bool,
}

impl HelmCli {
    pub fn from_settings(settings: &HelmSettings, kubeconfig: Option<&Path>) -> Result<Self> {
        Ok(Self {
            binary: settings.binary.clone(),
            kubeconfig: kubeconfig.map(Path::to_path_buf),
            chart: settings.chart.clone(),
            chart_version: settings.chart_version.clone(),
            extra_args: settings.extra_args()?,
            timeout: settings.timeout(),
            create_namespace: settings.create_namespace,
            wait: settings.wait,
        })
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for `helm install|upgrade <release> <chart> ...`
    pub fn release_args(
        &self,
        op: ReleaseOp,
        namespace: &str,
        release: &str,
        values_file: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            op.subcommand().to_string(),
            release.to_string(),
            self.chart.clone(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--values".to_string(),
            values_file.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];

        if op == ReleaseOp::Install && self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(version) = &self.chart_version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if self.wait {
            args.push("--wait".to_string());
            args.push("--timeout".to_string());
            args.push(format!("{}s", self.timeout.as_secs()));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Wall-clock bound on one helm run. With `--wait` helm enforces
    /// `timeout` itself, so the process gets a grace period on top.
    pub fn process_limit(&self) -> Duration {
        if self.wait {
            self.timeout + WAIT_GRACE
        } else {
            self.timeout
        }
    }

    /// Run helm and capture stdout; failures carry a classified error
    pub fn run_output(&self, args: &[String]) -> Result<String, ClusterError> {
        let mut cmd = Command::new(&self.binary);

        if let Some(kc) = &self.kubeconfig {
            cmd.env("KUBECONFIG", kc);
        }

        cmd.args(args);
        tracing::debug!(command = %format!("{} {}", self.binary, args.join(" ")), "running helm");

        let output = output_with_timeout(&mut cmd, self.process_limit()).map_err(|e| match e {
            ProcessError::TimedOut { .. } => ClusterError::new(ClusterErrorKind::Timeout, e.to_string()),
            _ => ClusterError::other(e.to_string()),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ClusterError::new(classify_failure(&stderr), stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Install or upgrade `release` with the given values file
    pub fn apply_release(
        &self,
        op: ReleaseOp,
        namespace: &str,
        release: &str,
        values_file: &Path,
    ) -> Result<HelmRelease, ClusterError> {
        let args = self.release_args(op, namespace, release, values_file);
        let stdout = self.run_output(&args)?;
        parse_release(&stdout)
    }
}

/// Parse `--output json`; helm may print warnings before the document
pub fn parse_release(stdout: &str) -> Result<HelmRelease, ClusterError> {
    let start = stdout.find('{').unwrap_or(0);
    serde_json::from_str(&stdout[start..]).map_err(|e| {
        ClusterError::other(format!("Unexpected helm output ({}): {}", e, stdout.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> HelmCli {
        HelmCli::from_settings(&HelmSettings::default(), None).unwrap()
    }

    #[test]
    fn test_classify_operation_in_progress() {
        let stderr = "Error: UPGRADE FAILED: another operation (install/upgrade/rollback) is in progress";
        assert_eq!(
            classify_failure(stderr),
            ClusterErrorKind::OperationInProgress
        );
    }

    #[test]
    fn test_classify_ingress_conflicts() {
        let nginx = r#"Error: INSTALLATION FAILED: admission webhook "validate.nginx.ingress.kubernetes.io" denied the request: host "app.example.com" and path "/" is already defined in ingress prod/other"#;
        assert_eq!(classify_failure(nginx), ClusterErrorKind::IngressConflict);

        let ownership = r#"Error: INSTALLATION FAILED: rendered manifests contain a resource that already exists. Unable to continue with install: Ingress "app" in namespace "prod" exists and cannot be imported into the current release"#;
        assert_eq!(classify_failure(ownership), ClusterErrorKind::IngressConflict);
    }

    #[test]
    fn test_classify_other_kinds() {
        assert_eq!(
            classify_failure("Error: Kubernetes cluster unreachable: dial tcp 10.0.0.1:6443: connection refused"),
            ClusterErrorKind::Connectivity
        );
        assert_eq!(
            classify_failure("Error: UPGRADE FAILED: timed out waiting for the condition"),
            ClusterErrorKind::Timeout
        );
        assert_eq!(
            classify_failure("secrets is forbidden: User \"dev\" cannot list resource"),
            ClusterErrorKind::Unauthorized
        );
        assert_eq!(
            classify_failure("Error: chart \"app\" not found"),
            ClusterErrorKind::Other
        );
    }

    #[test]
    fn test_install_args() {
        let args = cli().release_args(
            ReleaseOp::Install,
            "prod",
            "acme-app",
            Path::new("/tmp/values.yaml"),
        );
        assert_eq!(&args[..3], ["install", "acme-app", "oci://ghcr.io/helm-deployer/charts/app"]);
        assert!(args.contains(&"--create-namespace".to_string()));
        assert!(args.windows(2).any(|w| w == ["--namespace", "prod"]));
        assert!(args.windows(2).any(|w| w == ["--timeout", "300s"]));
    }

    #[test]
    fn test_upgrade_args_skip_create_namespace() {
        let mut settings = HelmSettings::default();
        settings.extra_args = "--atomic".to_string();
        settings.chart_version = Some("1.2.3".to_string());
        let args = HelmCli::from_settings(&settings, None)
            .unwrap()
            .release_args(ReleaseOp::Upgrade, "prod", "acme-app", Path::new("v.yaml"));
        assert_eq!(args[0], "upgrade");
        assert!(!args.contains(&"--create-namespace".to_string()));
        assert!(args.windows(2).any(|w| w == ["--version", "1.2.3"]));
        assert_eq!(args.last().map(String::as_str), Some("--atomic"));
    }

    #[test]
    fn test_parse_release_output() {
        let stdout = "WARNING: kubeconfig is group-readable\n{\"name\":\"acme-app\",\"namespace\":\"prod\",\"version\":3,\"info\":{\"status\":\"deployed\"},\"config\":{}}";
        let release = parse_release(stdout).unwrap();
        assert_eq!(release.name, "acme-app");
        assert_eq!(release.version, 3);
        assert_eq!(release.info.status, "deployed");

        assert!(parse_release("not json").is_err());
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let mut settings = HelmSettings::default();
        settings.binary = "nonexistent-helm-xyz".to_string();
        let helm = HelmCli::from_settings(&settings, None).unwrap();
        let err = helm.run_output(&["version".to_string()]).unwrap_err();
        assert_eq!(err.kind, ClusterErrorKind::Other);
        assert!(err.message.contains("nonexistent-helm-xyz"));
    }

    #[test]
    fn test_process_limit_follows_wait() {
        let mut settings = HelmSettings::default();
        settings.timeout_secs = 120;
        let helm = HelmCli::from_settings(&settings, None).unwrap();
        assert_eq!(helm.process_limit(), Duration::from_secs(120) + WAIT_GRACE);

        settings.wait = false;
        let helm = HelmCli::from_settings(&settings, None).unwrap();
        assert_eq!(helm.process_limit(), Duration::from_secs(120));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_helm_is_a_timeout() {
        let mut settings = HelmSettings::default();
        settings.binary = "sleep".to_string();
        settings.timeout_secs = 1;
        settings.wait = false;
        let helm = HelmCli::from_settings(&settings, None).unwrap();
        let err = helm.run_output(&["30".to_string()]).unwrap_err();
        assert_eq!(err.kind, ClusterErrorKind::Timeout);
    }
}
