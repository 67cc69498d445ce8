//! Kubeconfig resolution, client creation and connection checks

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::runtime::Runtime;

use crate::config::Settings;
use crate::utils::paths::expand_home;

/// Environment variable holding a base64-encoded kubeconfig
pub const KUBECONFIG_BASE64_ENV: &str = "KUBECONFIG_BASE64";

/// Where the cluster credentials come from
#[derive(Debug)]
pub enum KubeconfigSource {
    /// A kubeconfig file on disk
    Path(PathBuf),
    /// Decoded from KUBECONFIG_BASE64 into a private temp file
    Inline(NamedTempFile),
    /// kube's own inference (KUBECONFIG, ~/.kube/config, in-cluster)
    Inferred,
}

impl KubeconfigSource {
    /// File to hand to helm, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            KubeconfigSource::Path(path) => Some(path),
            KubeconfigSource::Inline(file) => Some(file.path()),
            KubeconfigSource::Inferred => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            KubeconfigSource::Path(path) => path.display().to_string(),
            KubeconfigSource::Inline(_) => format!("${}", KUBECONFIG_BASE64_ENV),
            KubeconfigSource::Inferred => "default kubeconfig".to_string(),
        }
    }
}

/// Resolve credentials from the process environment.
///
/// Priority: `--kubeconfig`/KUBECONFIG, then KUBECONFIG_BASE64, then
/// `defaults.kubeconfig_path`, then kube's inference.
pub fn resolve_kubeconfig(explicit: Option<&Path>, settings: &Settings) -> Result<KubeconfigSource> {
    let encoded = std::env::var(KUBECONFIG_BASE64_ENV).ok();
    resolve_kubeconfig_from(explicit, encoded.as_deref(), settings)
}

pub fn resolve_kubeconfig_from(
    explicit: Option<&Path>,
    encoded: Option<&str>,
    settings: &Settings,
) -> Result<KubeconfigSource> {
    if let Some(path) = explicit {
        return Ok(KubeconfigSource::Path(path.to_path_buf()));
    }

    if let Some(encoded) = encoded.map(str::trim).filter(|e| !e.is_empty()) {
        return decode_inline(encoded);
    }

    if let Some(path) = &settings.defaults.kubeconfig_path {
        return Ok(KubeconfigSource::Path(expand_home(path)));
    }

    Ok(KubeconfigSource::Inferred)
}

fn decode_inline(encoded: &str) -> Result<KubeconfigSource> {
    let decoded = BASE64
        .decode(encoded)
        .with_context(|| format!("{} is not valid base64", KUBECONFIG_BASE64_ENV))?;

    let mut file = tempfile::Builder::new()
        .prefix("helm-deployer-kubeconfig-")
        .tempfile()
        .context("Failed to create temporary kubeconfig")?;
    file.write_all(&decoded)
        .context("Failed to write temporary kubeconfig")?;
    file.flush().context("Failed to flush temporary kubeconfig")?;

    tracing::debug!(path = %file.path().display(), "decoded inline kubeconfig");
    Ok(KubeconfigSource::Inline(file))
}

/// Creates a kube client for `source`.
/// Returns both the tokio Runtime (needed for subsequent async calls) and the Client.
pub fn create_kube_client(source: &KubeconfigSource) -> Result<(Runtime, Client)> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let client = match source.path() {
        Some(path) => rt.block_on(async {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig: {}", path.display()))?;
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .with_context(|| format!("Invalid kubeconfig: {}", path.display()))?;
            Client::try_from(config).context("Failed to build Kubernetes client")
        })?,
        None => rt
            .block_on(Client::try_default())
            .context("Failed to connect to cluster. Is a kubeconfig available?")?,
    };

    Ok((rt, client))
}

/// Bound a kube API call by `limit`
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.with_context(|| format!("Failed to {}", what)),
        Err(_) => Err(anyhow!("Timed out after {}s trying to {}", limit.as_secs(), what)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClusterHealth {
    Healthy,
    Degraded,
}

/// Summary returned by a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub version: String,
    pub nodes: usize,
    pub ready_nodes: usize,
    pub pods: usize,
    pub namespaces: usize,
    pub status: ClusterHealth,
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Query the API server version and count nodes, pods and namespaces
pub fn test_connection(rt: &Runtime, client: &Client, limit: Duration) -> Result<ClusterInfo> {
    rt.block_on(async {
        let version = with_timeout(limit, "query server version", client.apiserver_version()).await?;

        let nodes: Api<Node> = Api::all(client.clone());
        let nodes = with_timeout(limit, "list nodes", nodes.list(&ListParams::default())).await?;

        let namespaces: Api<Namespace> = Api::all(client.clone());
        let namespaces = with_timeout(
            limit,
            "list namespaces",
            namespaces.list_metadata(&ListParams::default()),
        )
        .await?;

        let pods: Api<Pod> = Api::all(client.clone());
        let pods = with_timeout(limit, "list pods", pods.list_metadata(&ListParams::default())).await?;

        let ready_nodes = nodes.items.iter().filter(|n| node_ready(n)).count();
        let status = if ready_nodes == nodes.items.len() && ready_nodes > 0 {
            ClusterHealth::Healthy
        } else {
            ClusterHealth::Degraded
        };

        Ok(ClusterInfo {
            version: version.git_version,
            nodes: nodes.items.len(),
            ready_nodes,
            pods: pods.items.len(),
            namespaces: namespaces.items.len(),
            status,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let settings = Settings::default();
        let source = resolve_kubeconfig_from(
            Some(Path::new("/tmp/kc")),
            Some("aGVsbG8="),
            &settings,
        )
        .unwrap();
        assert_eq!(source.path(), Some(Path::new("/tmp/kc")));
    }

    #[test]
    fn test_inline_kubeconfig_is_decoded() {
        let settings = Settings::default();
        let encoded = BASE64.encode("apiVersion: v1\nkind: Config\n");
        let source = resolve_kubeconfig_from(None, Some(&encoded), &settings).unwrap();

        assert!(matches!(source, KubeconfigSource::Inline(_)));
        let path = source.path().unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("kind: Config"));
        assert_eq!(source.describe(), "$KUBECONFIG_BASE64");
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let settings = Settings::default();
        assert!(resolve_kubeconfig_from(None, Some("%%%"), &settings).is_err());
    }

    #[test]
    fn test_settings_then_inferred() {
        let mut settings = Settings::default();
        let source = resolve_kubeconfig_from(None, Some("  "), &settings).unwrap();
        assert!(matches!(source, KubeconfigSource::Inferred));
        assert!(source.path().is_none());

        settings.defaults.kubeconfig_path = Some("/etc/kube/config".to_string());
        let source = resolve_kubeconfig_from(None, None, &settings).unwrap();
        assert_eq!(source.path(), Some(Path::new("/etc/kube/config")));
    }

    #[test]
    fn test_cluster_info_serializes_camel_case() {
        let info = ClusterInfo {
            version: "v1.31.2".to_string(),
            nodes: 3,
            ready_nodes: 3,
            pods: 28,
            namespaces: 7,
            status: ClusterHealth::Healthy,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["readyNodes"], 3);
        assert_eq!(json["status"], "Healthy");
    }
}
