//! Cluster client backed by the Kubernetes API and the helm CLI

use anyhow::Result;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::connection::{KubeconfigSource, create_kube_client};
use super::helm::{HelmCli, ReleaseOp};
use super::releases::{self, HELM_OWNER_SELECTOR, StoredRevision};
use crate::config::{ReleaseValues, Settings};
use crate::deploy::{
    ClusterClient, ClusterError, ClusterErrorKind, DeployConfig, ImageRef, ReleaseHandle,
    ReleaseSummary,
};
use crate::utils::dryrun;

/// Error kind for an API server status code
pub fn classify_status(code: u16) -> ClusterErrorKind {
    match code {
        401 | 403 => ClusterErrorKind::Unauthorized,
        408 | 504 => ClusterErrorKind::Timeout,
        _ => ClusterErrorKind::Other,
    }
}

/// Map a kube client error onto the engine's error kinds
pub fn classify_kube_error(err: &kube::Error) -> ClusterErrorKind {
    match err {
        kube::Error::Api(resp) => classify_status(resp.code),
        _ => ClusterErrorKind::Connectivity,
    }
}

pub struct HelmClusterClient {
    rt: Runtime,
    client: Client,
    helm: HelmCli,
    api_timeout: Duration,
    // Keeps an inline kubeconfig file alive for helm
    _kubeconfig: KubeconfigSource,
}

impl HelmClusterClient {
    pub fn connect(source: KubeconfigSource, settings: &Settings) -> Result<Self> {
        let (rt, client) = create_kube_client(&source)?;
        let helm = HelmCli::from_settings(&settings.helm, source.path())?;

        Ok(Self {
            rt,
            client,
            helm,
            api_timeout: settings.cluster.api_timeout(),
            _kubeconfig: source,
        })
    }

    fn call<T, F>(&self, what: &str, fut: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        let limit = self.api_timeout;
        self.rt.block_on(async {
            match tokio::time::timeout(limit, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(ClusterError::new(
                    classify_kube_error(&e),
                    format!("Failed to {}: {}", what, e),
                )),
                Err(_) => Err(ClusterError::new(
                    ClusterErrorKind::Timeout,
                    format!("Timed out after {}s trying to {}", limit.as_secs(), what),
                )),
            }
        })
    }

    fn stored_revisions(
        &self,
        namespace: &str,
        release: Option<&str>,
    ) -> Result<Vec<StoredRevision>, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let selector = match release {
            Some(name) => format!("{},name={}", HELM_OWNER_SELECTOR, name),
            None => HELM_OWNER_SELECTOR.to_string(),
        };
        let lp = ListParams::default().labels(&selector);

        let list = self.call(
            &format!("list helm releases in namespace '{}'", namespace),
            api.list_metadata(&lp),
        )?;

        Ok(list
            .items
            .iter()
            .filter_map(|meta| {
                let name = meta.metadata.name.as_deref()?;
                let labels = meta.metadata.labels.as_ref()?;
                StoredRevision::from_labels(name, labels)
            })
            .collect())
    }

    fn apply(
        &self,
        op: ReleaseOp,
        namespace: &str,
        release_name: &str,
        image: &ImageRef,
        config: &DeployConfig,
    ) -> Result<ReleaseHandle, ClusterError> {
        let values = ReleaseValues::builder()
            .image(image)
            .config(config)
            .build()
            .map_err(|e| ClusterError::other(e.to_string()))?;

        if dryrun::is_dry_run() {
            dryrun::log_action(&format!(
                "Would run helm {} {} in namespace {} with image {}",
                if op == ReleaseOp::Install { "install" } else { "upgrade" },
                release_name,
                namespace,
                image
            ));
            return Ok(ReleaseHandle {
                namespace: namespace.to_string(),
                name: release_name.to_string(),
                revision: None,
            });
        }

        let values_file = values
            .write_temp()
            .map_err(|e| ClusterError::other(format!("{:#}", e)))?;

        let release = self
            .helm
            .apply_release(op, namespace, release_name, values_file.path())?;

        tracing::info!(
            release = %release.name,
            revision = release.version,
            status = %release.info.status,
            "helm {} finished",
            self.helm.binary()
        );

        Ok(ReleaseHandle {
            namespace: namespace.to_string(),
            name: release.name,
            revision: Some(release.version),
        })
    }
}

impl ClusterClient for HelmClusterClient {
    fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, ClusterError> {
        let revisions = self.stored_revisions(namespace, None)?;
        Ok(releases::summarize(&revisions))
    }

    fn install(
        &self,
        namespace: &str,
        release_name: &str,
        image: &ImageRef,
        config: &DeployConfig,
    ) -> Result<ReleaseHandle, ClusterError> {
        self.apply(ReleaseOp::Install, namespace, release_name, image, config)
    }

    fn upgrade(
        &self,
        namespace: &str,
        release_name: &str,
        image: &ImageRef,
        config: &DeployConfig,
    ) -> Result<ReleaseHandle, ClusterError> {
        self.apply(ReleaseOp::Upgrade, namespace, release_name, image, config)
    }

    /// Remove the storage secret of a stuck pending revision.
    ///
    /// Helm then sees the previous revision (or no release at all) as latest.
    fn cancel_operation(&self, namespace: &str, release_name: &str) -> Result<(), ClusterError> {
        let revisions = self.stored_revisions(namespace, Some(release_name))?;

        let Some(pending) = releases::pending_revision(&revisions, release_name) else {
            tracing::debug!(release = release_name, "no pending operation to cancel");
            return Ok(());
        };

        if dryrun::is_dry_run() {
            dryrun::log_action(&format!(
                "Would delete secret {} ({}) in namespace {}",
                pending.secret_name, pending.status, namespace
            ));
            return Ok(());
        }

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let what = format!("delete secret {}", pending.secret_name);
        // A 404 means someone else cleaned up first
        let delete = async {
            match api.delete(&pending.secret_name, &DeleteParams::default()).await {
                Err(kube::Error::Api(ref resp)) if resp.code == 404 => Ok(()),
                other => other.map(|_| ()),
            }
        };
        self.call(&what, delete)?;

        crate::log_info!(
            "Removed stuck {} revision {} of release {}",
            pending.status,
            pending.revision,
            release_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(403), ClusterErrorKind::Unauthorized);
        assert_eq!(classify_status(401), ClusterErrorKind::Unauthorized);
        assert_eq!(classify_status(504), ClusterErrorKind::Timeout);
        assert_eq!(classify_status(500), ClusterErrorKind::Other);
        assert_eq!(classify_status(404), ClusterErrorKind::Other);
    }
}
