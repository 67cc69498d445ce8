//! Release inspection: classify what the cluster currently holds for a release

use thiserror::Error;

use super::cluster::{
    ClusterClient, ClusterError, DEFAULT_LOCK_REASON, ReleaseStatus, ReleaseSummary,
};

/// Current state of the target release.
///
/// Derived fresh on every inspection; other actors may change the cluster
/// between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseState {
    Absent,
    Healthy(String),
    Locked { release: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to list releases in namespace '{namespace}': {source}")]
pub struct InspectionError {
    pub namespace: String,
    #[source]
    pub source: ClusterError,
}

pub struct ReleaseInspector<'a> {
    cluster: &'a dyn ClusterClient,
}

impl<'a> ReleaseInspector<'a> {
    pub fn new(cluster: &'a dyn ClusterClient) -> Self {
        Self { cluster }
    }

    /// Inspect `namespace` for `release_name`.
    ///
    /// A listing failure is returned as an error, never as `Absent`.
    pub fn inspect(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Result<ReleaseState, InspectionError> {
        let releases = self
            .cluster
            .list_releases(namespace)
            .map_err(|source| InspectionError {
                namespace: namespace.to_string(),
                source,
            })?;

        tracing::debug!(
            namespace,
            release = release_name,
            found = releases.len(),
            "listed releases"
        );

        Ok(classify(&releases, release_name))
    }
}

/// Classify the entry for `release_name` within a namespace listing
pub fn classify(releases: &[ReleaseSummary], release_name: &str) -> ReleaseState {
    let Some(release) = releases.iter().find(|r| r.name == release_name) else {
        return ReleaseState::Absent;
    };

    match release.status {
        ReleaseStatus::Healthy => ReleaseState::Healthy(release.name.clone()),
        ReleaseStatus::Locked => ReleaseState::Locked {
            release: release.name.clone(),
            reason: release
                .lock_reason
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCK_REASON.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::cluster::ReleaseHandle;
    use crate::deploy::request::DeployConfig;
    use crate::deploy::resolver::ImageRef;

    struct ListingOnly(Result<Vec<ReleaseSummary>, ClusterError>);

    impl ClusterClient for ListingOnly {
        fn list_releases(&self, _namespace: &str) -> Result<Vec<ReleaseSummary>, ClusterError> {
            self.0.clone()
        }

        fn install(
            &self,
            _: &str,
            _: &str,
            _: &ImageRef,
            _: &DeployConfig,
        ) -> Result<ReleaseHandle, ClusterError> {
            unreachable!("inspection never mutates")
        }

        fn upgrade(
            &self,
            _: &str,
            _: &str,
            _: &ImageRef,
            _: &DeployConfig,
        ) -> Result<ReleaseHandle, ClusterError> {
            unreachable!("inspection never mutates")
        }

        fn cancel_operation(&self, _: &str, _: &str) -> Result<(), ClusterError> {
            unreachable!("inspection never mutates")
        }
    }

    #[test]
    fn test_absent_when_no_match() {
        let releases = vec![ReleaseSummary::healthy("other-app")];
        assert_eq!(classify(&releases, "acme-app"), ReleaseState::Absent);
        assert_eq!(classify(&[], "acme-app"), ReleaseState::Absent);
    }

    #[test]
    fn test_healthy_match() {
        let releases = vec![
            ReleaseSummary::healthy("other-app"),
            ReleaseSummary::healthy("acme-app"),
        ];
        assert_eq!(
            classify(&releases, "acme-app"),
            ReleaseState::Healthy("acme-app".to_string())
        );
    }

    #[test]
    fn test_locked_match_keeps_reason() {
        let releases = vec![ReleaseSummary::locked("acme-app", "pending-upgrade")];
        assert_eq!(
            classify(&releases, "acme-app"),
            ReleaseState::Locked {
                release: "acme-app".to_string(),
                reason: "pending-upgrade".to_string()
            }
        );
    }

    #[test]
    fn test_locked_without_reason_gets_default() {
        let mut summary = ReleaseSummary::locked("acme-app", "");
        summary.lock_reason = None;
        match classify(&[summary], "acme-app") {
            ReleaseState::Locked { reason, .. } => assert_eq!(reason, DEFAULT_LOCK_REASON),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn test_listing_failure_is_not_absent() {
        let cluster = ListingOnly(Err(ClusterError::connectivity("connection refused")));
        let err = ReleaseInspector::new(&cluster)
            .inspect("prod", "acme-app")
            .unwrap_err();
        assert_eq!(err.namespace, "prod");
        assert!(err.to_string().contains("connection refused"));
    }
}
