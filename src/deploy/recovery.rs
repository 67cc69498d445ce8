//! Stuck-operation recovery.
//!
//! Only ever invoked explicitly by the caller. It never re-runs the original
//! deploy; the caller resubmits once cleanup succeeds.

use serde::Deserialize;

use super::cluster::ClusterClient;
use super::outcome::CleanupResult;
use super::repository;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub namespace: String,
    pub release_name: String,
}

impl CleanupRequest {
    pub fn new(namespace: impl Into<String>, release_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            release_name: release_name.into(),
        }
    }
}

pub struct StuckOperationRecovery<'a> {
    cluster: &'a dyn ClusterClient,
}

impl<'a> StuckOperationRecovery<'a> {
    pub fn new(cluster: &'a dyn ClusterClient) -> Self {
        Self { cluster }
    }

    /// Cancel the pending operation on a release. Succeeds without effect
    /// when there is nothing to clean up.
    pub fn cleanup(&self, request: &CleanupRequest) -> CleanupResult {
        let result = |success: bool, message: String, error: Option<String>| CleanupResult {
            success,
            message,
            error,
            namespace: request.namespace.clone(),
            release_name: request.release_name.clone(),
        };

        if let Err(e) = repository::validate_namespace(&request.namespace)
            .and_then(|_| repository::validate_release_name(&request.release_name))
        {
            return result(false, "Cleanup request rejected".to_string(), Some(e.to_string()));
        }

        crate::log_info!(
            "Cleaning up pending operations on release {} in namespace {}",
            request.release_name,
            request.namespace
        );

        match self
            .cluster
            .cancel_operation(&request.namespace, &request.release_name)
        {
            Ok(()) => result(
                true,
                format!(
                    "Cleaned up operations for release {} in namespace {}",
                    request.release_name, request.namespace
                ),
                None,
            ),
            Err(e) => {
                crate::log_error!("Cleanup of {} failed: {}", request.release_name, e);
                result(false, "Cleanup operation failed".to_string(), Some(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::cluster::{ClusterError, ReleaseHandle, ReleaseSummary};
    use crate::deploy::request::DeployConfig;
    use crate::deploy::resolver::ImageRef;
    use std::cell::{Cell, RefCell};

    /// Holds a single lock flag; cancel clears it
    struct LockOnly {
        locked: Cell<bool>,
        fail: bool,
        cancels: RefCell<u32>,
    }

    impl ClusterClient for LockOnly {
        fn list_releases(&self, _: &str) -> Result<Vec<ReleaseSummary>, ClusterError> {
            Ok(vec![])
        }

        fn install(
            &self,
            _: &str,
            _: &str,
            _: &ImageRef,
            _: &DeployConfig,
        ) -> Result<ReleaseHandle, ClusterError> {
            unreachable!("recovery never installs")
        }

        fn upgrade(
            &self,
            _: &str,
            _: &str,
            _: &ImageRef,
            _: &DeployConfig,
        ) -> Result<ReleaseHandle, ClusterError> {
            unreachable!("recovery never upgrades")
        }

        fn cancel_operation(&self, _: &str, _: &str) -> Result<(), ClusterError> {
            *self.cancels.borrow_mut() += 1;
            if self.fail {
                return Err(ClusterError::connectivity("cluster unreachable"));
            }
            self.locked.set(false);
            Ok(())
        }
    }

    fn cluster(locked: bool, fail: bool) -> LockOnly {
        LockOnly {
            locked: Cell::new(locked),
            fail,
            cancels: RefCell::new(0),
        }
    }

    #[test]
    fn test_cleanup_unlocks() {
        let cluster = cluster(true, false);
        let result = StuckOperationRecovery::new(&cluster)
            .cleanup(&CleanupRequest::new("prod", "acme-app"));
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(!cluster.locked.get());
    }

    #[test]
    fn test_cleanup_twice_is_noop_success() {
        let cluster = cluster(false, false);
        let recovery = StuckOperationRecovery::new(&cluster);
        let req = CleanupRequest::new("prod", "acme-app");
        assert!(recovery.cleanup(&req).success);
        assert!(recovery.cleanup(&req).success);
        assert_eq!(*cluster.cancels.borrow(), 2);
    }

    #[test]
    fn test_cleanup_failure_reported() {
        let cluster = cluster(true, true);
        let result = StuckOperationRecovery::new(&cluster)
            .cleanup(&CleanupRequest::new("prod", "acme-app"));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("cluster unreachable"));
        assert!(cluster.locked.get());
    }

    #[test]
    fn test_invalid_cleanup_request_never_calls_cluster() {
        let cluster = cluster(true, false);
        let result = StuckOperationRecovery::new(&cluster)
            .cleanup(&CleanupRequest::new("prod", ""));
        assert!(!result.success);
        assert_eq!(*cluster.cancels.borrow(), 0);
    }
}
