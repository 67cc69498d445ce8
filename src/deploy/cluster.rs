//! Cluster client capability consumed by the deployment engine

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::request::DeployConfig;
use super::resolver::ImageRef;

/// Reason reported for a locked release when the cluster gives none
pub const DEFAULT_LOCK_REASON: &str = "another operation (install/upgrade/rollback) is in progress";

/// Status of a release as reported by the cluster client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Healthy,
    /// A mutating operation is pending or was abandoned without cleanup
    Locked,
}

/// One release in a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub name: String,
    pub status: ReleaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

impl ReleaseSummary {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ReleaseStatus::Healthy,
            lock_reason: None,
            revision: None,
        }
    }

    pub fn locked(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ReleaseStatus::Locked,
            lock_reason: Some(reason.into()),
            revision: None,
        }
    }
}

/// Result of a successful install or upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseHandle {
    pub namespace: String,
    pub name: String,
    pub revision: Option<u32>,
}

/// Structured classification of a cluster failure.
///
/// Adapters populate this explicitly; the engine never inspects message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterErrorKind {
    /// Transport failure, cluster unreachable
    Connectivity,
    /// Credentials rejected or insufficient permissions
    Unauthorized,
    /// Ingress host/path already claimed by another resource
    IngressConflict,
    /// The release is locked by another operation
    OperationInProgress,
    Timeout,
    Other,
}

impl fmt::Display for ClusterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connectivity => "connectivity",
            Self::Unauthorized => "unauthorized",
            Self::IngressConflict => "ingress conflict",
            Self::OperationInProgress => "operation in progress",
            Self::Timeout => "timeout",
            Self::Other => "cluster error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ClusterError {
    pub kind: ClusterErrorKind,
    /// Raw diagnostic text; informational only
    pub message: String,
}

impl ClusterError {
    pub fn new(kind: ClusterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Connectivity, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Other, message)
    }
}

/// Operations the engine needs from the cluster.
///
/// `cancel_operation` must succeed without side effects when the release has
/// no pending operation or does not exist.
pub trait ClusterClient {
    fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, ClusterError>;

    fn install(
        &self,
        namespace: &str,
        release_name: &str,
        image: &ImageRef,
        config: &DeployConfig,
    ) -> Result<ReleaseHandle, ClusterError>;

    fn upgrade(
        &self,
        namespace: &str,
        release_name: &str,
        image: &ImageRef,
        config: &DeployConfig,
    ) -> Result<ReleaseHandle, ClusterError>;

    fn cancel_operation(&self, namespace: &str, release_name: &str) -> Result<(), ClusterError>;
}
