//! Deployment orchestration: resolve an image, inspect the release, decide
//! between install, upgrade and conflict, and report a structured outcome.

pub mod cluster;
pub mod engine;
pub mod inspector;
pub mod outcome;
pub mod recovery;
pub mod repository;
pub mod request;
pub mod resolver;

pub use cluster::{ClusterClient, ClusterError, ClusterErrorKind, ReleaseHandle, ReleaseStatus, ReleaseSummary};
pub use engine::{Decision, DeploymentEngine};
pub use inspector::{ReleaseInspector, ReleaseState};
pub use outcome::{ActionPerformed, CleanupResult, DeploymentOutcome, DeploymentType, ErrorCode, Stage};
pub use recovery::{CleanupRequest, StuckOperationRecovery};
pub use repository::Repository;
pub use request::{DeployConfig, DeployRequest, EnvVars, MiniServiceConfig};
pub use resolver::{ImageRef, ImageRegistry, ImageTagResolver, RegistryError, ResolutionError};
