//! Structured results returned to callers.
//!
//! Every deploy produces exactly one [`DeploymentOutcome`]: either a complete
//! success record or a failure record carrying a machine-readable code. The
//! constructors here are the only way to build one.

use serde::Serialize;
use std::fmt;

use super::cluster::{ClusterError, ClusterErrorKind, ReleaseHandle};
use super::inspector::InspectionError;
use super::request::{DeployRequest, RequestError};
use super::resolver::{ImageRef, ResolutionError};

/// Machine-readable failure code; callers pick their follow-up from this alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Ingress host/path already claimed; needs operator intervention
    IngressConflict,
    /// Release exists; resubmit as an upgrade of `details.currentRelease`
    ExistingDeployment,
    /// Release is locked; run cleanup then resubmit
    OperationInProgress,
    /// Upgrade requested for a release that is not installed
    ReleaseNotFound,
    ImageNotFound,
    InspectionFailed,
    InvalidRequest,
    Unknown,
}

impl ErrorCode {
    /// Whether the caller can recover by resubmitting with new intent
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ExistingDeployment | ErrorCode::OperationInProgress
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::IngressConflict => "INGRESS_CONFLICT",
            ErrorCode::ExistingDeployment => "EXISTING_DEPLOYMENT",
            ErrorCode::OperationInProgress => "OPERATION_IN_PROGRESS",
            ErrorCode::ReleaseNotFound => "RELEASE_NOT_FOUND",
            ErrorCode::ImageNotFound => "IMAGE_NOT_FOUND",
            ErrorCode::InspectionFailed => "INSPECTION_FAILED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    New,
    Upgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionPerformed {
    Deployed,
    Upgraded,
}

impl DeploymentType {
    pub fn action(&self) -> ActionPerformed {
        match self {
            DeploymentType::New => ActionPerformed::Deployed,
            DeploymentType::Upgrade => ActionPerformed::Upgraded,
        }
    }
}

/// Engine states, also used to label where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Start,
    Resolving,
    Inspecting,
    Deciding,
    Installing,
    Upgrading,
    ReportingConflict,
    Done,
    Failed,
}

impl Stage {
    /// Whether a failure in this stage may have left side effects on the cluster
    pub fn is_mutating(&self) -> bool {
        matches!(self, Stage::Installing | Stage::Upgrading)
    }

    /// Allowed forward transitions; the machine never branches back
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Start, Resolving) | (Start, Failed) => true,
            (Resolving, Inspecting) | (Resolving, Failed) => true,
            (Inspecting, Deciding) | (Inspecting, Failed) => true,
            (Deciding, Installing) | (Deciding, Upgrading) | (Deciding, ReportingConflict) => {
                true
            }
            (Deciding, Failed) => true,
            (Installing, Done) | (Installing, Failed) => true,
            (Upgrading, Done) | (Upgrading, Failed) => true,
            (ReportingConflict, Failed) => true,
            _ => false,
        }
    }
}

/// Diagnostic fields attached to an outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDetails {
    pub namespace: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_performed: Option<ActionPerformed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    details: OutcomeDetails,
}

impl DeploymentOutcome {
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    pub fn details(&self) -> &OutcomeDetails {
        &self.details
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// How a single engine run ended, before normalization
#[derive(Debug, Clone)]
pub enum EngineResult {
    Completed {
        deployment_type: DeploymentType,
        image: ImageRef,
        handle: ReleaseHandle,
    },
    Failed(DeployFailure),
}

#[derive(Debug, Clone)]
pub enum DeployFailure {
    InvalidRequest(RequestError),
    Resolution(ResolutionError),
    Inspection(InspectionError),
    ExistingDeployment { release: String },
    OperationInProgress { release: String, reason: String },
    ReleaseNotFound { release: String },
    Mutation {
        stage: Stage,
        release: String,
        image: ImageRef,
        error: ClusterError,
    },
}

impl DeployFailure {
    /// Stage the engine was in when it gave up
    pub fn stage(&self) -> Stage {
        match self {
            DeployFailure::InvalidRequest(_) => Stage::Start,
            DeployFailure::Resolution(_) => Stage::Resolving,
            DeployFailure::Inspection(_) => Stage::Inspecting,
            DeployFailure::ExistingDeployment { .. }
            | DeployFailure::OperationInProgress { .. } => Stage::ReportingConflict,
            DeployFailure::ReleaseNotFound { .. } => Stage::Deciding,
            DeployFailure::Mutation { stage, .. } => *stage,
        }
    }
}

/// Normalize an engine result into the caller-facing outcome
pub fn report(request: &DeployRequest, result: EngineResult) -> DeploymentOutcome {
    let mut details = OutcomeDetails {
        namespace: request.namespace.clone(),
        repository: request.repository_url.clone(),
        ..Default::default()
    };

    match result {
        EngineResult::Completed {
            deployment_type,
            image,
            handle,
        } => {
            details.deployment_type = Some(deployment_type);
            details.action_performed = Some(deployment_type.action());
            details.current_release = Some(handle.name.clone());
            details.image = Some(image.to_string());
            details.revision = handle.revision;
            details.stage = Some(Stage::Done);

            let message = match deployment_type {
                DeploymentType::New => format!(
                    "Deployed release {} to namespace {}",
                    handle.name, handle.namespace
                ),
                DeploymentType::Upgrade => format!(
                    "Upgraded release {} in namespace {}",
                    handle.name, handle.namespace
                ),
            };

            DeploymentOutcome {
                success: true,
                message,
                code: None,
                details,
            }
        }
        EngineResult::Failed(failure) => {
            details.stage = Some(failure.stage());
            let (code, message) = describe_failure(failure, &mut details);
            DeploymentOutcome {
                success: false,
                message,
                code: Some(code),
                details,
            }
        }
    }
}

fn describe_failure(failure: DeployFailure, details: &mut OutcomeDetails) -> (ErrorCode, String) {
    match failure {
        DeployFailure::InvalidRequest(e) => {
            details.raw_message = Some(e.to_string());
            (ErrorCode::InvalidRequest, format!("Invalid deploy request: {}", e))
        }
        DeployFailure::Resolution(e) => {
            details.raw_message = Some(e.to_string());
            let code = match e {
                ResolutionError::ImageNotFound { .. } => ErrorCode::ImageNotFound,
                ResolutionError::Registry(_) => ErrorCode::Unknown,
            };
            (code, format!("Image resolution failed: {}", e))
        }
        DeployFailure::Inspection(e) => {
            details.raw_message = Some(e.source.message.clone());
            (
                ErrorCode::InspectionFailed,
                format!("Could not inspect existing releases, nothing was changed: {}", e),
            )
        }
        DeployFailure::ExistingDeployment { release } => {
            let message = format!(
                "Release {} already exists in namespace {}; resubmit as an upgrade to replace it",
                release, details.namespace
            );
            details.deployment_type = Some(DeploymentType::Upgrade);
            details.current_release = Some(release);
            (ErrorCode::ExistingDeployment, message)
        }
        DeployFailure::OperationInProgress { release, reason } => {
            let message = format!(
                "Release {} is locked ({}); clean up the stuck operation and resubmit",
                release, reason
            );
            details.current_release = Some(release);
            details.raw_message = Some(reason);
            (ErrorCode::OperationInProgress, message)
        }
        DeployFailure::ReleaseNotFound { release } => {
            let message = format!(
                "Upgrade requested but release {} does not exist in namespace {}",
                release, details.namespace
            );
            details.deployment_type = Some(DeploymentType::Upgrade);
            details.current_release = Some(release);
            (ErrorCode::ReleaseNotFound, message)
        }
        DeployFailure::Mutation {
            stage,
            release,
            image,
            error,
        } => {
            let deployment_type = if stage == Stage::Upgrading {
                DeploymentType::Upgrade
            } else {
                DeploymentType::New
            };
            details.deployment_type = Some(deployment_type);
            details.current_release = Some(release.clone());
            details.image = Some(image.to_string());
            details.raw_message = Some(error.message.clone());

            let verb = match deployment_type {
                DeploymentType::New => "Install",
                DeploymentType::Upgrade => "Upgrade",
            };
            let code = match error.kind {
                ClusterErrorKind::IngressConflict => ErrorCode::IngressConflict,
                ClusterErrorKind::OperationInProgress => ErrorCode::OperationInProgress,
                _ => ErrorCode::Unknown,
            };
            let mut message = format!("{} of release {} failed: {}", verb, release, error);
            if stage.is_mutating() && code == ErrorCode::Unknown {
                message.push_str(&format!(
                    "; the release may be partially applied, check `helm status {} -n {}` before resubmitting",
                    release, details.namespace
                ));
            }
            (code, message)
        }
    }
}

/// Caller-facing result of a stuck-operation cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub namespace: String,
    pub release_name: String,
}

impl CleanupResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
