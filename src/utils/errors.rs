//! Enhanced error types with actionable suggestions

use colored::Colorize;
use thiserror::Error;

use crate::deploy::{DeploymentOutcome, ErrorCode};

/// Enhanced error with suggestions and documentation links
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeployerError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub docs_link: Option<String>,
}

impl DeployerError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            docs_link: None,
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a documentation link
    pub fn with_docs(mut self, link: impl Into<String>) -> Self {
        self.docs_link = Some(link.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }

        if let Some(docs) = &self.docs_link {
            eprintln!();
            eprintln!("{} {}", "Documentation:".cyan(), docs);
        }
    }

    /// Suggestions for a failed deploy, keyed by its error code
    pub fn for_outcome(outcome: &DeploymentOutcome) -> Option<Self> {
        let code = outcome.code()?;
        let details = outcome.details();
        let ns = &details.namespace;
        let release = details.current_release.as_deref().unwrap_or("<release>");
        let err = Self::new(outcome.message());

        Some(match code {
            ErrorCode::ExistingDeployment => err
                .suggest(format!(
                    "Upgrade it: helm-deployer deploy {} -n {} --upgrade-only --release-name {}",
                    details.repository, ns, release
                ))
                .suggest("Or deploy into a different namespace"),
            ErrorCode::OperationInProgress => err
                .suggest(format!(
                    "Clear the stuck operation: helm-deployer cleanup -n {} {}",
                    ns, release
                ))
                .suggest("Then run the same deploy command again"),
            ErrorCode::IngressConflict => err
                .suggest("Find the owner of the host: kubectl get ingress -A | grep <host>")
                .suggest("Remove the conflicting ingress or change the host in the chart values")
                .suggest(format!("Namespace of this release: {}", ns))
                .with_docs("https://kubernetes.io/docs/concepts/services-networking/ingress/"),
            ErrorCode::ReleaseNotFound => err
                .suggest(format!("List releases: helm list -n {}", ns))
                .suggest("Drop --upgrade-only to install it fresh"),
            ErrorCode::ImageNotFound => err
                .suggest("Check that CI published an image for this branch")
                .suggest("Use --force-image-tag to deploy the branch tag without checking")
                .suggest("Set registry.host in the config file if images live elsewhere"),
            ErrorCode::InspectionFailed => err
                .suggest("Verify the cluster is reachable: helm-deployer check")
                .suggest("Confirm the namespace exists and you may list secrets in it"),
            ErrorCode::InvalidRequest => {
                err.suggest("Repository URLs look like https://github.com/<owner>/<repo>")
            }
            ErrorCode::Unknown => err
                .suggest("Run with -v or -vv for more details")
                .suggest(format!("Inspect the release: helm status {} -n {}", release, ns)),
        })
    }

    // Common error patterns

    /// Tool not found error
    pub fn tool_not_found(tool: &str, install_hint: &str) -> Self {
        Self::new(format!("Required tool '{}' not found", tool))
            .suggest(install_hint.to_string())
            .suggest("Ensure the tool is in your PATH")
    }

    /// Kubeconfig could not be loaded
    pub fn kubeconfig_invalid(source: &str, reason: &str) -> Self {
        Self::new(format!("Failed to load kubeconfig from {}: {}", source, reason))
            .suggest("Pass --kubeconfig <path> or set KUBECONFIG")
            .suggest("Or export KUBECONFIG_BASE64 with a base64-encoded kubeconfig")
    }

    /// Permission denied error
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify you have sufficient cluster permissions")
            .suggest("Helm needs to read and write secrets in the target namespace")
    }

    /// Connection timeout error
    pub fn connection_timeout(resource: &str) -> Self {
        Self::new(format!("Timeout waiting for {}", resource))
            .suggest("Check if the cluster is healthy")
            .suggest("Verify network connectivity")
            .suggest("Increase cluster.api_timeout_secs or helm.timeout_secs in the config file")
    }
}

/// Convert anyhow error to DeployerError when possible
pub fn enhance_error(err: anyhow::Error) -> DeployerError {
    let err_str = format!("{:#}", err);
    let lower = err_str.to_lowercase();

    if lower.contains("kubeconfig") {
        return DeployerError::kubeconfig_invalid("the configured source", &err_str);
    }

    if lower.contains("connection refused") || lower.contains("timed out") {
        return DeployerError::connection_timeout("cluster");
    }

    if lower.contains("unauthorized") || lower.contains("forbidden") {
        return DeployerError::permission_denied("cluster operation");
    }

    // Default error with generic suggestion
    DeployerError::new(err_str)
        .suggest("Run with -v or -vv for more details")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployRequest;
    use crate::deploy::outcome::{DeployFailure, EngineResult, report};

    #[test]
    fn test_error_suggestions() {
        let err = DeployerError::new("test")
            .suggest("suggestion 1")
            .suggest("suggestion 2")
            .with_docs("https://helm.sh/docs/");
        assert_eq!(err.suggestions.len(), 2);
        assert!(err.docs_link.is_some());
    }

    #[test]
    fn test_enhance_error_patterns() {
        let err = enhance_error(anyhow::anyhow!("secrets is forbidden: User cannot list"));
        assert!(err.message.contains("Permission denied"));

        let err = enhance_error(anyhow::anyhow!("Timed out after 30s trying to list nodes"));
        assert!(err.message.contains("Timeout"));

        let err = enhance_error(anyhow::anyhow!("something odd"));
        assert_eq!(err.message, "something odd");
    }

    #[test]
    fn test_locked_release_suggests_cleanup() {
        let request = DeployRequest::new("https://github.com/acme/app", "prod");
        let outcome = report(
            &request,
            EngineResult::Failed(DeployFailure::OperationInProgress {
                release: "acme-app".to_string(),
                reason: "pending-upgrade".to_string(),
            }),
        );
        let err = DeployerError::for_outcome(&outcome).unwrap();
        assert!(err.suggestions[0].contains("helm-deployer cleanup -n prod acme-app"));
    }

    #[test]
    fn test_existing_deployment_suggests_upgrade() {
        let request = DeployRequest::new("https://github.com/acme/app", "prod");
        let outcome = report(
            &request,
            EngineResult::Failed(DeployFailure::ExistingDeployment {
                release: "acme-app".to_string(),
            }),
        );
        let err = DeployerError::for_outcome(&outcome).unwrap();
        assert!(err.suggestions[0].contains("--upgrade-only --release-name acme-app"));
    }
}
