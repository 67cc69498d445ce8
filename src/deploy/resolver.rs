//! Image tag resolution with ordered fallback

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::repository::Repository;

pub const LATEST_TAG: &str = "latest";

/// A resolved, pullable image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
    /// False when the tag was trusted without asking the registry
    pub verified: bool,
}

impl ImageRef {
    /// `registry/repository` without the tag
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry request for {image} failed: {message}")]
    Request { image: String, message: String },

    #[error("registry request for {image} timed out")]
    Timeout { image: String },
}

/// Read-only view of an image registry
pub trait ImageRegistry {
    /// Registry host used in resolved references, e.g. `ghcr.io`
    fn host(&self) -> &str;

    /// Whether `repository:tag` exists in the registry
    fn tag_exists(&self, repository: &str, tag: &str) -> Result<bool, RegistryError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no image found for {repository} (tried tags: {})", tried.join(", "))]
    ImageNotFound {
        repository: String,
        tried: Vec<String>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Tags to try for `branch`, in order, without duplicates.
///
/// `feature/login-fix` yields `feature/login-fix`, `feature-login-fix`,
/// `branch-feature-login-fix`, `latest`.
pub fn candidate_tags(branch: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(4);
    if let Some(branch) = branch {
        let normalized = branch.replace('/', "-");
        for tag in [
            branch.to_string(),
            normalized.clone(),
            format!("branch-{}", normalized),
        ] {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    if !tags.iter().any(|t| t == LATEST_TAG) {
        tags.push(LATEST_TAG.to_string());
    }
    tags
}

/// Resolves a (repository, branch) pair to an image reference
pub struct ImageTagResolver<'a> {
    registry: &'a dyn ImageRegistry,
}

impl<'a> ImageTagResolver<'a> {
    pub fn new(registry: &'a dyn ImageRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the image for `repository` at `branch`.
    ///
    /// With `force_image_tag` the registry is not consulted: the raw branch
    /// name (or `latest` when there is no branch) is trusted as the tag.
    pub fn resolve(
        &self,
        repository: &Repository,
        branch: Option<&str>,
        force_image_tag: bool,
    ) -> Result<ImageRef, ResolutionError> {
        let path = repository.image_path();
        let make_ref = |tag: &str, verified: bool| ImageRef {
            registry: self.registry.host().to_string(),
            repository: path.clone(),
            tag: tag.to_string(),
            verified,
        };

        if force_image_tag {
            let tag = branch.unwrap_or(LATEST_TAG);
            crate::log_warn!(
                "Using image tag '{}' for {} without verifying it exists",
                tag,
                path
            );
            return Ok(make_ref(tag, false));
        }

        let candidates = candidate_tags(branch);
        for tag in &candidates {
            tracing::debug!(repository = %path, tag = %tag, "checking image tag");
            if self.registry.tag_exists(&path, tag)? {
                if branch.is_some() && tag == LATEST_TAG {
                    crate::log_warn!(
                        "No branch-specific image for {}, falling back to '{}'",
                        path,
                        LATEST_TAG
                    );
                }
                return Ok(make_ref(tag, true));
            }
        }

        Err(ResolutionError::ImageNotFound {
            repository: make_ref(LATEST_TAG, false).name(),
            tried: candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    struct FakeRegistry {
        tags: HashSet<String>,
        queried: RefCell<Vec<String>>,
        fail: bool,
    }

    impl FakeRegistry {
        fn with_tags(tags: &[&str]) -> Self {
            Self {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                queried: RefCell::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl ImageRegistry for FakeRegistry {
        fn host(&self) -> &str {
            "ghcr.io"
        }

        fn tag_exists(&self, repository: &str, tag: &str) -> Result<bool, RegistryError> {
            self.queried.borrow_mut().push(tag.to_string());
            if self.fail {
                return Err(RegistryError::Timeout {
                    image: format!("{}:{}", repository, tag),
                });
            }
            Ok(self.tags.contains(tag))
        }
    }

    fn repo() -> Repository {
        Repository::parse("https://github.com/acme/app").unwrap()
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(
            candidate_tags(Some("feature/login-fix")),
            vec![
                "feature/login-fix",
                "feature-login-fix",
                "branch-feature-login-fix",
                "latest"
            ]
        );
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        assert_eq!(candidate_tags(Some("main")), vec!["main", "branch-main", "latest"]);
        assert_eq!(candidate_tags(Some("latest")), vec!["latest", "branch-latest"]);
        assert_eq!(candidate_tags(None), vec!["latest"]);
    }

    #[test]
    fn test_fallback_tries_in_order_and_stops_at_first_hit() {
        let registry = FakeRegistry::with_tags(&["branch-feature-login-fix", "latest"]);
        let resolver = ImageTagResolver::new(&registry);

        let image = resolver
            .resolve(&repo(), Some("feature/login-fix"), false)
            .unwrap();
        assert_eq!(image.to_string(), "ghcr.io/acme/app:branch-feature-login-fix");
        assert!(image.verified);
        assert_eq!(
            *registry.queried.borrow(),
            vec![
                "feature/login-fix",
                "feature-login-fix",
                "branch-feature-login-fix"
            ]
        );
    }

    #[test]
    fn test_falls_back_to_latest() {
        let registry = FakeRegistry::with_tags(&["latest"]);
        let resolver = ImageTagResolver::new(&registry);

        let image = resolver
            .resolve(&repo(), Some("feature/login-fix"), false)
            .unwrap();
        assert_eq!(image.tag, "latest");
        assert_eq!(registry.queried.borrow().len(), 4);
    }

    #[test]
    fn test_no_branch_uses_latest() {
        let registry = FakeRegistry::with_tags(&["latest"]);
        let image = ImageTagResolver::new(&registry)
            .resolve(&repo(), None, false)
            .unwrap();
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_image_not_found() {
        let registry = FakeRegistry::with_tags(&[]);
        let err = ImageTagResolver::new(&registry)
            .resolve(&repo(), Some("dev"), false)
            .unwrap_err();
        match err {
            ResolutionError::ImageNotFound { repository, tried } => {
                assert_eq!(repository, "ghcr.io/acme/app");
                assert_eq!(tried, vec!["dev", "branch-dev", "latest"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_force_skips_registry() {
        let registry = FakeRegistry::with_tags(&[]);
        let image = ImageTagResolver::new(&registry)
            .resolve(&repo(), Some("feature/xyz"), true)
            .unwrap();
        assert_eq!(image.tag, "feature/xyz");
        assert!(!image.verified);
        assert!(registry.queried.borrow().is_empty());
    }

    #[test]
    fn test_registry_failure_aborts() {
        let mut registry = FakeRegistry::with_tags(&["latest"]);
        registry.fail = true;
        let err = ImageTagResolver::new(&registry)
            .resolve(&repo(), None, false)
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Registry(_)));
    }
}
