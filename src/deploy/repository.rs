//! Source repository references and the naming conventions derived from them

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use super::request::RequestError;

/// Maximum length helm accepts for a release name
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Maximum length of a namespace (DNS-1123 label)
pub const MAX_NAMESPACE_LEN: usize = 63;

static REPOSITORY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?([A-Za-z0-9.-]+\.[A-Za-z]{2,})/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?(?:/tree/(.+?))?/?$",
    )
    .expect("repository URL pattern is valid")
});

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern is valid")
});

static RELEASE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("release name pattern is valid")
});

/// A parsed source repository reference, e.g. `https://github.com/acme/app/tree/main`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub host: String,
    pub owner: String,
    pub name: String,
    /// Branch embedded in the URL via `/tree/<branch>`
    pub branch: Option<String>,
}

impl Repository {
    /// Parse a repository URL. Accepts an optional `.git` suffix and a
    /// `/tree/<branch>` suffix where the branch may itself contain `/`.
    pub fn parse(url: &str) -> Result<Self, RequestError> {
        let trimmed = url.trim();
        let caps = REPOSITORY_URL
            .captures(trimmed)
            .ok_or_else(|| RequestError::InvalidRepository(trimmed.to_string()))?;

        let branch = caps
            .get(4)
            .map(|m| m.as_str().trim_matches('/').to_string())
            .filter(|b| !b.is_empty());

        Ok(Self {
            host: caps[1].to_lowercase(),
            owner: caps[2].to_string(),
            name: caps[3].to_string(),
            branch,
        })
    }

    /// Repository path within an image registry (`owner/name`, lowercased)
    pub fn image_path(&self) -> String {
        format!("{}/{}", self.owner, self.name).to_lowercase()
    }

    /// Release name used when the caller does not give one explicitly.
    ///
    /// `<owner>-<repo>` lowercased, with anything outside `[a-z0-9-]` folded to
    /// `-`, and capped at the helm release name limit.
    pub fn release_name(&self) -> String {
        let raw = format!("{}-{}", self.owner, self.name).to_lowercase();
        let mut name = String::with_capacity(raw.len());
        for c in raw.chars() {
            let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            };
            if c == '-' && name.ends_with('-') {
                continue;
            }
            name.push(c);
        }

        let mut name = name.trim_matches('-').to_string();
        if name.len() > MAX_RELEASE_NAME_LEN {
            name.truncate(MAX_RELEASE_NAME_LEN);
            name = name.trim_end_matches('-').to_string();
        }
        name
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}/{}/{}", self.host, self.owner, self.name)
    }
}

/// Check that `namespace` is a valid cluster namespace identifier
pub fn validate_namespace(namespace: &str) -> Result<(), RequestError> {
    if namespace.is_empty()
        || namespace.len() > MAX_NAMESPACE_LEN
        || !DNS_LABEL.is_match(namespace)
    {
        return Err(RequestError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Check that `name` is acceptable as a helm release name
pub fn validate_release_name(name: &str) -> Result<(), RequestError> {
    if name.is_empty() || name.len() > MAX_RELEASE_NAME_LEN || !RELEASE_NAME.is_match(name) {
        return Err(RequestError::InvalidReleaseName(name.to_string()));
    }
    Ok(())
}
