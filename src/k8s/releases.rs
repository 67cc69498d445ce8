//! Helm release state read from the release storage secrets

use std::collections::BTreeMap;

use crate::deploy::ReleaseSummary;

/// Label selector matching helm's release storage secrets
pub const HELM_OWNER_SELECTOR: &str = "owner=helm";

/// One stored revision of a release (`sh.helm.release.v1.<name>.v<N>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRevision {
    pub secret_name: String,
    pub release: String,
    pub revision: u32,
    pub status: String,
}

impl StoredRevision {
    /// Build from the labels helm puts on each storage secret
    pub fn from_labels(secret_name: &str, labels: &BTreeMap<String, String>) -> Option<Self> {
        let release = labels.get("name")?;
        let revision = labels.get("version")?.parse().ok()?;
        let status = labels.get("status").cloned().unwrap_or_default();

        Some(Self {
            secret_name: secret_name.to_string(),
            release: release.clone(),
            revision,
            status,
        })
    }

    /// pending-install, pending-upgrade, pending-rollback, uninstalling
    pub fn is_pending(&self) -> bool {
        self.status.starts_with("pending-") || self.status == "uninstalling"
    }

    fn is_uninstalled(&self) -> bool {
        self.status == "uninstalled"
    }
}

fn latest_by_release(revisions: &[StoredRevision]) -> BTreeMap<&str, &StoredRevision> {
    let mut latest: BTreeMap<&str, &StoredRevision> = BTreeMap::new();
    for rev in revisions {
        latest
            .entry(rev.release.as_str())
            .and_modify(|current| {
                if rev.revision > current.revision {
                    *current = rev;
                }
            })
            .or_insert(rev);
    }
    latest
}

/// Collapse stored revisions into one summary per release.
///
/// The latest revision decides the status. Releases whose latest revision is
/// uninstalled (kept with `--keep-history`) are not reported.
pub fn summarize(revisions: &[StoredRevision]) -> Vec<ReleaseSummary> {
    latest_by_release(revisions)
        .into_values()
        .filter(|rev| !rev.is_uninstalled())
        .map(|rev| {
            let mut summary = if rev.is_pending() {
                ReleaseSummary::locked(
                    &rev.release,
                    format!(
                        "another operation ({}) is in progress on revision {}",
                        rev.status, rev.revision
                    ),
                )
            } else {
                ReleaseSummary::healthy(&rev.release)
            };
            summary.revision = Some(rev.revision);
            summary
        })
        .collect()
}

/// The latest revision of `release` when it is stuck in a pending state
pub fn pending_revision<'a>(
    revisions: &'a [StoredRevision],
    release: &str,
) -> Option<&'a StoredRevision> {
    latest_by_release(revisions)
        .get(release)
        .copied()
        .filter(|rev| rev.is_pending())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::ReleaseStatus;

    fn rev(release: &str, revision: u32, status: &str) -> StoredRevision {
        StoredRevision {
            secret_name: format!("sh.helm.release.v1.{}.v{}", release, revision),
            release: release.to_string(),
            revision,
            status: status.to_string(),
        }
    }

    #[test]
    fn test_from_labels() {
        let labels: BTreeMap<String, String> = [
            ("owner", "helm"),
            ("name", "acme-app"),
            ("status", "deployed"),
            ("version", "4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let parsed = StoredRevision::from_labels("sh.helm.release.v1.acme-app.v4", &labels).unwrap();
        assert_eq!(parsed.release, "acme-app");
        assert_eq!(parsed.revision, 4);
        assert!(!parsed.is_pending());
    }

    #[test]
    fn test_from_labels_requires_name_and_version() {
        let mut labels = BTreeMap::new();
        labels.insert("name".to_string(), "acme-app".to_string());
        assert!(StoredRevision::from_labels("s", &labels).is_none());

        labels.insert("version".to_string(), "x".to_string());
        assert!(StoredRevision::from_labels("s", &labels).is_none());
    }

    #[test]
    fn test_latest_revision_decides_status() {
        let revisions = vec![
            rev("acme-app", 1, "superseded"),
            rev("acme-app", 2, "pending-upgrade"),
            rev("acme-web", 3, "deployed"),
            rev("acme-web", 2, "superseded"),
        ];

        let summaries = summarize(&revisions);
        assert_eq!(summaries.len(), 2);

        let app = &summaries[0];
        assert_eq!(app.name, "acme-app");
        assert_eq!(app.status, ReleaseStatus::Locked);
        assert_eq!(app.revision, Some(2));
        assert!(app.lock_reason.as_deref().unwrap().contains("pending-upgrade"));

        let web = &summaries[1];
        assert_eq!(web.status, ReleaseStatus::Healthy);
        assert_eq!(web.revision, Some(3));
    }

    #[test]
    fn test_failed_release_is_not_locked() {
        let summaries = summarize(&[rev("acme-app", 1, "failed")]);
        assert_eq!(summaries[0].status, ReleaseStatus::Healthy);
    }

    #[test]
    fn test_uninstalled_release_is_absent() {
        let summaries = summarize(&[rev("acme-app", 1, "deployed"), rev("acme-app", 2, "uninstalled")]);
        assert!(summaries.is_empty());
    }

    #[test]
    fn test_pending_revision() {
        let revisions = vec![
            rev("acme-app", 1, "deployed"),
            rev("acme-app", 2, "pending-install"),
            rev("acme-web", 1, "deployed"),
        ];
        let pending = pending_revision(&revisions, "acme-app").unwrap();
        assert_eq!(pending.secret_name, "sh.helm.release.v1.acme-app.v2");

        assert!(pending_revision(&revisions, "acme-web").is_none());
        assert!(pending_revision(&revisions, "missing").is_none());
    }
}
