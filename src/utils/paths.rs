//! Path utilities for helm-deployer

use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/.kube/config");
        assert!(expanded.ends_with(".kube/config"));
        if dirs::home_dir().is_some() {
            assert!(!expanded.starts_with("~"));
        }
    }

    #[test]
    fn test_plain_paths_unchanged() {
        assert_eq!(expand_home("/etc/kubeconfig"), PathBuf::from("/etc/kubeconfig"));
        assert_eq!(expand_home("relative/~file"), PathBuf::from("relative/~file"));
    }
}
