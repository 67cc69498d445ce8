//! Dry-run mode utilities

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Enable or disable dry-run mode for the process
pub fn set_dry_run(enabled: bool) {
    DRY_RUN.store(enabled, Ordering::Relaxed);
}

/// Check if dry-run mode is enabled
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::Relaxed)
}

/// Log a dry-run action
pub fn log_action(action: &str) {
    if is_dry_run() {
        eprintln!("  {} {}", "[DRY RUN]".cyan().bold(), action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_dry_run() {
        set_dry_run(true);
        assert!(is_dry_run());
        log_action("would do something");
        set_dry_run(false);
        assert!(!is_dry_run());
    }
}
