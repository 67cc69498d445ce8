//! Cleanup command: clear a stuck helm operation on a release

use anyhow::{Context, Result};
use colored::Colorize;

use super::GlobalOptions;
use crate::deploy::{CleanupRequest, CleanupResult, StuckOperationRecovery};
use crate::utils::DeployerError;
use crate::utils::progress::OperationProgress;

/// Print a cleanup result in the selected format
pub fn render(result: &CleanupResult, global: &GlobalOptions) -> Result<()> {
    if global.is_json() {
        println!("{}", result.to_json().context("Failed to serialize cleanup result")?);
        return Ok(());
    }

    if result.success {
        println!("{} {}", "✓".green().bold(), result.message);
        println!(
            "  Resubmit the deploy to {} when ready",
            result.namespace.bold()
        );
    } else {
        let mut err = DeployerError::new(&result.message)
            .suggest(format!(
                "Inspect the release: helm history {} -n {}",
                result.release_name, result.namespace
            ))
            .suggest("Run with -v for details");
        if let Some(cause) = &result.error {
            err.message = format!("{}: {}", result.message, cause);
        }
        err.display();
    }

    Ok(())
}

/// Handle cleanup command; returns whether cleanup succeeded
pub fn cleanup(namespace: Option<String>, release_name: String, global: &GlobalOptions) -> Result<bool> {
    let namespace = namespace
        .or_else(|| global.settings.defaults.namespace.clone())
        .context("No namespace given: pass --namespace or set defaults.namespace")?;

    let cluster = global.connect()?;
    let recovery = StuckOperationRecovery::new(&cluster);
    let request = CleanupRequest::new(namespace, release_name);

    let progress = OperationProgress::new(
        &format!("Cleaning up release {}", request.release_name),
        global.show_progress(),
    );
    let result = recovery.cleanup(&request);
    progress.finish();

    render(&result, global)?;
    Ok(result.success)
}
