//! Deploy command implementation

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::collections::BTreeMap;

use super::GlobalOptions;
use crate::deploy::{
    DeployConfig, DeployRequest, DeploymentEngine, DeploymentOutcome, EnvVars, ErrorCode,
    MiniServiceConfig,
};
use crate::registry::build_registry;
use crate::utils::progress::OperationProgress;
use crate::utils::{DeployerError, dryrun, prompt};

/// Options for deploying a repository
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub repository_url: String,
    pub branch: Option<String>,
    pub namespace: Option<String>,
    pub release_name: Option<String>,
    pub force_image_tag: bool,
    pub upgrade_only: bool,
    pub env_vars: EnvVars,
    /// `KEY=VALUE` overrides added to `envVars.custom`
    pub set: Vec<String>,
    pub mini_service: MiniServiceConfig,
    /// Upgrade an existing release without asking
    pub yes: bool,
    pub no_prompt: bool,
}

/// Parse `KEY=VALUE`; the value may itself contain `=`
pub fn parse_key_value(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .with_context(|| format!("Invalid --set '{}': expected KEY=VALUE", pair))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --set '{}': key is empty", pair);
    }
    Ok((key.to_string(), value.to_string()))
}

/// Build the request from CLI options, filling gaps from settings
pub fn build_request(options: &DeployOptions, global: &GlobalOptions) -> Result<DeployRequest> {
    let namespace = options
        .namespace
        .clone()
        .or_else(|| global.settings.defaults.namespace.clone())
        .context("No namespace given: pass --namespace or set defaults.namespace")?;

    let mut env_vars = options.env_vars.clone();
    env_vars.custom.extend(custom_env(&options.set)?);

    let mut request = DeployRequest::new(&options.repository_url, namespace)
        .with_config(DeployConfig {
            env_vars,
            mini_service: options.mini_service,
        })
        .force_image_tag(options.force_image_tag);
    request.upgrade_only = options.upgrade_only;

    if let Some(branch) = &options.branch {
        request = request.with_branch(branch);
    }
    if let Some(name) = &options.release_name {
        request = request.with_release_name(name);
    }

    Ok(request)
}

/// What to do after the engine reports an existing release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpgradeFollowUp {
    /// Report the outcome as is
    Report,
    /// Resubmit as an upgrade without asking
    Upgrade,
    /// Ask on the terminal first
    Ask,
}

fn upgrade_follow_up(
    outcome: &DeploymentOutcome,
    options: &DeployOptions,
    global: &GlobalOptions,
) -> UpgradeFollowUp {
    if outcome.code() != Some(ErrorCode::ExistingDeployment)
        || outcome.details().current_release.is_none()
    {
        return UpgradeFollowUp::Report;
    }
    if options.yes {
        return UpgradeFollowUp::Upgrade;
    }
    if options.no_prompt || global.is_json() || !global.settings.behavior.confirm_upgrade {
        return UpgradeFollowUp::Report;
    }
    UpgradeFollowUp::Ask
}

fn confirm_upgrade(outcome: &DeploymentOutcome) -> Result<bool> {
    if !prompt::is_interactive() {
        return Ok(false);
    }

    let release = outcome.details().current_release.as_deref().unwrap_or_default();
    eprintln!(
        "{} Release {} already exists in namespace {}.",
        "!".yellow().bold(),
        release.bold(),
        outcome.details().namespace
    );
    prompt::confirm(&format!("Upgrade {} instead?", release))
}

fn run_engine(
    engine: &DeploymentEngine<'_>,
    request: &DeployRequest,
    global: &GlobalOptions,
) -> DeploymentOutcome {
    let verb = if request.upgrade_only { "Upgrading" } else { "Deploying" };
    let progress = OperationProgress::new(
        &format!("{} {} to {}", verb, request.repository_url, request.namespace),
        global.show_progress(),
    );
    let outcome = engine.deploy(request);
    progress.finish();
    outcome
}

/// Print an outcome in the selected format
pub fn render(outcome: &DeploymentOutcome, global: &GlobalOptions) -> Result<()> {
    if global.is_json() {
        println!("{}", outcome.to_json().context("Failed to serialize outcome")?);
        return Ok(());
    }

    if outcome.success() {
        let details = outcome.details();
        println!("{} {}", "✓".green().bold(), outcome.message());
        if let Some(image) = &details.image {
            println!("  Image:    {}", image);
        }
        if let Some(revision) = details.revision {
            println!("  Revision: {}", revision);
        }
        if dryrun::is_dry_run() {
            println!("  {}", "No changes were made (--dry-run mode)".yellow());
        }
    } else if let Some(err) = DeployerError::for_outcome(outcome) {
        err.display();
        if let Some(code) = outcome.code() {
            eprintln!();
            eprintln!("  Code: {}", code.to_string().bold());
        }
    }

    Ok(())
}

/// Handle deploy command; returns whether the deploy succeeded
pub fn deploy(options: DeployOptions, global: &GlobalOptions) -> Result<bool> {
    let request = build_request(&options, global)?;
    crate::log_info!(
        "Deploying {} to namespace {}",
        request.repository_url,
        request.namespace
    );

    let registry = build_registry(&global.settings)?;
    let cluster = global.connect()?;
    let engine = DeploymentEngine::new(&cluster, registry.as_ref());

    let mut outcome = run_engine(&engine, &request, global);

    let resubmit = match upgrade_follow_up(&outcome, &options, global) {
        UpgradeFollowUp::Report => false,
        UpgradeFollowUp::Upgrade => true,
        UpgradeFollowUp::Ask => confirm_upgrade(&outcome)?,
    };
    if resubmit {
        let release = outcome
            .details()
            .current_release
            .clone()
            .unwrap_or_default();
        crate::log_info!("Resubmitting as an upgrade of {}", release);
        outcome = run_engine(&engine, &request.as_upgrade(release), global);
    }

    render(&outcome, global)?;
    Ok(outcome.success())
}

/// Collect `--set` pairs into a map; later keys win
pub fn custom_env(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs.iter().map(|p| parse_key_value(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::OutputFormat;
    use crate::config::Settings;
    use crate::deploy::outcome::{DeployFailure, EngineResult, report};

    fn global() -> GlobalOptions {
        GlobalOptions {
            settings: Settings::default(),
            kubeconfig: None,
            output: OutputFormat::Text,
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("LOG_LEVEL=debug").unwrap(),
            ("LOG_LEVEL".to_string(), "debug".to_string())
        );
        assert_eq!(
            parse_key_value("DSN=postgres://u:p@h/db?x=1").unwrap().1,
            "postgres://u:p@h/db?x=1"
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_custom_env() {
        let map = custom_env(&["A=1".to_string(), "B=2".to_string()]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["B"], "2");
    }

    #[test]
    fn test_build_request_uses_default_namespace() {
        let mut global = global();
        let options = DeployOptions {
            repository_url: "https://github.com/acme/app".to_string(),
            ..Default::default()
        };
        assert!(build_request(&options, &global).is_err());

        global.settings.defaults.namespace = Some("staging".to_string());
        let request = build_request(&options, &global).unwrap();
        assert_eq!(request.namespace, "staging");
        assert!(!request.upgrade_only);
    }

    #[test]
    fn test_build_request_carries_options() {
        let options = DeployOptions {
            repository_url: "https://github.com/acme/app".to_string(),
            namespace: Some("prod".to_string()),
            branch: Some("feature/x".to_string()),
            release_name: Some("app-blue".to_string()),
            upgrade_only: true,
            force_image_tag: true,
            set: vec!["LOG_LEVEL=debug".to_string()],
            ..Default::default()
        };
        let request = build_request(&options, &global()).unwrap();
        assert_eq!(request.branch.as_deref(), Some("feature/x"));
        assert_eq!(request.release_name.as_deref(), Some("app-blue"));
        assert!(request.upgrade_only);
        assert!(request.force_image_tag);
        assert_eq!(request.config.env_vars.custom["LOG_LEVEL"], "debug");
    }

    fn existing_deployment() -> DeploymentOutcome {
        let request = DeployRequest::new("https://github.com/acme/app", "prod");
        report(
            &request,
            EngineResult::Failed(DeployFailure::ExistingDeployment {
                release: "acme-app".to_string(),
            }),
        )
    }

    #[test]
    fn test_yes_upgrades_in_every_mode() {
        let outcome = existing_deployment();
        let options = DeployOptions {
            yes: true,
            ..Default::default()
        };

        let mut global = global();
        assert_eq!(upgrade_follow_up(&outcome, &options, &global), UpgradeFollowUp::Upgrade);

        global.output = OutputFormat::Json;
        assert_eq!(upgrade_follow_up(&outcome, &options, &global), UpgradeFollowUp::Upgrade);

        global.output = OutputFormat::Text;
        global.settings.behavior.confirm_upgrade = false;
        assert_eq!(upgrade_follow_up(&outcome, &options, &global), UpgradeFollowUp::Upgrade);
    }

    #[test]
    fn test_prompt_only_when_allowed() {
        let outcome = existing_deployment();
        let options = DeployOptions::default();

        let mut global = global();
        assert_eq!(upgrade_follow_up(&outcome, &options, &global), UpgradeFollowUp::Ask);

        global.output = OutputFormat::Json;
        assert_eq!(upgrade_follow_up(&outcome, &options, &global), UpgradeFollowUp::Report);

        let no_prompt = DeployOptions {
            no_prompt: true,
            ..Default::default()
        };
        assert_eq!(
            upgrade_follow_up(&outcome, &no_prompt, &self::global()),
            UpgradeFollowUp::Report
        );
    }

    #[test]
    fn test_other_failures_are_only_reported() {
        let request = DeployRequest::new("https://github.com/acme/app", "prod");
        let outcome = report(
            &request,
            EngineResult::Failed(DeployFailure::OperationInProgress {
                release: "acme-app".to_string(),
                reason: "pending-upgrade".to_string(),
            }),
        );
        let options = DeployOptions {
            yes: true,
            ..Default::default()
        };
        assert_eq!(upgrade_follow_up(&outcome, &options, &global()), UpgradeFollowUp::Report);
    }
}
