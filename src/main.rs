//! helm-deployer CLI - deploy repositories to Kubernetes as Helm releases

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use helm_deployer::commands::{self, GlobalOptions, OutputFormat, deploy::DeployOptions};
use helm_deployer::config::Settings;
use helm_deployer::deploy::{EnvVars, MiniServiceConfig};
use helm_deployer::log_warn;
use helm_deployer::utils::{DeployerError, dryrun, enhance_error, logger};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helm-deployer")]
#[command(author, version, about = "Deploy repositories to Kubernetes as Helm releases", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Path to a config file (default: .helm-deployer.toml, then the user config dir)
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Path to kubeconfig file
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a repository, installing or upgrading its release
    Deploy(DeployArgs),

    /// Clear a stuck install/upgrade/rollback on a release
    Cleanup {
        /// Release to clean up
        release_name: String,

        /// Target namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Check prerequisites and test the cluster connection
    Check,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print an example config file
    Example,

    /// Print the effective settings
    Show,
}

#[derive(Args)]
struct DeployArgs {
    /// Repository URL, e.g. https://github.com/acme/app or .../tree/<branch>
    repository_url: String,

    /// Branch to deploy (overrides a branch in the URL)
    #[arg(short, long)]
    branch: Option<String>,

    /// Target namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Release name (default: <owner>-<repo>)
    #[arg(long)]
    release_name: Option<String>,

    /// Use the branch name as the image tag without checking the registry
    #[arg(long)]
    force_image_tag: bool,

    /// Only upgrade an existing release; fail if it is not installed
    #[arg(long)]
    upgrade_only: bool,

    #[command(flatten)]
    env: EnvArgs,

    /// Extra environment value, KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Disable all mini services
    #[arg(long)]
    no_mini_service: bool,

    /// Disable the deposit service
    #[arg(long)]
    no_deposit_service: bool,

    /// Disable the settlement service
    #[arg(long)]
    no_settlement_service: bool,

    /// Upgrade without asking when the release already exists
    #[arg(short, long, conflicts_with = "no_prompt")]
    yes: bool,

    /// Never prompt; report an existing release and exit
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Args)]
#[command(next_help_heading = "Application settings")]
struct EnvArgs {
    #[arg(long)]
    chain_id: Option<String>,

    /// CORS allowed origins [default: *]
    #[arg(long)]
    allowed_origins: Option<String>,

    #[arg(long)]
    deploy_value: Option<String>,

    #[arg(long)]
    remote_value: Option<String>,

    /// Run migrations (TRUE/FALSE) [default: FALSE]
    #[arg(long)]
    migrate: Option<String>,

    /// Content hash of the image to migrate from (32 hex chars)
    #[arg(long)]
    migrate_image: Option<String>,

    /// Content hash of the image being deployed (32 hex chars)
    #[arg(long)]
    image_value: Option<String>,

    #[arg(long)]
    auto_submit: Option<String>,

    #[arg(long)]
    settlement_contract_address: Option<String>,

    #[arg(long)]
    rpc_provider: Option<String>,
}

impl From<EnvArgs> for EnvVars {
    fn from(args: EnvArgs) -> Self {
        EnvVars {
            chain_id: args.chain_id,
            allowed_origins: args.allowed_origins,
            deploy_value: args.deploy_value,
            remote_value: args.remote_value,
            migrate_value: args.migrate,
            migrate_image_value: args.migrate_image,
            image_value: args.image_value,
            auto_submit_value: args.auto_submit,
            settlement_contract_address: args.settlement_contract_address,
            rpc_provider: args.rpc_provider,
            ..Default::default()
        }
    }
}

impl From<DeployArgs> for DeployOptions {
    fn from(args: DeployArgs) -> Self {
        DeployOptions {
            repository_url: args.repository_url,
            branch: args.branch,
            namespace: args.namespace,
            release_name: args.release_name,
            force_image_tag: args.force_image_tag,
            upgrade_only: args.upgrade_only,
            env_vars: args.env.into(),
            set: args.set,
            mini_service: MiniServiceConfig {
                enabled: !args.no_mini_service,
                deposit_service_enabled: !args.no_deposit_service,
                settlement_service_enabled: !args.no_settlement_service,
            },
            yes: args.yes,
            no_prompt: args.no_prompt,
        }
    }
}

/// A KUBECONFIG listing several files is left to kube and helm to merge
fn single_kubeconfig(value: Option<String>) -> Option<PathBuf> {
    let value = value.filter(|v| !v.is_empty())?;
    let mut paths = std::env::split_paths(&value);
    let first = paths.next()?;
    if paths.next().is_some() {
        return None;
    }
    Some(first)
}

fn main() {
    let cli = Cli::parse();

    logger::init_tracing(cli.verbose);

    // Set dry-run mode
    if cli.dry_run {
        dryrun::set_dry_run(true);
        log_warn!("DRY RUN MODE: No changes will be made");
    }

    let result = run(cli);

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            match err.downcast::<DeployerError>() {
                Ok(err) => err.display(),
                Err(err) => enhance_error(err).display(),
            }
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    // Commands that do not need settings or a cluster
    match &cli.command {
        Commands::Completion { shell } => return handle_completion_command(*shell),
        Commands::Version => return handle_version_command(),
        Commands::Config {
            command: ConfigCommands::Example,
        } => return commands::config::example().map(|_| true),
        _ => {}
    }

    let settings = Settings::load(cli.config_file.as_deref())?;
    let global = GlobalOptions {
        settings,
        kubeconfig: single_kubeconfig(cli.kubeconfig),
        output: cli.output,
    };

    match cli.command {
        Commands::Deploy(args) => commands::deploy::deploy(args.into(), &global),
        Commands::Cleanup {
            release_name,
            namespace,
        } => commands::cleanup::cleanup(namespace, release_name, &global),
        Commands::Check => commands::check::check(&global),
        Commands::Config { command } => handle_config_command(command, &global),
        Commands::Completion { .. } | Commands::Version => Ok(true),
    }
}

fn handle_config_command(command: ConfigCommands, global: &GlobalOptions) -> Result<bool> {
    match command {
        ConfigCommands::Example => commands::config::example()?,
        ConfigCommands::Show => commands::config::show(&global.settings)?,
    }
    Ok(true)
}

fn handle_completion_command(shell: Shell) -> Result<bool> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "helm-deployer", &mut io::stdout());
    Ok(true)
}

fn handle_version_command() -> Result<bool> {
    println!("helm-deployer {}", env!("CARGO_PKG_VERSION"));
    println!("Deploy repositories to Kubernetes as Helm releases");
    Ok(true)
}
