//! Command implementations for helm-deployer CLI

pub mod check;
pub mod cleanup;
pub mod config;
pub mod deploy;

use anyhow::Result;
use clap::ValueEnum;
use std::path::PathBuf;

use crate::config::Settings;
use crate::k8s::{HelmClusterClient, KubeconfigSource, resolve_kubeconfig};
use crate::utils::{CommonPrereqs, DeployerError, Prerequisite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored
    #[default]
    Text,
    /// The structured result as JSON on stdout
    Json,
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub settings: Settings,
    pub kubeconfig: Option<PathBuf>,
    pub output: OutputFormat,
}

impl GlobalOptions {
    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }

    pub fn show_progress(&self) -> bool {
        !self.is_json() && self.settings.behavior.show_progress
    }

    pub fn kubeconfig_source(&self) -> Result<KubeconfigSource> {
        resolve_kubeconfig(self.kubeconfig.as_deref(), &self.settings)
    }

    /// Verify helm is installed, then connect to the cluster
    pub fn connect(&self) -> Result<HelmClusterClient> {
        let helm = CommonPrereqs::helm(&self.settings.helm.binary);
        if helm.check().is_err() {
            return Err(DeployerError::tool_not_found(helm.name(), helm.install_hint()).into());
        }

        let source = self.kubeconfig_source()?;
        tracing::debug!(kubeconfig = %source.describe(), "connecting to cluster");
        HelmClusterClient::connect(source, &self.settings)
    }
}
