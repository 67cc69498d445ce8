//! Check command: tools on PATH and cluster connectivity

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use super::GlobalOptions;
use crate::k8s::connection::{self, ClusterInfo};
use crate::k8s::create_kube_client;
use crate::utils::progress::OperationProgress;
use crate::utils::{CommonPrereqs, DeployerError, Prerequisite, enhance_error};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_info: Option<ClusterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub missing_tools: Vec<String>,
}

fn check_cluster(global: &GlobalOptions) -> Result<ClusterInfo> {
    let source = global.kubeconfig_source()?;
    crate::log_info!("Using kubeconfig: {}", source.describe());
    let (rt, client) = create_kube_client(&source)?;
    connection::test_connection(&rt, &client, global.settings.cluster.api_timeout())
        .context("Cluster connection test failed")
}

/// Handle check command; returns whether every check passed
pub fn check(global: &GlobalOptions) -> Result<bool> {
    let helm = CommonPrereqs::helm(&global.settings.helm.binary);
    let docker = CommonPrereqs::docker();
    let podman = CommonPrereqs::podman();
    let (found, missing) = CommonPrereqs::check_all(&[&helm]);

    let runtime_found = docker.check().is_ok() || podman.check().is_ok();

    let progress = OperationProgress::new("Testing cluster connection", global.show_progress());
    let cluster = check_cluster(global);
    progress.finish();
    let success = missing.is_empty() && cluster.is_ok();

    let report = CheckReport {
        success,
        message: match &cluster {
            Ok(_) => "Connected to Kubernetes cluster".to_string(),
            Err(_) => "Failed to connect to Kubernetes cluster".to_string(),
        },
        error: cluster.as_ref().err().map(|e| format!("{:#}", e)),
        cluster_info: cluster.as_ref().ok().cloned(),
        missing_tools: missing.iter().map(|(name, _)| name.clone()).collect(),
    };

    if global.is_json() {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize check report")?
        );
        return Ok(success);
    }

    for tool in &found {
        println!("{} {} found", "✓".green().bold(), tool);
    }
    for (name, hint) in &missing {
        DeployerError::tool_not_found(name, hint).display();
    }
    if !runtime_found {
        println!(
            "{} neither docker nor podman found (only needed for registry.backend = \"runtime\")",
            "-".yellow()
        );
    }

    match cluster {
        Ok(info) => {
            println!("{} {}", "✓".green().bold(), report.message);
            println!("  Version:    {}", info.version);
            println!("  Nodes:      {} ({} ready)", info.nodes, info.ready_nodes);
            println!("  Namespaces: {}", info.namespaces);
            println!("  Pods:       {}", info.pods);
            println!("  Status:     {:?}", info.status);
        }
        Err(e) => enhance_error(e).display(),
    }

    Ok(success)
}
