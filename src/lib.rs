//! helm-deployer: deploy source repositories onto Kubernetes as Helm releases

pub mod commands;
pub mod config;
pub mod deploy;
pub mod k8s;
pub mod registry;
pub mod utils;
