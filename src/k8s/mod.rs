//! Kubernetes and helm integration

pub mod client;
pub mod connection;
pub mod helm;
pub mod releases;

pub use client::HelmClusterClient;
pub use connection::{ClusterInfo, KubeconfigSource, create_kube_client, resolve_kubeconfig};
