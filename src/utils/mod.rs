//! Utility modules for helm-deployer

pub mod container;
pub mod dryrun;
pub mod errors;
pub mod logger;
pub mod paths;
pub mod process;
pub mod prereqs;
pub mod progress;
pub mod prompt;

// Re-export commonly used items
pub use container::ContainerRuntime;
pub use errors::{DeployerError, enhance_error};
pub use logger::{log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
pub use prompt::confirm;
