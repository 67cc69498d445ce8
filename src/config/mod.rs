//! Configuration: settings file and release values

pub mod settings;
pub mod values;

pub use settings::{RegistryBackend, Settings};
pub use values::{ReleaseValues, ValuesBuilder};
