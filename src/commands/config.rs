//! Config command: print example or effective settings

use anyhow::Result;

use crate::config::Settings;

/// Print an example configuration file
pub fn example() -> Result<()> {
    print!("{}", Settings::example_config()?);
    Ok(())
}

/// Print the effective settings after file loading and defaults
pub fn show(settings: &Settings) -> Result<()> {
    print!("{}", settings.to_toml()?);
    Ok(())
}
