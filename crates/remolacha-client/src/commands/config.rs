//! Configuration commands.

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints the effective configuration as TOML.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Validates the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    println!("Configuration is valid.");
    Ok(())
}

/// Prints the default configuration path.
pub fn path() -> ClientResult<()> {
    println!("{}", ClientConfig::default_path().display());
    Ok(())
}
