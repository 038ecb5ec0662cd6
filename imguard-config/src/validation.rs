//! Semantic checks run after parsing.

use imguard_core::{GuardError, OutputFormat};
use thiserror::Error;

use crate::models::{discovery::DiscoverySettings, guard::GuardConfig};

/// A loaded configuration that parses but cannot be run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `[pipeline]` values the core rejects.
    #[error(transparent)]
    Pipeline(#[from] GuardError),

    /// Nothing would ever be discovered.
    #[error("discovery.extensions must list at least one extension")]
    NoExtensions,

    /// An extension with no encoder behind it.
    #[error(
        "discovery.extensions contains `{0}`, which imguard cannot re-encode"
    )]
    UnsupportedExtension(String),
}

/// Check every section of a parsed config.
pub fn validate(config: &GuardConfig) -> Result<(), ConfigError> {
    config.pipeline.validate()?;
    validate_discovery(&config.discovery)
}

fn validate_discovery(
    discovery: &DiscoverySettings,
) -> Result<(), ConfigError> {
    if discovery.extensions.is_empty() {
        return Err(ConfigError::NoExtensions);
    }
    if let Some(bad) = discovery
        .extensions
        .iter()
        .find(|ext| OutputFormat::from_extension(ext).is_none())
    {
        return Err(ConfigError::UnsupportedExtension(bad.clone()));
    }
    Ok(())
}
