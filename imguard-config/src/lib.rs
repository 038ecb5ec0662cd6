//! Configuration for imguard.
//!
//! A run is driven by [`GuardConfig`]: pipeline tuning handed to the core
//! crate plus the discovery filters used by the CLI. Values come from an
//! explicit file, the environment, a default file in the working directory,
//! or built-in defaults, in that order. [`ConfigSource`] records which one
//! won.

pub mod models;
pub mod validation;

pub use models::discovery::DiscoverySettings;
pub use models::guard::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigOverrides, ConfigSource,
    GuardConfig,
};
pub use validation::ConfigError;
