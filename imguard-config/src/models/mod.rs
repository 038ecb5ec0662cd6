//! Serde models for the config file.

pub mod discovery;
pub mod guard;
