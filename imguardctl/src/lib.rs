//! Library half of the `imguard` binary.

pub mod app;
pub mod cli;
pub mod console;
pub mod discovery;
pub mod git;

pub use cli::Cli;
