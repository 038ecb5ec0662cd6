//! Flag definitions.

use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use imguard_config::ConfigOverrides;

/// Command-line flags.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "imguard",
    version,
    about = "Losslessly shrink the images in a repository, \
             in place and never larger"
)]
pub struct Cli {
    /// Report what would be compressed without changing any file
    #[arg(long)]
    pub dry: bool,

    /// Comma-separated paths, directory prefixes or globs to leave alone
    #[arg(long, value_delimiter = ',', value_name = "PATTERNS")]
    pub ignore: Vec<String>,

    /// Only process images staged in git (added, copied, modified, renamed)
    #[arg(long)]
    pub staged: bool,

    /// Suppress the per-file lines; the summary is still printed
    #[arg(long, short)]
    pub quiet: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum number of images processed at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<NonZeroUsize>,

    /// Log pipeline internals to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// The flags that override configuration values.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_concurrency: self.concurrency.map(NonZeroUsize::get),
            ignore: self.ignore.clone(),
        }
    }
}
