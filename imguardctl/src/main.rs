//! `imguard`: shrink the images below the working directory in place.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use imguardctl::{Cli, app};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

const VERBOSE_FILTER: &str =
    "imguard_core=debug,imguard_config=debug,imguardctl=debug,warn";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for the report.
    let filter = if cli.verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr),
        )
        .init();

    app::run(&cli, Path::new(".")).await?;
    Ok(())
}
