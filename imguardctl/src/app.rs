//! One invocation, start to finish.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use imguard_config::GuardConfig;
use imguard_core::{Coordinator, ImageEncoder, RunOptions, RunSummary};
use tracing::info;

use crate::{
    cli::Cli,
    console::{self, ConsoleReporter},
    discovery::{self, CandidateFilter, Mode},
};

/// One full invocation: configuration, discovery, the batch, the summary.
/// Per-file problems are part of the summary; only configuration, discovery
/// and git failures come back as errors.
pub async fn run(cli: &Cli, root: &Path) -> anyhow::Result<RunSummary> {
    let env_lookup = |key: &str| std::env::var(key).ok();
    let (mut config, source) =
        GuardConfig::load_with(cli.config.as_deref(), env_lookup, root)?;
    config.apply_overrides(cli.overrides())?;
    info!(%source, "using configuration");

    let filter = CandidateFilter::new(config.discovery.clone());
    console::print_search_pattern(filter.extensions());

    let mode = if cli.staged { Mode::Staged } else { Mode::Walk };
    let candidates = discovery::discover(root, &filter, mode)
        .await
        .context("failed to collect images")?;

    let encoder = Arc::new(ImageEncoder::new());
    let coordinator = Coordinator::new(encoder, config.pipeline)?
        .with_reporter(Arc::new(ConsoleReporter));
    let report = coordinator
        .run(
            candidates,
            RunOptions {
                dry_run: cli.dry,
                quiet: cli.quiet,
            },
        )
        .await?;

    console::print_summary(&report.summary);
    Ok(report.summary)
}
