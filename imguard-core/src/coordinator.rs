//! Batch driver: dedup, tune, fan out, reduce.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    encoder::Encoder,
    error::Result,
    limiter::Limiter,
    outcome::{FileReport, RunSummary, TransformOutcome, format_size},
    report::OutcomeReporter,
    settings::PipelineSettings,
    transformer::{Transformer, WorkItem},
    tuning::{Parallelism, PoolTuning, tune_encoder_pool},
};

/// Per-run flags applied to every work item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report savings without replacing anything.
    pub dry_run: bool,
    /// No per-file report lines.
    pub quiet: bool,
}

/// Everything a finished batch produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Reduction of every outcome.
    pub summary: RunSummary,
    /// Per-file outcomes in completion order.
    pub files: Vec<FileReport>,
    /// `None` when the batch was empty or tuning is disabled.
    pub tuning: Option<PoolTuning>,
}

/// Fans a candidate list out through the limiter and reduces the outcomes.
#[derive(Debug)]
pub struct Coordinator {
    transformer: Arc<Transformer>,
    parallelism: Parallelism,
}

impl Coordinator {
    /// Validate `settings` and size the batch for this machine.
    pub fn new(
        encoder: Arc<dyn Encoder>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let parallelism = Parallelism::detect(settings.max_concurrency);
        Ok(Self {
            transformer: Arc::new(Transformer::new(encoder, settings)),
            parallelism,
        })
    }

    /// Send per-file lines to `reporter` instead of the log.
    pub fn with_reporter(mut self, reporter: Arc<dyn OutcomeReporter>) -> Self {
        let transformer = (*self.transformer).clone().with_reporter(reporter);
        self.transformer = Arc::new(transformer);
        self
    }

    /// Override the detected parallelism.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Parallelism the next run will use.
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Process every candidate and wait for all of them to settle. Per-file
    /// problems end up in the summary; only limiter setup can fail here.
    pub async fn run<I>(
        &self,
        candidates: I,
        options: RunOptions,
    ) -> Result<RunReport>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let paths = dedup(candidates);
        let mut report = RunReport {
            summary: RunSummary::new(options.dry_run),
            files: Vec::with_capacity(paths.len()),
            tuning: None,
        };

        if paths.is_empty() {
            info!("no candidate images");
            return Ok(report);
        }

        if self.transformer.settings().tune_encoder_threads {
            let threads = self.parallelism.threads_per_file;
            report.tuning = Some(tune_encoder_pool(threads));
        }

        let limiter = Limiter::new(self.parallelism.files)?;
        info!(
            files = paths.len(),
            concurrency = limiter.capacity(),
            dry_run = options.dry_run,
            "starting batch"
        );

        let (paths, handles): (Vec<_>, Vec<_>) = paths
            .into_iter()
            .map(|path| {
                let item = WorkItem::new(
                    path.clone(),
                    options.dry_run,
                    options.quiet,
                );
                let transformer = Arc::clone(&self.transformer);
                let handle = limiter.submit(move || async move {
                    transformer.transform(&item).await
                });
                (path, handle)
            })
            .unzip();

        let settled = join_all(handles).await;
        for (path, settled) in paths.into_iter().zip(settled) {
            let outcome = settled.unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "transform did not complete"
                );
                TransformOutcome::failed(err)
            });
            report.files.push(FileReport { path, outcome });
        }

        limiter.shutdown().await;

        let outcomes = report.files.iter().map(|file| &file.outcome);
        report.summary = RunSummary {
            dry_run: options.dry_run,
            ..outcomes.collect::<RunSummary>()
        };

        info!(
            files = report.summary.files,
            compressed = report.summary.compressed,
            failed = report.summary.failed,
            saved = %format_size(report.summary.total_saved),
            "batch complete"
        );
        Ok(report)
    }
}

/// Drop repeated paths, keeping the first occurrence. Two work items on the
/// same path would race on its temp and backup artifacts.
fn dedup<I>(candidates: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    let paths: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|path| {
            let fresh = seen.insert(path.clone());
            if !fresh {
                duplicates += 1;
            }
            fresh
        })
        .collect();
    if duplicates > 0 {
        debug!(duplicates, "dropped duplicate candidate paths");
    }
    paths
}
