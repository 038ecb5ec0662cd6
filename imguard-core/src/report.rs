//! Per-file report lines.

use std::path::Path;

use tracing::{info, warn};

use crate::outcome::{TransformOutcome, format_size};

/// Receives one call per non-quiet work item, from whichever worker
/// finished it.
pub trait OutcomeReporter: Send + Sync {
    /// `path` has settled with `outcome`.
    fn file_finished(
        &self,
        path: &Path,
        outcome: &TransformOutcome,
        dry_run: bool,
    );
}

/// Default reporter: per-file lines as structured log events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl OutcomeReporter for TracingReporter {
    fn file_finished(
        &self,
        path: &Path,
        outcome: &TransformOutcome,
        dry_run: bool,
    ) {
        let path = path.display();
        match outcome {
            TransformOutcome::Failed { reason } => {
                warn!(%path, dry_run, %reason, "compression failed");
            }
            other => {
                info!(%path, dry_run, "{}", describe(other));
            }
        }
    }
}

/// One-line human description, shared by every reporter.
pub fn describe(outcome: &TransformOutcome) -> String {
    let (status, details) = status_and_details(outcome);
    format!("{status} ({details})")
}

/// Leading verb and parenthesised detail of a report line, so reporters can
/// put the path in between.
pub fn status_and_details(
    outcome: &TransformOutcome,
) -> (&'static str, String) {
    match outcome {
        TransformOutcome::Compressed { before, after } => (
            "Compressed",
            format!("{} → {}", format_size(*before), format_size(*after)),
        ),
        TransformOutcome::SkippedAlreadyOptimal { before, after }
            if after > before =>
        {
            ("Skipped", "already compressed more aggressively".to_string())
        }
        TransformOutcome::SkippedAlreadyOptimal { .. } => {
            ("Skipped", "already compressed".to_string())
        }
        TransformOutcome::SkippedTooLarge { size } => {
            ("Skipped", format!("file too large: {}", format_size(*size)))
        }
        TransformOutcome::SkippedEmpty => ("Skipped", format_size(0)),
        TransformOutcome::SkippedCorrupt { .. } => {
            ("Skipped", "corrupt file".to_string())
        }
        TransformOutcome::SkippedUnsupported { reason } => {
            ("Skipped", format!("unsupported: {reason}"))
        }
        TransformOutcome::Failed { reason } => {
            ("Error compressing", reason.clone())
        }
    }
}
