//! Per-file outcomes and their reduction into a run summary.

use std::{fmt, path::PathBuf};

use serde::Serialize;

/// Result of one transform attempt. Produced exactly once per work item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformOutcome {
    /// The file now holds the smaller encoding (or would, in a dry run).
    Compressed {
        /// Source size in bytes.
        before: u64,
        /// Size of the new encoding.
        after: u64,
    },
    /// Re-encoding did not help. `after > before` means the file was already
    /// compressed more aggressively than the encoder manages.
    SkippedAlreadyOptimal {
        /// Source size in bytes.
        before: u64,
        /// Size of the discarded encoding.
        after: u64,
    },
    /// Larger than the configured ceiling; never read.
    SkippedTooLarge {
        /// Source size in bytes.
        size: u64,
    },
    /// Zero-byte file.
    SkippedEmpty,
    /// Unrecognised extension or bytes the decoder rejects.
    SkippedCorrupt {
        /// Decoder message.
        reason: String,
    },
    /// Valid input that cannot be re-encoded without losing content, or a
    /// path that is not a plain file of its own.
    SkippedUnsupported {
        /// What made it unsupported.
        reason: String,
    },
    /// Anything else. The source is untouched.
    Failed {
        /// Rendered error.
        reason: String,
    },
}

/// [`TransformOutcome`] without its payload, for counting.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// [`TransformOutcome::Compressed`]
    Compressed,
    /// [`TransformOutcome::SkippedAlreadyOptimal`]
    AlreadyOptimal,
    /// [`TransformOutcome::SkippedTooLarge`]
    TooLarge,
    /// [`TransformOutcome::SkippedEmpty`]
    Empty,
    /// [`TransformOutcome::SkippedCorrupt`]
    Corrupt,
    /// [`TransformOutcome::SkippedUnsupported`]
    Unsupported,
    /// [`TransformOutcome::Failed`]
    Failed,
}

impl TransformOutcome {
    /// `max(0, before - after)` for compressed files, zero otherwise.
    pub fn saved_bytes(&self) -> u64 {
        match self {
            Self::Compressed { before, after } => before.saturating_sub(*after),
            _ => 0,
        }
    }

    /// The variant, without payload.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Compressed { .. } => OutcomeKind::Compressed,
            Self::SkippedAlreadyOptimal { .. } => OutcomeKind::AlreadyOptimal,
            Self::SkippedTooLarge { .. } => OutcomeKind::TooLarge,
            Self::SkippedEmpty => OutcomeKind::Empty,
            Self::SkippedCorrupt { .. } => OutcomeKind::Corrupt,
            Self::SkippedUnsupported { .. } => OutcomeKind::Unsupported,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }

    /// [`TransformOutcome::Failed`] with `reason` rendered.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Per-file record kept in the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Candidate path as submitted.
    pub path: PathBuf,
    /// How it settled.
    pub outcome: TransformOutcome,
}

/// Aggregate of a batch. Every operation is commutative and associative so
/// completion order never changes the result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Sum of [`TransformOutcome::saved_bytes`].
    pub total_saved: u64,
    /// Work items settled.
    pub files: usize,
    /// Count of [`TransformOutcome::Compressed`].
    pub compressed: usize,
    /// Count of [`TransformOutcome::SkippedAlreadyOptimal`].
    pub already_optimal: usize,
    /// Count of [`TransformOutcome::SkippedTooLarge`].
    pub too_large: usize,
    /// Count of [`TransformOutcome::SkippedEmpty`].
    pub empty: usize,
    /// Count of [`TransformOutcome::SkippedCorrupt`].
    pub corrupt: usize,
    /// Count of [`TransformOutcome::SkippedUnsupported`].
    pub unsupported: usize,
    /// Count of [`TransformOutcome::Failed`].
    pub failed: usize,
    /// Savings are hypothetical.
    pub dry_run: bool,
}

impl RunSummary {
    /// Empty summary.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Fold one outcome in.
    pub fn record(&mut self, outcome: &TransformOutcome) {
        self.files += 1;
        self.total_saved += outcome.saved_bytes();
        match outcome.kind() {
            OutcomeKind::Compressed => self.compressed += 1,
            OutcomeKind::AlreadyOptimal => self.already_optimal += 1,
            OutcomeKind::TooLarge => self.too_large += 1,
            OutcomeKind::Empty => self.empty += 1,
            OutcomeKind::Corrupt => self.corrupt += 1,
            OutcomeKind::Unsupported => self.unsupported += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }

    /// Counter for `kind`.
    pub fn count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Compressed => self.compressed,
            OutcomeKind::AlreadyOptimal => self.already_optimal,
            OutcomeKind::TooLarge => self.too_large,
            OutcomeKind::Empty => self.empty,
            OutcomeKind::Corrupt => self.corrupt,
            OutcomeKind::Unsupported => self.unsupported,
            OutcomeKind::Failed => self.failed,
        }
    }

    /// No candidates at all, as opposed to a batch where everything was
    /// skipped.
    pub fn is_empty_run(&self) -> bool {
        self.files == 0
    }

    /// The closing line printed once per run.
    pub fn message(&self) -> String {
        if self.is_empty_run() {
            "There were no images to compress.".to_string()
        } else if self.dry_run {
            format!(
                "Defensive base compression completed (dry run). \
                 You would save {}.",
                format_size(self.total_saved)
            )
        } else {
            format!(
                "Defensive base compression completed. You saved {}.",
                format_size(self.total_saved)
            )
        }
    }
}

impl<'a> FromIterator<&'a TransformOutcome> for RunSummary {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = &'a TransformOutcome>,
    {
        let mut summary = RunSummary::default();
        for outcome in iter {
            summary.record(outcome);
        }
        summary
    }
}

/// Kilobytes with two decimals, e.g. `12.50 KB`.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}
