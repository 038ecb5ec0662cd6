//! Crash-safe image shrinking pipeline.
//!
//! [`Coordinator`] takes a list of candidate paths, runs each through the
//! [`Transformer`] under a [`Limiter`], and reduces the results into a
//! [`RunSummary`]. A file is only ever replaced by a strictly smaller
//! re-encoding, through a sibling temp file and an atomic rename, with a
//! backup held until the swap is known good.

pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod format;
pub mod fs_ops;
pub mod limiter;
pub mod outcome;
pub mod report;
pub mod settings;
pub mod transformer;
pub mod tuning;

pub use coordinator::{Coordinator, RunOptions, RunReport};
pub use encoder::{Encoder, ImageEncoder};
pub use error::{EncodeError, GuardError, LimiterError, Result};
pub use format::{OutputFormat, SUPPORTED_EXTENSIONS};
pub use limiter::{Limiter, TaskHandle};
pub use outcome::{
    FileReport, OutcomeKind, RunSummary, TransformOutcome, format_size,
};
pub use report::{OutcomeReporter, TracingReporter};
pub use settings::{PipelineSettings, RetrySettings};
pub use transformer::{Transformer, WorkItem};
pub use tuning::{Parallelism, PoolTuning};
