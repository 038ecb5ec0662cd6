//! Tunables for the pipeline, deserialised from the config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Files above this size are skipped without being read.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Upper bound on files processed at once, before the CPU count is applied.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Pipeline tuning. Everything here has a safe default; a config file only
/// needs the keys it wants to change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Files transformed concurrently is `min(cpus, max_concurrency)`.
    pub max_concurrency: usize,
    /// Size ceiling in bytes. Larger files are reported as too large.
    pub max_file_size: u64,
    /// Retry policy for copy/rename/delete when the OS reports a lock race.
    pub retry: RetrySettings,
    /// Per-file encode timeout in seconds. `None` waits indefinitely.
    pub encode_timeout_secs: Option<u64>,
    /// Resize the encoder's shared thread pool to avoid oversubscription.
    pub tune_encoder_threads: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retry: RetrySettings::default(),
            encode_timeout_secs: None,
            tune_encoder_threads: true,
        }
    }
}

impl PipelineSettings {
    /// The per-file encode limit, if one is set.
    pub fn encode_timeout(&self) -> Option<Duration> {
        self.encode_timeout_secs.map(Duration::from_secs)
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(GuardError::InvalidSettings(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(GuardError::InvalidSettings(
                "max_file_size must be greater than 0".into(),
            ));
        }
        if self.encode_timeout_secs == Some(0) {
            return Err(GuardError::InvalidSettings(
                "encode_timeout_secs must be greater than 0 when set".into(),
            ));
        }
        self.retry.validate()
    }
}

/// Bounded retry for filesystem calls that hit a transient lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: u16,
    /// Delay before retry `n` is `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 100,
        }
    }
}

impl RetrySettings {
    /// Delay unit for the linear backoff.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Linear backoff applied after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u16) -> Duration {
        self.backoff_base() * u32::from(attempt)
    }

    /// At least one attempt is required.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GuardError::InvalidSettings(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
