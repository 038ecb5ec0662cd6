//! Sizing of file-level parallelism against the encoder's own thread pool.
//!
//! Each encode may fan out on the global rayon pool. Running N files at once
//! with a full-width pool each would oversubscribe the machine, so the pool
//! is shrunk to `cpus / N` before the batch starts.

use tracing::{debug, info};

/// How a batch splits the machine between files and encoder threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parallelism {
    /// Logical CPUs, at least 1.
    pub cpus: usize,
    /// Limiter capacity: files in flight at once.
    pub files: usize,
    /// Encoder threads available to each in-flight file.
    pub threads_per_file: usize,
}

impl Parallelism {
    /// `min(cpus, max_concurrency)` files, the CPUs split evenly among
    /// them.
    pub fn plan(cpus: usize, max_concurrency: usize) -> Self {
        let cpus = cpus.max(1);
        let files = cpus.min(max_concurrency).max(1);
        Self {
            cpus,
            files,
            threads_per_file: (cpus / files).max(1),
        }
    }

    /// [`plan`](Self::plan) against this machine's CPU count.
    pub fn detect(max_concurrency: usize) -> Self {
        Self::plan(num_cpus::get(), max_concurrency)
    }

    /// Fixed file concurrency, threads still derived from the CPU count.
    pub fn with_files(files: usize) -> Self {
        let cpus = num_cpus::get().max(1);
        let files = files.max(1);
        Self {
            cpus,
            files,
            threads_per_file: (cpus / files).max(1),
        }
    }
}

/// What happened when resizing the encoder pool. Correctness never depends
/// on it; it is reported for diagnostics only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolTuning {
    /// The global pool now has `threads` workers.
    Applied {
        /// Worker count installed.
        threads: usize,
    },
    /// A pool was already in place.
    Skipped {
        /// Why rayon refused.
        reason: String,
    },
}

/// Configure the global rayon pool. Only the first call in a process can
/// succeed; later calls report `Skipped`.
pub fn tune_encoder_pool(threads: usize) -> PoolTuning {
    let threads = threads.max(1);
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("imguard-encoder-{idx}"))
        .build_global()
    {
        Ok(()) => {
            info!(threads, "encoder thread pool configured");
            PoolTuning::Applied { threads }
        }
        Err(err) => {
            debug!(threads, error = %err, "encoder thread pool left as is");
            PoolTuning::Skipped {
                reason: err.to_string(),
            }
        }
    }
}
