//! Per-file state machine: stat, encode, compare, replace.
//!
//! Whatever happens, the source either ends up holding the smaller encoding
//! or is byte-for-byte untouched, mode bits included. The backup artifact
//! is only created once a smaller result is known, and the temp artifact
//! never outlives the call.

use std::{
    fs::Permissions,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    encoder::Encoder,
    error::{EncodeError, GuardError, Result},
    format::OutputFormat,
    fs_ops::{self, SwapMethod},
    outcome::TransformOutcome,
    report::{OutcomeReporter, TracingReporter},
    settings::{PipelineSettings, RetrySettings},
};

/// Every temp artifact name starts with this.
pub const TEMP_PREFIX: &str = ".imguard-tmp-";

/// Every backup artifact name starts with this.
pub const BACKUP_PREFIX: &str = ".imguard-bak-";

/// Input to one transform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// File to shrink in place.
    pub path: PathBuf,
    /// Encode and compare, but never replace.
    pub dry_run: bool,
    /// Suppresses the per-file report line only.
    pub quiet: bool,
}

impl WorkItem {
    /// Bundle a path with its run flags.
    pub fn new(path: impl Into<PathBuf>, dry_run: bool, quiet: bool) -> Self {
        Self {
            path: path.into(),
            dry_run,
            quiet,
        }
    }
}

fn sibling(source: &Path, prefix: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!(
        "{prefix}{}-{name}",
        Uuid::new_v4().simple()
    ))
}

/// Sibling temp path for `source`: same directory, so the final swap is a
/// same-device rename.
pub fn temp_path_for(source: &Path) -> PathBuf {
    sibling(source, TEMP_PREFIX)
}

/// Fresh backup path for `source`. Unique per call, so a file the user
/// keeps next to the source (`logo.png.bak`, say) is never in the way.
pub fn backup_path_for(source: &Path) -> PathBuf {
    sibling(source, BACKUP_PREFIX)
}

/// True for file names the pipeline creates and is expected to clean up.
pub fn is_pipeline_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with(TEMP_PREFIX) || name.starts_with(BACKUP_PREFIX)
        })
}

/// Backup lifecycle inside one replace. Only moves forward.
#[derive(Clone, Debug, PartialEq, Eq)]
enum BackupState {
    NoBackup,
    Present(PathBuf),
    /// Either restored onto the source or released after a successful swap.
    Consumed,
}

impl BackupState {
    fn rank(&self) -> u8 {
        match self {
            Self::NoBackup => 0,
            Self::Present(_) => 1,
            Self::Consumed => 2,
        }
    }

    fn advance(&mut self, next: BackupState) {
        debug_assert!(
            next.rank() > self.rank(),
            "backup state moved backwards: {self:?} -> {next:?}"
        );
        *self = next;
    }
}

/// Encoder output on disk. Removed on drop unless it was moved onto the
/// source, so a cancelled or panicking transform still cleans up.
#[derive(Debug)]
struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Write `bytes` to a new file at `path` carrying `permissions`, so the
    /// rename onto the source keeps the source's mode.
    async fn write(
        path: PathBuf,
        bytes: &[u8],
        permissions: Permissions,
    ) -> Result<Self> {
        let artifact = Self { path, armed: true };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&artifact.path)
            .await
            .map_err(|err| GuardError::io("create", &artifact.path, err))?;
        file.write_all(bytes)
            .await
            .map_err(|err| GuardError::io("write", &artifact.path, err))?;
        file.sync_all()
            .await
            .map_err(|err| GuardError::io("sync", &artifact.path, err))?;
        file.set_permissions(permissions)
            .await
            .map_err(|err| GuardError::io("chmod", &artifact.path, err))?;
        Ok(artifact)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn len(&self) -> Result<u64> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|meta| meta.len())
            .map_err(|err| GuardError::io("stat", &self.path, err))
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn discard(mut self, retry: &RetrySettings) {
        match fs_ops::remove_if_exists(retry, &self.path).await {
            Ok(_) => self.armed = false,
            Err(err) => warn!(error = %err, "failed to remove temp artifact"),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temp artifact on drop"
            );
        }
    }
}

/// Runs one file through stat, encode, compare and replace.
#[derive(Clone)]
pub struct Transformer {
    encoder: Arc<dyn Encoder>,
    settings: PipelineSettings,
    reporter: Arc<dyn OutcomeReporter>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    /// Transformer reporting through [`TracingReporter`].
    pub fn new(encoder: Arc<dyn Encoder>, settings: PipelineSettings) -> Self {
        Self {
            encoder,
            settings,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Swap the per-file reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn OutcomeReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Settings this transformer was built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one work item to its single outcome. Never panics on I/O errors
    /// and never returns an error: failures are outcomes.
    pub async fn transform(&self, item: &WorkItem) -> TransformOutcome {
        let outcome = self.run(item).await;
        debug!(
            path = %item.path.display(),
            dry_run = item.dry_run,
            kind = ?outcome.kind(),
            saved = outcome.saved_bytes(),
            "transform finished"
        );
        if !item.quiet {
            self.reporter
                .file_finished(&item.path, &outcome, item.dry_run);
        }
        outcome
    }

    async fn run(&self, item: &WorkItem) -> TransformOutcome {
        let source = item.path.as_path();
        let retry = &self.settings.retry;

        // Stat, without following links: renaming onto a link would
        // replace the link, not its target.
        let meta = match tokio::fs::symlink_metadata(source).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                return TransformOutcome::SkippedUnsupported {
                    reason: "symbolic link".into(),
                };
            }
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return TransformOutcome::failed("not a regular file"),
            Err(err) => {
                return TransformOutcome::failed(GuardError::io(
                    "stat", source, err,
                ));
            }
        };
        let before = meta.len();
        if before == 0 {
            return TransformOutcome::SkippedEmpty;
        }
        if before > self.settings.max_file_size {
            return TransformOutcome::SkippedTooLarge { size: before };
        }

        // Encode
        let Some(format) = OutputFormat::from_path(source) else {
            return TransformOutcome::SkippedCorrupt {
                reason: "unrecognised file extension".into(),
            };
        };
        let bytes = match self.encode(source, format).await {
            Ok(bytes) => bytes,
            Err(GuardError::Encode(EncodeError::Decode(reason))) => {
                return TransformOutcome::SkippedCorrupt { reason };
            }
            Err(GuardError::Encode(EncodeError::Unsupported(reason))) => {
                return TransformOutcome::SkippedUnsupported { reason };
            }
            Err(err) => return TransformOutcome::failed(err),
        };
        let temp = TempArtifact::write(
            temp_path_for(source),
            &bytes,
            meta.permissions(),
        )
        .await;
        let temp = match temp {
            Ok(temp) => temp,
            Err(err) => return TransformOutcome::failed(err),
        };
        drop(bytes);

        // Compare
        let after = match temp.len().await {
            Ok(len) => len,
            Err(err) => {
                temp.discard(retry).await;
                return TransformOutcome::failed(err);
            }
        };
        if after == 0 {
            temp.discard(retry).await;
            return TransformOutcome::failed("encoder produced an empty file");
        }
        if after >= before {
            temp.discard(retry).await;
            return TransformOutcome::SkippedAlreadyOptimal { before, after };
        }
        if item.dry_run {
            temp.discard(retry).await;
            return TransformOutcome::Compressed { before, after };
        }

        // Replace
        match self.replace(source, temp).await {
            Ok(method) => {
                debug!(
                    path = %source.display(),
                    ?method,
                    before,
                    after,
                    "replaced"
                );
                TransformOutcome::Compressed { before, after }
            }
            Err(err) => TransformOutcome::failed(err),
        }
    }

    async fn encode(
        &self,
        source: &Path,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        let encoder = Arc::clone(&self.encoder);
        let path = source.to_path_buf();
        let job =
            tokio::task::spawn_blocking(move || encoder.encode(&path, format));

        // On timeout the blocking job keeps running but only fills a buffer
        // that is then dropped; nothing touches the disk.
        let joined = match self.settings.encode_timeout() {
            Some(limit) => tokio::time::timeout(limit, job).await.map_err(|_| {
                GuardError::Timeout {
                    path: source.to_path_buf(),
                    secs: limit.as_secs(),
                }
            })?,
            None => job.await,
        };

        let bytes = joined.map_err(|err| {
            GuardError::Internal(format!("encoder task failed: {err}"))
        })??;
        Ok(bytes)
    }

    /// Swap `temp` onto `source`, keeping a backup until the swap is known
    /// good. On any failure the source is restored before returning.
    async fn replace(
        &self,
        source: &Path,
        mut temp: TempArtifact,
    ) -> Result<SwapMethod> {
        let retry = &self.settings.retry;
        let backup_path = backup_path_for(source);
        let mut backup = BackupState::NoBackup;

        let swapped = async {
            fs_ops::copy_new(retry, source, &backup_path).await?;
            backup.advance(BackupState::Present(backup_path.clone()));
            fs_ops::rename_or_copy(retry, temp.path(), source).await
        }
        .await;

        match swapped {
            Ok(method) => {
                temp.disarm();
                self.release_backup(&mut backup).await;
                Ok(method)
            }
            Err(err) => {
                temp.discard(retry).await;
                self.restore(source, &mut backup).await?;
                Err(err)
            }
        }
    }

    async fn release_backup(&self, backup: &mut BackupState) {
        let BackupState::Present(path) = backup.clone() else {
            return;
        };
        // The swap already succeeded; a stray backup is only noise.
        let retry = &self.settings.retry;
        if let Err(err) = fs_ops::remove_if_exists(retry, &path).await {
            warn!(error = %err, "failed to delete backup after replace");
        }
        backup.advance(BackupState::Consumed);
    }

    async fn restore(
        &self,
        source: &Path,
        backup: &mut BackupState,
    ) -> Result<()> {
        let retry = &self.settings.retry;
        match backup.clone() {
            // The exclusive copy cleans up after itself, and the source was
            // never touched.
            BackupState::NoBackup | BackupState::Consumed => Ok(()),
            BackupState::Present(path) => {
                match fs_ops::rename(retry, &path, source).await {
                    Ok(()) => {
                        backup.advance(BackupState::Consumed);
                        debug!(
                            path = %source.display(),
                            "restored from backup"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        error!(
                            path = %source.display(),
                            backup = %path.display(),
                            error = %err,
                            "restore from backup failed; backup left in place"
                        );
                        Err(err)
                    }
                }
            }
        }
    }
}
