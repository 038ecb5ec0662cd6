//! Filesystem mutations used by the replace protocol, each wrapped in the
//! bounded retry for transient lock races.

use std::{future::Future, io, path::Path};

use tokio::fs::{File, OpenOptions};
use tracing::debug;

use crate::{
    error::{GuardError, Result},
    settings::RetrySettings,
};

/// How a temp artifact ended up at the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapMethod {
    /// Atomic rename.
    Renamed,
    /// Source and destination were on different devices.
    Copied,
}

/// Errors that usually clear once a concurrent handle (indexer, antivirus,
/// editor) lets go of the file.
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::ExecutableFileBusy
    ) {
        return true;
    }

    #[cfg(windows)]
    {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        if matches!(err.raw_os_error(), Some(32) | Some(33)) {
            return true;
        }
    }

    false
}

/// Run `f` until it succeeds, fails with a non-transient error, or the
/// attempt budget runs out.
pub async fn with_retry<T, F, Fut>(
    retry: &RetrySettings,
    op: &'static str,
    path: &Path,
    mut f: F,
) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt: u16 = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < retry.max_attempts => {
                let delay = retry.delay_after(attempt);
                debug!(
                    op,
                    path = %path.display(),
                    attempt,
                    ?delay,
                    error = %err,
                    "transient filesystem error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Copy `from` over `to`, permissions included.
pub async fn copy(
    retry: &RetrySettings,
    from: &Path,
    to: &Path,
) -> Result<u64> {
    with_retry(retry, "copy", from, || tokio::fs::copy(from, to))
        .await
        .map_err(|err| GuardError::io("copy", from, err))
}

/// Copy `from` into `to`, which must not exist yet. Permissions are copied
/// and the data is synced. A partial copy is removed again, so on error
/// nothing is left at `to`, and an existing file there is never opened.
pub async fn copy_new(
    retry: &RetrySettings,
    from: &Path,
    to: &Path,
) -> Result<u64> {
    with_retry(retry, "copy", from, || async move {
        let mut reader = File::open(from).await?;
        let permissions = reader.metadata().await?.permissions();
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .await?;

        let copied: io::Result<u64> = async {
            let len = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.sync_all().await?;
            writer.set_permissions(permissions).await?;
            Ok(len)
        }
        .await;
        if copied.is_err() {
            drop(writer);
            let _ = tokio::fs::remove_file(to).await;
        }
        copied
    })
    .await
    .map_err(|err| GuardError::io("copy", from, err))
}

/// Rename `from` onto `to`, replacing it.
pub async fn rename(
    retry: &RetrySettings,
    from: &Path,
    to: &Path,
) -> Result<()> {
    with_retry(retry, "rename", from, || tokio::fs::rename(from, to))
        .await
        .map_err(|err| GuardError::io("rename", from, err))
}

/// Delete `path`. A missing file counts as deleted; returns whether a file
/// was actually removed.
pub async fn remove_if_exists(
    retry: &RetrySettings,
    path: &Path,
) -> Result<bool> {
    let removed = with_retry(retry, "remove", path, || async move {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    })
    .await
    .map_err(|err| GuardError::io("remove", path, err))?;
    Ok(removed)
}

/// Move `from` onto `to`, atomically where the platform allows. When the
/// two paths are on different devices the rename cannot work, so copy the
/// bytes over and delete `from`.
pub async fn rename_or_copy(
    retry: &RetrySettings,
    from: &Path,
    to: &Path,
) -> Result<SwapMethod> {
    let renamed =
        with_retry(retry, "rename", from, || tokio::fs::rename(from, to)).await;
    match renamed {
        Ok(()) => Ok(SwapMethod::Renamed),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                "cross-device rename, falling back to copy"
            );
            copy(retry, from, to).await?;
            remove_if_exists(retry, from).await?;
            Ok(SwapMethod::Copied)
        }
        Err(err) => Err(GuardError::io("rename", from, err)),
    }
}
