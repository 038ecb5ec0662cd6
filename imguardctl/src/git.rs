//! The few git queries discovery needs, run through the `git` binary.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    process::{Output, Stdio},
};

use anyhow::{Context, bail};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

/// True when `root` is inside a git work tree. A missing `git` binary counts
/// as "no".
pub async fn is_work_tree(root: &Path) -> bool {
    match git(root, &["rev-parse", "--is-inside-work-tree"], None).await {
        Ok(output) => {
            output.status.success()
                && String::from_utf8_lossy(&output.stdout).trim() == "true"
        }
        Err(err) => {
            debug!(error = %err, "git unavailable, not a work tree");
            false
        }
    }
}

/// Staged additions, copies, modifications, renames and type changes,
/// relative to `root`.
pub async fn staged_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let output = git(
        root,
        &[
            "diff",
            "--name-only",
            "--cached",
            "--diff-filter=ACMRT",
            "--relative",
            "-z",
        ],
        None,
    )
    .await?;
    if !output.status.success() {
        bail!(
            "git diff --cached failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(split_nul(&output.stdout))
}

/// The subset of `paths` (relative to `root`) that git ignores.
pub async fn ignored(
    root: &Path,
    paths: &[PathBuf],
) -> anyhow::Result<HashSet<PathBuf>> {
    if paths.is_empty() {
        return Ok(HashSet::new());
    }
    let mut input = Vec::new();
    for path in paths {
        input.extend_from_slice(path.to_string_lossy().as_bytes());
        input.push(0);
    }
    let output =
        git(root, &["check-ignore", "--stdin", "-z"], Some(input)).await?;
    // 0: some paths ignored, 1: none ignored, anything else is fatal.
    match output.status.code() {
        Some(0) | Some(1) => {
            Ok(split_nul(&output.stdout).into_iter().collect())
        }
        _ => bail!(
            "git check-ignore failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}

async fn git(
    root: &Path,
    args: &[&str],
    stdin: Option<Vec<u8>>,
) -> anyhow::Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    // Feed stdin from its own task so a full stdout pipe cannot deadlock.
    let writer = match (stdin, child.stdin.take()) {
        (Some(bytes), Some(mut pipe)) => Some(tokio::spawn(async move {
            pipe.write_all(&bytes).await?;
            pipe.shutdown().await
        })),
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed to wait for git {}", args.join(" ")))?;

    if let Some(writer) = writer {
        writer
            .await
            .context("git stdin writer panicked")?
            .context("failed to write to git stdin")?;
    }
    Ok(output)
}

fn split_nul(bytes: &[u8]) -> Vec<PathBuf> {
    bytes
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            PathBuf::from(String::from_utf8_lossy(chunk).into_owned())
        })
        .collect()
}
