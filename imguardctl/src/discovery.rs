//! Turns a directory (or the git index) into the candidate list handed to the
//! coordinator.

use std::{
    collections::BTreeSet,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, bail};
use imguard_config::DiscoverySettings;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::git;

/// One `--ignore` entry, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreRule {
    /// A file, or a directory and everything below it.
    Path(String),
    /// Anything whose path starts with this string (`assets/logo*`).
    Prefix(String),
    /// Slash-separated segments; `*` matches within a segment, `**` matches
    /// any number of segments.
    Glob(Vec<String>),
}

impl IgnoreRule {
    /// `None` for blank patterns. A leading `!` and `./` are tolerated.
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        if pattern.is_empty() {
            return None;
        }

        if let Some(dir) = pattern.strip_suffix('/') {
            return Some(Self::Path(dir.trim_end_matches('/').to_string()));
        }
        if let Some(prefix) = pattern.strip_suffix('*')
            && !prefix.contains('*')
        {
            return Some(Self::Prefix(prefix.to_string()));
        }
        if pattern.contains('*') {
            let segments = pattern.split('/').map(str::to_string).collect();
            return Some(Self::Glob(segments));
        }
        Some(Self::Path(pattern.to_string()))
    }

    /// `path` is relative to the discovery root, `/`-separated.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Path(target) => {
                path == target
                    || path
                        .strip_prefix(target.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Glob(segments) => {
                let parts: Vec<&str> = path.split('/').collect();
                glob_segments(segments, &parts)
            }
        }
    }
}

fn glob_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=path.len()).any(|skip| glob_segments(rest, &path[skip..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((part, remaining)) => {
                wildcard(head.as_bytes(), part.as_bytes())
                    && glob_segments(rest, remaining)
            }
            None => false,
        },
    }
}

/// `*` within one segment.
fn wildcard(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => {
            (0..=text.len()).any(|skip| wildcard(rest, &text[skip..]))
        }
        Some((ch, rest)) => {
            text.first() == Some(ch) && wildcard(rest, &text[1..])
        }
    }
}

/// Extension and ignore filtering shared by the directory walk and staged
/// mode.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    settings: DiscoverySettings,
    rules: Vec<IgnoreRule>,
}

impl CandidateFilter {
    /// Parse the ignore patterns once.
    pub fn new(settings: DiscoverySettings) -> Self {
        let rules = settings
            .ignore
            .iter()
            .filter_map(|pattern| IgnoreRule::parse(pattern))
            .collect();
        Self { settings, rules }
    }

    /// Extensions searched for, as configured.
    pub fn extensions(&self) -> &[String] {
        &self.settings.extensions
    }

    /// `relative` is a path below the discovery root.
    pub fn accepts(&self, relative: &Path) -> bool {
        let has_extension = relative
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.settings.matches_extension(ext));
        if !has_extension {
            return false;
        }
        let normalized = slash_path(relative);
        !self.rules.iter().any(|rule| rule.matches(&normalized))
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Hidden entries are skipped, which also keeps `.git` and the pipeline's own
/// temp artifacts out of the walk.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Walk `root` and return accepted files relative to it, sorted.
pub fn walk(
    root: &Path,
    filter: &CandidateFilter,
) -> anyhow::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let mut found = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if filter.accepts(relative) {
            found.insert(relative.to_path_buf());
        }
    }
    Ok(found.into_iter().collect())
}

/// Where the candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every file below the root that git does not ignore.
    Walk,
    /// Only files staged in the git index.
    Staged,
}

/// Candidate paths for a run, usable from the process working directory.
pub async fn discover(
    root: &Path,
    filter: &CandidateFilter,
    mode: Mode,
) -> anyhow::Result<Vec<PathBuf>> {
    let relative = match mode {
        Mode::Walk => walk_outside_gitignore(root, filter).await?,
        Mode::Staged => staged(root, filter).await?,
    };
    info!(count = relative.len(), ?mode, "discovery complete");
    Ok(relative
        .into_iter()
        .map(|path| resolve(root, path))
        .collect())
}

async fn walk_outside_gitignore(
    root: &Path,
    filter: &CandidateFilter,
) -> anyhow::Result<Vec<PathBuf>> {
    let walk_root = root.to_path_buf();
    let walk_filter = filter.clone();
    let found =
        tokio::task::spawn_blocking(move || walk(&walk_root, &walk_filter))
            .await
            .context("directory walk panicked")??;

    if found.is_empty() || !git::is_work_tree(root).await {
        return Ok(found);
    }
    let ignored = git::ignored(root, &found).await?;
    if !ignored.is_empty() {
        debug!(count = ignored.len(), "dropping gitignored images");
    }
    Ok(found
        .into_iter()
        .filter(|path| !ignored.contains(path))
        .collect())
}

async fn staged(
    root: &Path,
    filter: &CandidateFilter,
) -> anyhow::Result<Vec<PathBuf>> {
    let staged = git::staged_files(root).await?;
    let accepted: BTreeSet<PathBuf> = staged
        .into_iter()
        .filter(|path| filter.accepts(path))
        .filter(|path| is_plain_file(&root.join(path)))
        .collect();
    Ok(accepted.into_iter().collect())
}

/// A regular file, not a link to one. Staged entries can be symlinks, and
/// the walk already skips those.
fn is_plain_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.is_file())
}

fn resolve(root: &Path, relative: PathBuf) -> PathBuf {
    if root == Path::new(".") {
        relative
    } else {
        root.join(relative)
    }
}
