//! `[discovery]`: which files are candidates.

use imguard_core::SUPPORTED_EXTENSIONS;
use serde::{Deserialize, Serialize};

fn default_extensions() -> Vec<String> {
    SUPPORTED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Which files the CLI hands to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Extensions considered images, matched case-insensitively. Must be a
    /// subset of the formats the encoder supports.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Paths, directory prefixes or simple globs to leave alone. Merged with
    /// any `--ignore` patterns given on the command line.
    pub ignore: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore: Vec::new(),
        }
    }
}

impl DiscoverySettings {
    /// Lowercase, strip leading dots, drop blanks and duplicates.
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.extensions.len());
        for ext in self.extensions.drain(..) {
            let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            if !ext.is_empty() && !seen.contains(&ext) {
                seen.push(ext);
            }
        }
        self.extensions = seen;

        self.ignore = self
            .ignore
            .drain(..)
            .map(|pattern| pattern.trim().to_string())
            .filter(|pattern| !pattern.is_empty())
            .collect();
    }

    /// Case-insensitive membership test on a bare extension.
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}
