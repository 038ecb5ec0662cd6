//! The top-level config document and where it came from.

use anyhow::{Context, anyhow};
use imguard_core::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{models::discovery::DiscoverySettings, validation};

/// Path to a TOML or JSON config file.
pub const CONFIG_PATH_ENV: &str = "IMGUARD_CONFIG_PATH";
/// Inline JSON config.
pub const CONFIG_JSON_ENV: &str = "IMGUARD_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] =
    &["imguard.toml", ".imguard.toml", "imguard.json"];

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Nothing found; built-in defaults.
    #[default]
    Default,
    /// `--config` on the command line.
    Explicit(PathBuf),
    /// File named by [`CONFIG_PATH_ENV`].
    EnvPath(PathBuf),
    /// JSON in [`CONFIG_JSON_ENV`].
    EnvInline,
    /// Default file found in the working directory.
    File(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("built-in defaults"),
            Self::Explicit(path) => write!(f, "{}", path.display()),
            Self::EnvPath(path) => {
                write!(f, "{} (via {CONFIG_PATH_ENV})", path.display())
            }
            Self::EnvInline => f.write_str(CONFIG_JSON_ENV),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything a run needs besides the candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// `[pipeline]`, handed to the core as is.
    pub pipeline: PipelineSettings,
    /// `[discovery]`, used by the CLI only.
    pub discovery: DiscoverySettings,
}

/// Command-line values that win over whatever the file said.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--concurrency`
    pub max_concurrency: Option<usize>,
    /// Appended to the configured ignore list.
    pub ignore: Vec<String>,
}

impl GuardConfig {
    /// Resolve configuration for a run from the process environment and the
    /// current directory. Evaluation order:
    /// 1) `explicit` (the `--config` flag),
    /// 2) `$IMGUARD_CONFIG_PATH` (TOML or JSON file),
    /// 3) `$IMGUARD_CONFIG_JSON` (inline JSON),
    /// 4) `imguard.toml`, `.imguard.toml` or `imguard.json` in the working
    ///    directory,
    /// 5) defaults.
    pub fn load(
        explicit: Option<&Path>,
    ) -> anyhow::Result<(Self, ConfigSource)> {
        Self::load_with(explicit, |key| env::var(key).ok(), Path::new("."))
    }

    /// [`GuardConfig::load`] with the environment and working directory
    /// supplied by the caller.
    pub fn load_with<E>(
        explicit: Option<&Path>,
        env_lookup: E,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, ConfigSource)>
    where
        E: Fn(&str) -> Option<String>,
    {
        let (mut config, source) =
            Self::resolve(explicit, env_lookup, base_dir)?;
        config.discovery.normalize();
        validation::validate(&config)
            .with_context(|| format!("invalid configuration from {source}"))?;
        debug!(%source, "configuration loaded");
        Ok((config, source))
    }

    fn resolve<E>(
        explicit: Option<&Path>,
        env_lookup: E,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, ConfigSource)>
    where
        E: Fn(&str) -> Option<String>,
    {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
        }

        if let Some(path_str) = env_lookup(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = env_lookup(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw).with_context(|| {
                format!("failed to parse {CONFIG_JSON_ENV}")
            })?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base_dir) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    /// Parse a file, by extension when it has a known one.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read imguard config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid imguard config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid imguard config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Parse text of unknown format. `origin` names it in errors.
    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse imguard config {}: \
                     toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    /// Parse JSON text.
    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid imguard config json: {err}"))
    }

    /// Layer command-line values on top and re-validate.
    pub fn apply_overrides(
        &mut self,
        overrides: ConfigOverrides,
    ) -> anyhow::Result<()> {
        if let Some(max) = overrides.max_concurrency {
            self.pipeline.max_concurrency = max;
        }
        self.discovery.ignore.extend(overrides.ignore);
        self.discovery.normalize();
        validation::validate(self)
            .context("invalid command-line override")?;
        Ok(())
    }

    fn find_default_file(base_dir: &Path) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|name| base_dir.join(name))
            .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_only_needs_changed_keys() {
        let toml = "[pipeline]\nmax_concurrency = 2\n\n\
                    [pipeline.retry]\nmax_attempts = 3\n";
        let config = GuardConfig::parse_from_str(toml, "inline").unwrap();
        assert_eq!(config.pipeline.max_concurrency, 2);
        assert_eq!(config.pipeline.retry.max_attempts, 3);
        assert_eq!(config.pipeline.retry.backoff_base_ms, 100);
        assert_eq!(config.discovery, DiscoverySettings::default());
    }

    #[test]
    fn json_is_accepted_as_fallback() {
        let config = GuardConfig::parse_from_str(
            r#"{"discovery": {"ignore": ["vendor/"]}}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.discovery.ignore, vec!["vendor/"]);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err =
            GuardConfig::parse_from_str("{{ nope", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"), "{message}");
        assert!(message.contains("json error"), "{message}");
    }

    #[test]
    fn overrides_win_and_are_validated() {
        let mut config = GuardConfig::default();
        config.discovery.ignore.push("docs/".into());
        config
            .apply_overrides(ConfigOverrides {
                max_concurrency: Some(1),
                ignore: vec!["vendor/*".into()],
            })
            .unwrap();
        assert_eq!(config.pipeline.max_concurrency, 1);
        assert_eq!(config.discovery.ignore, vec!["docs/", "vendor/*"]);

        let err = config
            .apply_overrides(ConfigOverrides {
                max_concurrency: Some(0),
                ignore: Vec::new(),
            })
            .unwrap_err();
        assert!(format!("{err:#}").contains("max_concurrency"));
    }

    #[test]
    fn source_display_names_the_origin() {
        assert_eq!(ConfigSource::Default.to_string(), "built-in defaults");
        assert_eq!(ConfigSource::EnvInline.to_string(), CONFIG_JSON_ENV);
        assert!(
            ConfigSource::EnvPath(PathBuf::from("x.toml"))
                .to_string()
                .contains(CONFIG_PATH_ENV)
        );
    }
}
