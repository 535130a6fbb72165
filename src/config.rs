//!
//! Configuration loading for docmend. A single TOML file (`.docmend.toml` or
//! `docmend.toml`, discovered upward from the working directory) carries the
//! global processor toggles, file selection globs, per-file disables, and one
//! optional table per processor.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names probed during upward discovery, in priority order.
pub const CONFIG_FILE_NAMES: &[&str] = &[".docmend.toml", "docmend.toml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {source}. File: {path}")]
    IoError {
        #[source]
        source: std::io::Error,
        path: String,
    },

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config file already exists: {path}")]
    FileExists { path: String },

    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

fn default_true() -> bool {
    true
}

/// The `[global]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalConfig {
    /// Processors to enable. Empty means all registered processors.
    pub enable: Vec<String>,
    /// Processors to disable. Applied after `enable`.
    pub disable: Vec<String>,
    /// Glob patterns selecting files for batch runs. Empty means everything
    /// under the given paths.
    pub include: Vec<String>,
    /// Glob patterns excluding files from batch runs.
    pub exclude: Vec<String>,
    /// Whether batch runs honor `.gitignore` files.
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            enable: Vec::new(),
            disable: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            respect_gitignore: true,
        }
    }
}

/// Free-form settings for one processor, `[markdown-format]` and friends.
/// Typed processor configs deserialize out of `values` via
/// [`Config::processor_settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessorSettings {
    #[serde(flatten)]
    pub values: BTreeMap<String, toml::Value>,
}

/// Fully loaded configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    /// Glob pattern -> processor names disabled for matching files.
    #[serde(default, rename = "per-file-disables")]
    pub per_file_disables: BTreeMap<String, Vec<String>>,

    /// Per-processor tables, keyed by normalized processor name.
    #[serde(default, flatten)]
    pub processors: BTreeMap<String, ProcessorSettings>,
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            source,
            path: path.display().to_string(),
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Walk up from `start`, returning the first config file found.
    pub fn discover(start: &Path) -> Option<PathBuf> {
        let mut dir = if start.is_dir() { start } else { start.parent()? };
        loop {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            dir = dir.parent()?;
        }
    }

    /// Resolve configuration for a run: an explicit path wins, `isolated`
    /// skips discovery, otherwise the nearest discovered file is used and a
    /// missing file falls back to defaults.
    pub fn load_or_default(explicit: Option<&Path>, isolated: bool) -> Result<Config, ConfigError> {
        if let Some(path) = explicit {
            return Config::load(path);
        }
        if isolated {
            return Ok(Config::default());
        }
        match std::env::current_dir().ok().and_then(|cwd| Config::discover(&cwd)) {
            Some(path) => {
                log::debug!("Using config file {}", path.display());
                Config::load(&path)
            }
            None => Ok(Config::default()),
        }
    }

    /// Deserialize the `[name]` table into a typed settings struct, falling
    /// back to defaults when the table is absent or does not fit.
    pub fn processor_settings<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        self.processors
            .get(&normalize_key(name))
            .and_then(|s| serde_json::to_value(&s.values).ok())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Processor names disabled for `path` via `per-file-disables` globs.
    pub fn disabled_for_file(&self, path: &str) -> HashSet<String> {
        let mut disabled = HashSet::new();
        for (pattern, names) in &self.per_file_disables {
            let Ok(glob) = globset::Glob::new(pattern) else {
                log::warn!("Ignoring invalid per-file-disables pattern '{pattern}'");
                continue;
            };
            if glob.compile_matcher().is_match(path) {
                disabled.extend(names.iter().map(|n| normalize_key(n)));
            }
        }
        disabled
    }

    fn normalize(&mut self) {
        self.global.enable = self.global.enable.iter().map(|n| normalize_key(n)).collect();
        self.global.disable = self.global.disable.iter().map(|n| normalize_key(n)).collect();
        let processors = std::mem::take(&mut self.processors);
        self.processors = processors.into_iter().map(|(k, v)| (normalize_key(&k), v)).collect();
    }

    /// Reject `per-file-disables` patterns that do not compile as globs.
    /// Include and exclude lists go through `ignore`'s override syntax and
    /// are checked where they are used.
    fn validate(&self) -> Result<(), ConfigError> {
        for pattern in self.per_file_disables.keys() {
            if let Err(source) = globset::Glob::new(pattern) {
                return Err(ConfigError::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}

/// Canonical form of a processor name: lowercase kebab-case.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

/// Template written by `docmend init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# docmend configuration

[global]
# Processors to enable (empty = all): "html-to-markdown", "markdown-format",
# "list-format", "code-block-format"
enable = []
# Processors to disable
disable = []
# Globs selecting files for batch runs
include = []
# Globs excluding files from batch runs
exclude = []
# Honor .gitignore files during batch runs
respect-gitignore = true

# Disable specific processors for matching files
# [per-file-disables]
# "docs/generated/**" = ["markdown-format", "list-format"]

# [markdown-format]
# extra-sentence-starters = ["Additionally"]

# [code-block-format]
# extra-command-words = ["bazel"]
"#;

/// Write the default config template, refusing to clobber an existing file.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::FileExists {
            path: path.display().to_string(),
        });
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(|source| ConfigError::IoError {
        source,
        path: path.display().to_string(),
    })
}
