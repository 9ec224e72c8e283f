//! Filesystem-backed configuration and bead storage for beadview.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use bv_core::{
    Bead, BindingSet, CoreError, DEFAULT_CONTEXT_HELP_KEY, DEFAULT_DOUBLE_TAP_THRESHOLD,
    DEFAULT_TUTORIAL_KEY,
};

/// Directory name used under the platform config directory.
pub const APP_DIR_NAME: &str = "beadview";

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "BV_CONFIG";

/// Default directory holding the bead database.
pub const DEFAULT_BEADS_DIR: &str = ".beads";

const CONFIG_FILE_NAME: &str = "config.yaml";
const ISSUES_FILE_NAME: &str = "issues.jsonl";

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors returned while reading configuration or beads.
#[derive(Debug, Error)]
pub enum FsError {
    /// An IO error occurred.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file could not be parsed.
    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
    /// A bead record could not be parsed.
    #[error("parse error in {} line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    /// A config value violates a domain rule.
    #[error(transparent)]
    Invalid(#[from] CoreError),
    /// No platform config directory is available.
    #[error("unable to determine config directory")]
    NoConfigDir,
}

fn io_error(path: &Path, source: std::io::Error) -> FsError {
    FsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The `tutorial` section of the config file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TutorialConfig {
    /// Key that opens the full tutorial.
    pub direct_key: String,
    /// Key that opens context help.
    pub context_help_key: String,
    /// Whether space in the help modal opens the tutorial.
    pub help_modal_space: bool,
    /// Whether double-tapping the tutorial key opens context help.
    pub double_tap: bool,
    /// Double-tap window in milliseconds.
    pub double_tap_threshold_ms: u64,
}

impl Default for TutorialConfig {
    fn default() -> Self {
        Self {
            direct_key: DEFAULT_TUTORIAL_KEY.into(),
            context_help_key: DEFAULT_CONTEXT_HELP_KEY.into(),
            help_modal_space: true,
            double_tap: true,
            double_tap_threshold_ms: u64::try_from(DEFAULT_DOUBLE_TAP_THRESHOLD.as_millis())
                .unwrap_or(300),
        }
    }
}

/// The `update` section of the config file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdateConfig {
    /// Whether `check-update` is allowed to reach the network.
    pub enabled: bool,
    /// Release endpoint returning `{tag_name, html_url}`.
    pub url: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://api.github.com/repos/beadview/beadview/releases/latest".into(),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Trigger key bindings.
    pub tutorial: TutorialConfig,
    /// Named hook commands.
    pub hooks: BTreeMap<String, String>,
    /// Update check settings.
    pub update: UpdateConfig,
    /// Directory holding `issues.jsonl`.
    pub beads_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build the validated binding set for the trigger keys.
    pub fn bindings(&self) -> FsResult<BindingSet> {
        let tutorial = &self.tutorial;
        Ok(BindingSet::new(
            tutorial.direct_key.clone(),
            tutorial.context_help_key.clone(),
            tutorial.help_modal_space,
            tutorial.double_tap,
        )?)
    }

    /// The double-tap window.
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.tutorial.double_tap_threshold_ms)
    }

    /// Resolve the beads directory, falling back to `.beads` in the
    /// working directory.
    pub fn beads_dir(&self) -> PathBuf {
        self.beads_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BEADS_DIR))
    }
}

/// Default config location under the platform config directory.
pub fn default_config_path() -> FsResult<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    Err(FsError::NoConfigDir)
}

/// Resolve the config path: explicit argument, then `BV_CONFIG`, then the
/// platform default.
pub fn resolve_config_path(explicit: Option<&Path>) -> FsResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(CONFIG_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    default_config_path()
}

/// Load config from `path`. A missing file yields defaults.
pub fn load_config(path: &Path) -> FsResult<AppConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    let config: AppConfig = serde_yaml::from_str(&contents).map_err(|err| FsError::Config {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    // Surface binding errors at load time rather than on first key press.
    config.bindings()?;
    Ok(config)
}

/// Read-only access to a beads directory.
#[derive(Debug, Clone)]
pub struct BeadStore {
    root: PathBuf,
}

impl BeadStore {
    /// Open a store rooted at `root` (usually `.beads`).
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn issues_path(&self) -> PathBuf {
        self.root.join(ISSUES_FILE_NAME)
    }

    /// Load every bead. A missing issues file yields an empty list.
    pub fn load(&self) -> FsResult<Vec<Bead>> {
        let path = self.issues_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path).map_err(|err| io_error(&path, err))?;
        parse_beads(&path, &contents)
    }
}

fn parse_beads(path: &Path, contents: &str) -> FsResult<Vec<Bead>> {
    let mut beads = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bead = serde_json::from_str(line).map_err(|err| FsError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message: err.to_string(),
        })?;
        beads.push(bead);
    }
    Ok(beads)
}
