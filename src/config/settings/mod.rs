//! Repository-level settings
//!
//! Loads per-repository configuration from `commitlens.toml` or
//! `.commitlensrc.json` in the repository root. Keys are camelCase in both
//! formats.
//!
//! # Configuration Format
//!
//! ```toml
//! # commitlens.toml
//! alwaysShowUncommittedChanges = true
//! findRenamedFiles = true
//! includeWhitespaceBlame = false
//! ignorePatterns = ["**/*.lock", "vendor/**"]
//! baseBranch = "develop"
//! maxConcurrency = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub const TOML_CONFIG_FILE: &str = "commitlens.toml";
pub const JSON_CONFIG_FILE: &str = ".commitlensrc.json";

/// Hard ceiling for the attribution worker pool
pub const MAX_CONCURRENCY: usize = 64;

/// Errors while reading a settings file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown setting: {0}")]
    UnknownKey(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Include the uncommitted-changes pseudo-commit in every pass
    pub always_show_uncommitted_changes: bool,

    /// Give merge commits a label too
    pub show_all_commits: bool,

    /// Label only merge commits (for exercising merge paths)
    pub test_merged_commits: bool,

    /// Run an extra rename-aware diff against HEAD
    pub find_renamed_files: bool,

    /// Whitespace-sensitive blame
    pub include_whitespace_blame: bool,

    /// Globs excluded from attribution
    pub ignore_patterns: Vec<String>,

    /// Watching a merge commit also watches the commits it brought in
    pub link_merged_commits: bool,

    /// Base branch for "current branch" passes
    pub base_branch: String,

    /// Concurrent blame queries per pass
    pub max_concurrency: usize,

    /// Changed-file count above which the host must confirm
    pub large_change_threshold: usize,

    /// Files not started within this many seconds are skipped
    pub pass_timeout_secs: Option<u64>,

    /// Blame queries slower than this are logged
    pub slow_query_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            always_show_uncommitted_changes: false,
            show_all_commits: false,
            test_merged_commits: false,
            find_renamed_files: false,
            include_whitespace_blame: false,
            ignore_patterns: Vec::new(),
            link_merged_commits: false,
            base_branch: "main".to_string(),
            max_concurrency: 10,
            large_change_threshold: 100,
            pass_timeout_secs: None,
            slow_query_millis: 5_000,
        }
    }
}

impl Settings {
    /// Worker count clamped to 1..=MAX_CONCURRENCY
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Keys whose values differ between `self` and `other`
    pub fn changed_keys(&self, other: &Settings) -> Vec<SettingKey> {
        SettingKey::ALL
            .iter()
            .copied()
            .filter(|key| !self.same_value(other, *key))
            .collect()
    }

    /// Copy the value for `key` from `other` into `self`
    pub fn apply(&mut self, other: &Settings, key: SettingKey) {
        match key {
            SettingKey::AlwaysShowUncommittedChanges => {
                self.always_show_uncommitted_changes = other.always_show_uncommitted_changes
            }
            SettingKey::ShowAllCommits => self.show_all_commits = other.show_all_commits,
            SettingKey::TestMergedCommits => self.test_merged_commits = other.test_merged_commits,
            SettingKey::FindRenamedFiles => self.find_renamed_files = other.find_renamed_files,
            SettingKey::IncludeWhitespaceBlame => {
                self.include_whitespace_blame = other.include_whitespace_blame
            }
            SettingKey::IgnorePatterns => self.ignore_patterns = other.ignore_patterns.clone(),
            SettingKey::LinkMergedCommits => self.link_merged_commits = other.link_merged_commits,
            SettingKey::BaseBranch => self.base_branch = other.base_branch.clone(),
            SettingKey::MaxConcurrency => self.max_concurrency = other.max_concurrency,
            SettingKey::LargeChangeThreshold => {
                self.large_change_threshold = other.large_change_threshold
            }
            SettingKey::PassTimeoutSecs => self.pass_timeout_secs = other.pass_timeout_secs,
            SettingKey::SlowQueryMillis => self.slow_query_millis = other.slow_query_millis,
        }
    }

    fn same_value(&self, other: &Settings, key: SettingKey) -> bool {
        let mut probe = self.clone();
        probe.apply(other, key);
        probe == *self
    }
}

/// Name of a single setting, as used by config-change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    AlwaysShowUncommittedChanges,
    ShowAllCommits,
    TestMergedCommits,
    FindRenamedFiles,
    IncludeWhitespaceBlame,
    IgnorePatterns,
    LinkMergedCommits,
    BaseBranch,
    MaxConcurrency,
    LargeChangeThreshold,
    PassTimeoutSecs,
    SlowQueryMillis,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::AlwaysShowUncommittedChanges,
        SettingKey::ShowAllCommits,
        SettingKey::TestMergedCommits,
        SettingKey::FindRenamedFiles,
        SettingKey::IncludeWhitespaceBlame,
        SettingKey::IgnorePatterns,
        SettingKey::LinkMergedCommits,
        SettingKey::BaseBranch,
        SettingKey::MaxConcurrency,
        SettingKey::LargeChangeThreshold,
        SettingKey::PassTimeoutSecs,
        SettingKey::SlowQueryMillis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::AlwaysShowUncommittedChanges => "alwaysShowUncommittedChanges",
            SettingKey::ShowAllCommits => "showAllCommits",
            SettingKey::TestMergedCommits => "testMergedCommits",
            SettingKey::FindRenamedFiles => "findRenamedFiles",
            SettingKey::IncludeWhitespaceBlame => "includeWhitespaceBlame",
            SettingKey::IgnorePatterns => "ignorePatterns",
            SettingKey::LinkMergedCommits => "linkMergedCommits",
            SettingKey::BaseBranch => "baseBranch",
            SettingKey::MaxConcurrency => "maxConcurrency",
            SettingKey::LargeChangeThreshold => "largeChangeThreshold",
            SettingKey::PassTimeoutSecs => "passTimeoutSecs",
            SettingKey::SlowQueryMillis => "slowQueryMillis",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept editor-style prefixed keys like "commitlens.findRenamedFiles"
        let name = s.rsplit('.').next().unwrap_or(s);
        SettingKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Path of the settings file that would be loaded, if any exists.
pub fn settings_file(repo_path: &Path) -> Option<PathBuf> {
    [TOML_CONFIG_FILE, JSON_CONFIG_FILE]
        .iter()
        .map(|name| repo_path.join(name))
        .find(|path| path.exists())
}

/// Load settings from the repository root.
///
/// Searches for configuration files in this order:
/// 1. `commitlens.toml`
/// 2. `.commitlensrc.json`
///
/// Returns default settings if no file is found or none parses.
pub fn load_settings(repo_path: &Path) -> Settings {
    let toml_path = repo_path.join(TOML_CONFIG_FILE);
    if toml_path.exists() {
        match load_toml_settings(&toml_path) {
            Ok(settings) => {
                debug!("Loaded settings from {}", toml_path.display());
                return settings;
            }
            Err(e) => warn!("{}", e),
        }
    }

    let json_path = repo_path.join(JSON_CONFIG_FILE);
    if json_path.exists() {
        match load_json_settings(&json_path) {
            Ok(settings) => {
                debug!("Loaded settings from {}", json_path.display());
                return settings;
            }
            Err(e) => warn!("{}", e),
        }
    }

    debug!("No settings file found, using defaults");
    Settings::default()
}

/// Load settings from a TOML file
pub fn load_toml_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = read(path)?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Load settings from a JSON file
pub fn load_json_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = read(path)?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
