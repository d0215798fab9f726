//! Persisted settings and file filter rules.
//!
//! Settings live in a single JSON document that is read in full at startup and
//! rewritten in full on every change (last writer wins):
//!
//! ```json
//! {
//!   "default_source_dir": "",
//!   "default_destination_dir": "",
//!   "file_categories": { "Documents": [".pdf", ".txt"], "Images": [".jpg"], "Others": [] },
//!   "duplicate_handling": "rename",
//!   "enable_desktop_notifications": true,
//!   "log_file_path": "organizer_log.txt",
//!   "sort_by_date_format": "None",
//!   "category_date_formats": { "Images": "Year" },
//!   "exclude_folders": [".git", "venv", "__pycache__", "node_modules"],
//!   "use_exif_date": true,
//!   "date_source": "modified",
//!   "image_category": "Images",
//!   "filters": {
//!     "include_hidden": true,
//!     "exclude": { "filenames": ["Thumbs.db"], "extensions": ["tmp"], "patterns": [], "regex": [] },
//!     "include": { "patterns": [] }
//!   }
//! }
//! ```

use crate::date_resolver::{DateBucketMode, DateSource};
use crate::file_category::CategoryTable;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file looked up in the working directory.
pub const LOCAL_SETTINGS_FILE: &str = ".dirsort.json";

/// Errors that can occur while loading, saving or compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
}

/// The whole persisted configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_source_dir: String,
    pub default_destination_dir: String,
    pub file_categories: CategoryTable,
    /// Kept as written; normalized once per run so a bad value degrades to rename.
    pub duplicate_handling: String,
    pub enable_desktop_notifications: bool,
    pub log_file_path: String,
    pub sort_by_date_format: DateBucketMode,
    /// Per-category overrides of `sort_by_date_format`.
    pub category_date_formats: BTreeMap<String, DateBucketMode>,
    pub exclude_folders: Vec<String>,
    pub use_exif_date: bool,
    pub date_source: DateSource,
    pub image_category: String,
    pub filters: FilterRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_source_dir: String::new(),
            default_destination_dir: String::new(),
            file_categories: CategoryTable::default(),
            duplicate_handling: "rename".to_string(),
            enable_desktop_notifications: true,
            log_file_path: "organizer_log.txt".to_string(),
            sort_by_date_format: DateBucketMode::None,
            category_date_formats: BTreeMap::new(),
            exclude_folders: [".git", "venv", "__pycache__", "node_modules", ".DS_Store"]
                .into_iter()
                .map(String::from)
                .collect(),
            use_exif_date: true,
            date_source: DateSource::Modified,
            image_category: "Images".to_string(),
            filters: FilterRules::default(),
        }
    }
}

impl Settings {
    /// Decides which settings file to use.
    ///
    /// 1. `explicit`, if given
    /// 2. `.dirsort.json` in the current directory, if it exists
    /// 3. `<config dir>/dirsort/config.json`
    /// 4. `.dirsort.json` in the current directory
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return local;
        }

        match dirs::config_dir() {
            Some(dir) => dir.join("dirsort").join("config.json"),
            None => local,
        }
    }

    /// Parses a settings document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Non-empty default source directory.
    pub fn default_source(&self) -> Option<PathBuf> {
        non_empty_path(&self.default_source_dir)
    }

    /// Non-empty default destination directory.
    pub fn default_destination(&self) -> Option<PathBuf> {
        non_empty_path(&self.default_destination_dir)
    }

    /// Non-empty log file path.
    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.log_file_path)
    }

    /// Bucket mode for `category`: its override, else the global mode.
    pub fn bucket_mode_for(&self, category: &str) -> DateBucketMode {
        self.category_date_formats
            .get(category)
            .copied()
            .unwrap_or(self.sort_by_date_format)
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// A settings document bound to the file it was loaded from.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Loads settings from `path`.
    ///
    /// A missing file is created with the defaults. A file that exists but
    /// cannot be decoded is left alone and the defaults are used for this session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        if !path.exists() {
            tracing::info!(
                "Settings file not found at {}. Creating with default settings.",
                path.display()
            );
            let store = Self {
                path,
                settings: Settings::default(),
            };
            store.save()?;
            return Ok(store);
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let settings = match Settings::from_json(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    "Could not decode {}: {}. Using default settings.",
                    path.display(),
                    e
                );
                Settings::default()
            }
        };

        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Writes the whole document back to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = self.settings.to_json()?;
        fs::write(&self.path, json).map_err(|e| ConfigError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Replaces one top-level setting and immediately saves the full document.
    ///
    /// `value` is read as JSON when it parses to the same JSON type the setting
    /// already has, otherwise as a plain string, so `true`, `["a", "b"]`, `rename`
    /// and a directory named `2024` all work.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut document = serde_json::to_value(&self.settings)?;
        let slot = document
            .as_object_mut()
            .and_then(|fields| fields.get_mut(key))
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let parsed = serde_json::from_str::<serde_json::Value>(value)
            .ok()
            .filter(|parsed| mem::discriminant(parsed) == mem::discriminant(&*slot));
        *slot = parsed.unwrap_or_else(|| serde_json::Value::String(value.to_string()));

        self.settings = serde_json::from_value(document)?;
        self.save()
    }
}

/// File-level filter rules applied while walking the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether names starting with "." are organized. Defaults to true.
    #[serde(default = "default_include_hidden")]
    pub include_hidden: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Glob patterns that override every exclude rule.
    #[serde(default)]
    pub include: IncludeRules,
}

fn default_include_hidden() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            include_hidden: default_include_hidden(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact file names ("Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Extensions without the dot, case-insensitive ("tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Globs matched against the path relative to the source root ("**/cache/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regexes matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl FilterRules {
    /// Validates and pre-compiles every pattern.
    pub fn compile(&self) -> Result<FileFilter, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = self
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FileFilter {
            include_hidden: self.include_hidden,
            exclude_filenames: self.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: self
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&self.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&self.include.patterns)?,
        })
    }
}

/// Compiled [`FilterRules`].
#[derive(Debug, Clone)]
pub struct FileFilter {
    include_hidden: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl Default for FileFilter {
    /// A filter that lets everything through.
    fn default() -> Self {
        Self {
            include_hidden: true,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}

impl FileFilter {
    /// Whether a file, given by its path relative to the source root, is organized.
    ///
    /// Include globs win over everything; after that the hidden-file switch,
    /// exact names, extensions, exclude globs and regexes are checked in turn.
    pub fn should_include(&self, relative: &Path) -> bool {
        if self.include_patterns.iter().any(|p| p.matches_path(relative)) {
            return true;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.include_hidden && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative.extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }

        if self.exclude_patterns.iter().any(|p| p.matches_path(relative)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(&file_name))
    }
}
