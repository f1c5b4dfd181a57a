//! Configuration loading, file filtering and exclusion lists.
//!
//! Configuration is TOML. Filter rules decide which scanned files are offered
//! for classification; the `[organizer]` table controls naming, project
//! preservation and where the operation log lives.
//!
//! ```toml
//! data_dir = "~/.llm_organizer"
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [organizer]
//! naming_scheme = "snake_case"
//! max_folder_depth = 3
//! preserve_projects = true
//! project_markers = [".git", "package.json", "pyproject.toml", "Cargo.toml", "Makefile"]
//! ```

use crate::naming::{NamingPolicy, NamingScheme};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the operation log directory.
pub const HOME_ENV: &str = "LLM_ORGANIZER_HOME";

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("Invalid exclusion file {}: {reason}", .path.display())]
    InvalidExclusionFile { path: PathBuf, reason: String },
    #[error("No data directory: set LLM_ORGANIZER_HOME, HOME or `data_dir`")]
    NoDataDir,
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where run journals and root locks are stored.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub filters: FilterRules,

    #[serde(default)]
    pub organizer: OrganizerSettings,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude, matched against the path relative to the
    /// source root (e.g., "*.tmp", "node_modules/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// How folders are named and which directories are treated as projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerSettings {
    pub naming_scheme: NamingScheme,
    pub max_folder_depth: usize,
    /// Move directories containing a project marker as a single unit.
    pub preserve_projects: bool,
    pub project_markers: Vec<String>,
    /// Directory names never descended into while scanning.
    pub skip_directories: Vec<String>,
    pub recursive: bool,
    /// Record a SHA-256 of every file so undo can report external edits.
    pub hash_contents: bool,
}

impl Default for OrganizerSettings {
    fn default() -> Self {
        Self {
            naming_scheme: NamingScheme::SnakeCase,
            max_folder_depth: 3,
            preserve_projects: true,
            project_markers: [".git", "package.json", "pyproject.toml", "Cargo.toml", "Makefile"]
                .map(String::from)
                .to_vec(),
            skip_directories: ["venv", "node_modules", ".git", "__pycache__", "dist", "build"]
                .map(String::from)
                .to_vec(),
            recursive: true,
            hash_contents: false,
        }
    }
}

impl OrganizerSettings {
    pub fn naming_policy(&self) -> NamingPolicy {
        NamingPolicy {
            scheme: self.naming_scheme,
            max_depth: self.max_folder_depth,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.llm-organizer.toml` in the current directory
    /// 3. Look for `~/.config/llm-organizer/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".llm-organizer.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("llm-organizer")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the filter rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }

    /// Resolves the operation log directory.
    ///
    /// `data_dir` from the file wins (a leading `~` expands to `HOME`), then
    /// `LLM_ORGANIZER_HOME`, then `~/.llm_organizer`.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        if let Some(dir) = &self.data_dir {
            return match (dir.strip_prefix("~"), &home) {
                (Ok(rest), Some(home)) => Ok(home.join(rest)),
                (Ok(_), None) => Err(ConfigError::NoDataDir),
                (Err(_), _) => Ok(dir.clone()),
            };
        }
        if let Some(dir) = std::env::var_os(HOME_ENV) {
            return Ok(PathBuf::from(dir));
        }
        home.map(|h| h.join(".llm_organizer"))
            .ok_or(ConfigError::NoDataDir)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExclusionFile {
    List(Vec<String>),
    Table { exclusions: Vec<String> },
}

/// Reads exclusion glob patterns from a YAML file.
///
/// The file is either a plain list of patterns or a mapping with an
/// `exclusions` list. An empty file yields no patterns.
pub fn load_exclusions(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::InvalidExclusionFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ExclusionFile =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidExclusionFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(match parsed {
        ExclusionFile::List(patterns) => patterns,
        ExclusionFile::Table { exclusions } => exclusions,
    })
}

/// Compiled filter structures for file matching.
///
/// Glob and regex patterns are parsed once here instead of per file.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
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

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    pub fn include_hidden(&self) -> bool {
        self.enable_hidden_files
    }

    /// Check if a file should be offered for organization.
    ///
    /// `file_path` is relative to the source root. Checks run in order with
    /// early exit: include patterns, hidden files, exact names, extensions,
    /// globs, regexes; anything left is included.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_include_patterns(file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_exclude_patterns(file_path) {
            return false;
        }

        !self.matches_exclude_regex(&file_name)
    }

    fn matches_include_patterns(&self, file_path: &Path) -> bool {
        self.include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_patterns(&self, file_path: &Path) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_regex(&self, file_name: &str) -> bool {
        self.exclude_regexes
            .iter()
            .any(|regex| regex.is_match(file_name))
    }
}
