//! Directory scanning.
//!
//! Walks a source root, applies the configured filters and captures a
//! [`FileDescriptor`] per file. Directories containing a project marker
//! (`.git`, `Cargo.toml`, ...) are reported as preserved project roots so the
//! plan builder can move them as a unit.

use crate::config::{CompiledFilters, OrganizerSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Identity of one source file at plan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Absolute path of the file before organization.
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the content, when hashing is enabled.
    pub content_hash: Option<String>,
}

impl FileDescriptor {
    /// Reads metadata (and optionally the content hash) for `path`.
    pub fn capture(path: &Path, hash_contents: bool) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        let content_hash = if hash_contents {
            Some(hash_file(path)?)
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified,
            content_hash,
        })
    }

    /// Descriptor with no metadata, for callers that already know the path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            modified: None,
            content_hash: None,
        }
    }
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("source root {} is not a readable directory: {source}", .path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a scan found under a source root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Files in lexical path order.
    pub files: Vec<FileDescriptor>,
    /// Directories holding a project marker, possibly including the root.
    pub project_roots: BTreeSet<PathBuf>,
    /// Entries that could not be read.
    pub errors: Vec<(PathBuf, String)>,
}

pub struct Scanner<'a> {
    filters: &'a CompiledFilters,
    settings: &'a OrganizerSettings,
    skip_paths: Vec<PathBuf>,
}

impl<'a> Scanner<'a> {
    pub fn new(filters: &'a CompiledFilters, settings: &'a OrganizerSettings) -> Self {
        Self {
            filters,
            settings,
            skip_paths: Vec::new(),
        }
    }

    /// Never descend into `path` (e.g. the operation log directory).
    pub fn skip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let metadata = fs::metadata(root).map_err(|source| ScanError::InvalidRoot {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::InvalidRoot {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            });
        }

        let mut result = ScanResult::default();
        if self.is_project_root(root) {
            result.project_roots.insert(root.to_path_buf());
        }

        let max_depth = if self.settings.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_skipped_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    result.errors.push((path, e.to_string()));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if self.is_project_root(entry.path()) {
                    debug!(path = %entry.path().display(), "found project root");
                    result.project_roots.insert(entry.path().to_path_buf());
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !self.filters.should_include(relative) {
                continue;
            }

            match FileDescriptor::capture(entry.path(), self.settings.hash_contents) {
                Ok(descriptor) => result.files.push(descriptor),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "could not read file");
                    result.errors.push((entry.path().to_path_buf(), e.to_string()));
                }
            }
        }

        debug!(
            files = result.files.len(),
            projects = result.project_roots.len(),
            "scan complete"
        );
        Ok(result)
    }

    fn is_skipped_dir(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        if self.skip_paths.iter().any(|p| entry.path() == p) {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if !self.filters.include_hidden() && name.starts_with('.') {
            return true;
        }
        self.settings.skip_directories.iter().any(|d| *d == name)
    }

    fn is_project_root(&self, dir: &Path) -> bool {
        self.settings.preserve_projects
            && self
                .settings
                .project_markers
                .iter()
                .any(|marker| dir.join(marker).exists())
    }
}
