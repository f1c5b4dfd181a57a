//! Organization plans.
//!
//! A [`Plan`] is the ordered list of filesystem mutations computed from
//! classifications: folder creations followed by the moves that need them.
//! Building a plan never mutates the filesystem; it only checks what already
//! exists so that no planned move can overwrite anything.

use crate::classify::{Classification, ClassifyError};
use crate::naming::{NamingPolicy, sanitize};
use crate::scanner::FileDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// One filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    CreateFolder {
        path: PathBuf,
    },
    MoveFile {
        source: PathBuf,
        destination: PathBuf,
        /// Hash of the content at plan time, checked again on undo.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_hash: Option<String>,
    },
}

impl Action {
    /// The path this action writes to.
    pub fn target(&self) -> &Path {
        match self {
            Action::CreateFolder { path } => path,
            Action::MoveFile { destination, .. } => destination,
        }
    }
}

/// An [`Action`] with its position in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOperation {
    /// Execution order, starting at 1.
    pub seq: u64,
    pub action: Action,
}

/// A file left out of the plan and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Where a file (or preserved project) is going, with its classification
/// details for previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub tags: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub created_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub files_considered: usize,
    pub operations: Vec<PlannedOperation>,
    pub skipped: Vec<SkippedFile>,
    pub placements: Vec<Placement>,
}

/// Counts shown before a plan is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanSummary {
    pub folders_to_create: usize,
    pub files_to_move: usize,
    pub files_skipped: usize,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let folders_to_create = self
            .operations
            .iter()
            .filter(|op| matches!(op.action, Action::CreateFolder { .. }))
            .count();
        PlanSummary {
            folders_to_create,
            files_to_move: self.operations.len() - folders_to_create,
            files_skipped: self.skipped.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("{} is not inside the source root {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("{} appears more than once in the input", .0.display())]
    DuplicateSource(PathBuf),
    #[error("destination '{folder}' for {} escapes the source root", .path.display())]
    UnsafeDestination { path: PathBuf, folder: String },
}

/// A classified file as handed to the plan builder.
pub type ClassifiedFile = (FileDescriptor, Result<Classification, ClassifyError>);

/// Builds a plan with no preserved project roots.
pub fn build_plan(
    source_root: &Path,
    files: Vec<ClassifiedFile>,
    naming_policy: &NamingPolicy,
) -> Result<Plan, PlanError> {
    PlanBuilder::new(source_root, naming_policy.clone()).build(files)
}

/// Computes plans for one source root.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    source_root: PathBuf,
    policy: NamingPolicy,
    preserved_roots: BTreeSet<PathBuf>,
}

/// Something that will be moved: a single file or a whole preserved root.
struct Candidate {
    source: PathBuf,
    folder: PathBuf,
    name: OsString,
    content_hash: Option<String>,
    tags: Vec<String>,
    description: String,
}

impl PlanBuilder {
    pub fn new(source_root: impl Into<PathBuf>, policy: NamingPolicy) -> Self {
        Self {
            source_root: source_root.into(),
            policy,
            preserved_roots: BTreeSet::new(),
        }
    }

    /// Directories that must be moved whole, never reorganized inside.
    pub fn preserve_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.preserved_roots.extend(roots);
        self
    }

    pub fn build(&self, files: Vec<ClassifiedFile>) -> Result<Plan, PlanError> {
        let root = &self.source_root;
        let files_considered = files.len();

        let mut seen = HashSet::with_capacity(files.len());
        for (descriptor, _) in &files {
            let path = &descriptor.path;
            if path == root || !path.starts_with(root) {
                return Err(PlanError::OutsideRoot {
                    path: path.clone(),
                    root: root.clone(),
                });
            }
            if !seen.insert(path.clone()) {
                return Err(PlanError::DuplicateSource(path.clone()));
            }
        }

        let mut files = files;
        files.sort_by(|a, b| a.0.path.cmp(&b.0.path));

        let preserved = self.outermost_preserved_roots();
        let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.clone());

        let mut skipped = Vec::new();
        let mut candidates = Vec::new();
        let mut project_votes: BTreeMap<PathBuf, Vec<(PathBuf, Classification)>> =
            BTreeMap::new();
        let mut project_members: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        for (descriptor, classification) in files {
            let path = descriptor.path;
            let project = preserved
                .iter()
                .find(|p| path.starts_with(p) && path != **p)
                .cloned();

            let classification = match classification {
                Ok(c) => Some(c),
                Err(e) if project.is_none() => {
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(_) => None,
            };

            let folder = match &classification {
                Some(c) => Some(self.resolve_folder(&path, &c.destination_folder, &canonical_root)?),
                None => None,
            };

            if let Some(project) = project {
                project_members
                    .entry(project.clone())
                    .or_default()
                    .push(path.clone());
                if let (Some(folder), Some(c)) = (folder, classification) {
                    project_votes.entry(project).or_default().push((folder, c));
                }
                continue;
            }

            let (Some(folder), Some(c)) = (folder, classification) else {
                continue;
            };
            let Some(name) = path.file_name().map(OsString::from) else {
                continue;
            };
            if let Some(inside) = preserved
                .iter()
                .find(|p| root.join(&folder).starts_with(p))
            {
                skipped.push(SkippedFile {
                    path,
                    reason: format!(
                        "destination lies inside preserved project {}",
                        inside.display()
                    ),
                });
                continue;
            }
            candidates.push(Candidate {
                source: path,
                folder,
                name,
                content_hash: descriptor.content_hash,
                tags: c.tags,
                description: c.description,
            });
        }

        for (project, members) in project_members {
            match self.project_candidate(&project, project_votes.remove(&project), &preserved) {
                Ok(candidate) => candidates.push(candidate),
                Err(reason) => skipped.extend(members.into_iter().map(|path| SkippedFile {
                    path,
                    reason: reason.clone(),
                })),
            }
        }

        candidates.sort_by(|a, b| a.source.cmp(&b.source));
        let (operations, placements) = self.place(candidates, &mut skipped);

        debug!(
            root = %root.display(),
            operations = operations.len(),
            skipped = skipped.len(),
            "plan built"
        );

        Ok(Plan {
            created_at: Utc::now(),
            source_root: root.clone(),
            files_considered,
            operations,
            skipped,
            placements,
        })
    }

    /// Preserved roots under the source root, dropping any nested inside another.
    fn outermost_preserved_roots(&self) -> Vec<PathBuf> {
        let mut outermost: Vec<PathBuf> = Vec::new();
        for candidate in &self.preserved_roots {
            if !candidate.starts_with(&self.source_root) {
                continue;
            }
            // BTreeSet order visits ancestors before descendants.
            if !outermost.iter().any(|p| candidate.starts_with(p)) {
                outermost.push(candidate.clone());
            }
        }
        outermost
    }

    /// Sanitizes a suggested folder and makes sure it cannot leave the root,
    /// including through symlinked directories that already exist.
    fn resolve_folder(
        &self,
        path: &Path,
        folder: &str,
        canonical_root: &Path,
    ) -> Result<PathBuf, PlanError> {
        let unsafe_destination = || PlanError::UnsafeDestination {
            path: path.to_path_buf(),
            folder: folder.to_string(),
        };

        let relative = sanitize(folder, &self.policy).map_err(|_| unsafe_destination())?;
        let absolute = self.source_root.join(&relative);

        let existing = absolute
            .ancestors()
            .take_while(|a| *a != self.source_root)
            .find(|a| fs::symlink_metadata(a).is_ok());
        if let Some(existing) = existing {
            match fs::canonicalize(existing) {
                Ok(resolved) if resolved.starts_with(canonical_root) => {}
                _ => return Err(unsafe_destination()),
            }
        }

        Ok(relative)
    }

    /// Chooses where a preserved project goes: the folder most of its files
    /// were classified into, ties broken by the lexically smallest folder.
    fn project_candidate(
        &self,
        project: &Path,
        votes: Option<Vec<(PathBuf, Classification)>>,
        preserved: &[PathBuf],
    ) -> Result<Candidate, String> {
        if project == self.source_root {
            return Err("source root is a preserved project".to_string());
        }
        let votes = votes.unwrap_or_default();
        if votes.is_empty() {
            return Err(format!(
                "no file in preserved project {} was classified",
                project.display()
            ));
        }

        let mut counts: BTreeMap<&PathBuf, usize> = BTreeMap::new();
        for (folder, _) in &votes {
            *counts.entry(folder).or_default() += 1;
        }
        let mut winner: Option<(&PathBuf, usize)> = None;
        for (folder, count) in counts {
            if winner.is_none_or(|(_, best)| count > best) {
                winner = Some((folder, count));
            }
        }
        let Some((folder, _)) = winner else {
            return Err("no destination".to_string());
        };
        let folder = folder.clone();

        let destination_dir = self.source_root.join(&folder);
        let Some(name) = project.file_name().map(OsString::from) else {
            return Err("preserved project has no name".to_string());
        };
        if destination_dir.join(&name) == project {
            return Err(format!(
                "preserved project {} is already in place",
                project.display()
            ));
        }
        if let Some(inside) = preserved.iter().find(|p| destination_dir.starts_with(p)) {
            return Err(format!(
                "destination lies inside preserved project {}",
                inside.display()
            ));
        }

        let mut tags: Vec<String> = Vec::new();
        for (_, classification) in &votes {
            for tag in &classification.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        Ok(Candidate {
            source: project.to_path_buf(),
            folder,
            name,
            content_hash: None,
            tags,
            description: format!("preserved project ({} files)", votes.len()),
        })
    }

    /// Resolves collisions, inserts folder creations and numbers operations.
    fn place(
        &self,
        candidates: Vec<Candidate>,
        skipped: &mut Vec<SkippedFile>,
    ) -> (Vec<PlannedOperation>, Vec<Placement>) {
        let mut actions = Vec::new();
        let mut placements = Vec::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut planned_folders: HashSet<PathBuf> = HashSet::new();

        for candidate in candidates {
            let folder = self.source_root.join(&candidate.folder);

            if let Some(blocker) = folder
                .ancestors()
                .take_while(|a| *a != self.source_root)
                .find(|a| fs::symlink_metadata(a).is_ok_and(|m| !m.is_dir()))
            {
                skipped.push(SkippedFile {
                    path: candidate.source,
                    reason: format!("{} exists and is not a folder", blocker.display()),
                });
                continue;
            }

            let Some(destination) = unique_destination(&folder, &candidate, &claimed) else {
                skipped.push(SkippedFile {
                    path: candidate.source,
                    reason: "already in place".to_string(),
                });
                continue;
            };
            claimed.insert(destination.clone());

            let mut missing: Vec<PathBuf> = folder
                .ancestors()
                .take_while(|a| *a != self.source_root)
                .filter(|a| !planned_folders.contains(*a) && fs::symlink_metadata(a).is_err())
                .map(Path::to_path_buf)
                .collect();
            missing.reverse();
            for path in missing {
                planned_folders.insert(path.clone());
                actions.push(Action::CreateFolder { path });
            }

            actions.push(Action::MoveFile {
                source: candidate.source.clone(),
                destination: destination.clone(),
                content_hash: candidate.content_hash,
            });
            placements.push(Placement {
                source: candidate.source,
                destination,
                tags: candidate.tags,
                description: candidate.description,
            });
        }

        let operations = actions
            .into_iter()
            .zip(1..)
            .map(|(action, seq)| PlannedOperation { seq, action })
            .collect();
        (operations, placements)
    }
}

/// First free destination for a candidate, or `None` if it is already there.
///
/// `name.txt` becomes `name (1).txt`, `name (2).txt`, ... while the path is
/// claimed by an earlier candidate or exists on disk.
fn unique_destination(
    folder: &Path,
    candidate: &Candidate,
    claimed: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let base = folder.join(&candidate.name);
    let name = Path::new(&candidate.name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 0u32.. {
        let path = if n == 0 {
            base.clone()
        } else {
            let file_name = match &extension {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            folder.join(file_name)
        };
        if path == candidate.source {
            return None;
        }
        if !claimed.contains(&path) && fs::symlink_metadata(&path).is_err() {
            return Some(path);
        }
    }
    None
}
