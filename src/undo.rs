/// Undo functionality for reverting organization runs.
///
/// This module reverses a recorded run: every successful move is undone in
/// reverse order, then every folder the run created is removed if it is
/// empty. The run is then marked undone in the operation log so it can never
/// be reversed twice.
use crate::executor::move_path;
use crate::log_store::{OperationLogEntry, OperationLogStore, StoreError};
use crate::plan::Action;
use crate::scanner::hash_file;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("run {0} has already been undone")]
    AlreadyUndone(String),
    #[error("there is no run to undo")]
    NothingToUndo,
    #[error("no run with id '{0}'")]
    RunNotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UndoError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::RunNotFound(run_id) => UndoError::RunNotFound(run_id),
            other => UndoError::Store(other),
        }
    }
}

/// Represents the result of an undo operation.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub run_id: String,
    /// Number of moves reversed.
    pub restored: usize,
    /// Moves that could not be reversed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Restored files whose content changed after the run.
    pub modified: Vec<PathBuf>,
    pub removed_folders: Vec<PathBuf>,
    /// Created folders left in place, with the reason.
    pub kept_folders: Vec<(PathBuf, String)>,
    /// Operations of the run that had failed or been skipped.
    pub not_executed: usize,
}

impl UndoReport {
    /// Returns true if every recorded move was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reverses runs recorded in an [`OperationLogStore`].
pub struct UndoEngine<'a> {
    store: &'a OperationLogStore,
}

impl<'a> UndoEngine<'a> {
    pub fn new(store: &'a OperationLogStore) -> Self {
        Self { store }
    }

    /// Undoes a run.
    ///
    /// # Arguments
    ///
    /// * `run_id` - The run to reverse, or `None` for the most recent run
    ///   that has not been undone yet
    ///
    /// # Returns
    ///
    /// Returns an `UndoReport` describing what was restored, what failed and
    /// which folders were kept. Individual failures do not stop the undo and
    /// the run is marked undone even when some moves could not be reversed.
    ///
    /// # Edge Cases Handled
    ///
    /// * **File gone from its destination**: Recorded as a failure
    /// * **Original location occupied**: Recorded as a failure, nothing is overwritten
    /// * **Content changed since the run**: Restored and listed in `modified`
    /// * **Created folder no longer empty**: Kept and listed in `kept_folders`
    /// * **Run already undone**: `UndoError::AlreadyUndone`, the filesystem is not touched
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use llm_organizer::log_store::OperationLogStore;
    /// use llm_organizer::undo::UndoEngine;
    ///
    /// let store = OperationLogStore::open("/tmp/organizer-data").unwrap();
    /// match UndoEngine::new(&store).undo(None) {
    ///     Ok(report) => println!("Restored {} files", report.restored),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(&self, run_id: Option<&str>) -> Result<UndoReport, UndoError> {
        let entry = match run_id {
            Some(run_id) => self.store.get(run_id)?,
            None => self
                .store
                .latest_pending()?
                .ok_or(UndoError::NothingToUndo)?,
        };
        self.undo_entry(entry)
    }

    /// Reverses `entry` under the root lock.
    ///
    /// `entry` may have been read before another undo of the same run
    /// finished, so it is loaded again once the lock is held.
    fn undo_entry(&self, entry: OperationLogEntry) -> Result<UndoReport, UndoError> {
        if entry.undone {
            return Err(UndoError::AlreadyUndone(entry.run_id));
        }

        let _lock = self.store.lock_root(&entry.source_root)?;
        let entry = self.store.get(&entry.run_id)?;
        if entry.undone {
            return Err(UndoError::AlreadyUndone(entry.run_id));
        }
        info!(run_id = %entry.run_id, "undoing run");

        let mut report = UndoReport {
            run_id: entry.run_id.clone(),
            ..UndoReport::default()
        };
        Self::restore_moves(&entry, &mut report);
        Self::remove_created_folders(&entry, &mut report);

        self.store.mark_undone(&entry.run_id)?;
        Ok(report)
    }

    fn restore_moves(entry: &OperationLogEntry, report: &mut UndoReport) {
        for op in entry.operations.iter().rev() {
            if !op.succeeded() {
                report.not_executed += 1;
                continue;
            }
            let Action::MoveFile {
                source,
                destination,
                content_hash,
            } = &op.action
            else {
                continue;
            };

            match Self::restore_file(source, destination, content_hash.as_deref()) {
                Ok(modified) => {
                    debug!(from = %destination.display(), to = %source.display(), "restored");
                    report.restored += 1;
                    if modified {
                        report.modified.push(source.clone());
                    }
                }
                Err((path, reason)) => {
                    warn!(path = %path.display(), %reason, "could not restore");
                    report.failed.push((path, reason));
                }
            }
        }
    }

    /// Moves one file back to where it came from.
    ///
    /// Returns whether its content differs from the hash recorded at plan
    /// time, or `Err((path, reason))` on failure.
    fn restore_file(
        original: &Path,
        current: &Path,
        content_hash: Option<&str>,
    ) -> Result<bool, (PathBuf, String)> {
        if fs::symlink_metadata(current).is_err() {
            return Err((
                current.to_path_buf(),
                "File not found at expected location".to_string(),
            ));
        }
        if fs::symlink_metadata(original).is_ok() {
            return Err((
                original.to_path_buf(),
                "Original location is occupied".to_string(),
            ));
        }

        let modified = match content_hash {
            Some(expected) if current.is_file() => match hash_file(current) {
                Ok(actual) => actual != expected,
                Err(e) => {
                    warn!(path = %current.display(), error = %e, "could not hash file");
                    false
                }
            },
            _ => false,
        };

        if let Some(parent) = original.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                (
                    parent.to_path_buf(),
                    format!("Could not recreate parent folder: {}", e),
                )
            })?;
        }

        move_path(current, original).map_err(|e| {
            (
                current.to_path_buf(),
                format!("Failed to restore file: {}", e),
            )
        })?;

        Ok(modified)
    }

    fn remove_created_folders(entry: &OperationLogEntry, report: &mut UndoReport) {
        for folder in entry.created_folders.iter().rev() {
            let is_empty = match fs::read_dir(folder) {
                Ok(mut items) => items.next().is_none(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(folder = %folder.display(), "created folder already gone");
                    continue;
                }
                Err(e) => {
                    report.kept_folders.push((folder.clone(), e.to_string()));
                    continue;
                }
            };
            if !is_empty {
                report
                    .kept_folders
                    .push((folder.clone(), "Folder is not empty".to_string()));
                continue;
            }
            match fs::remove_dir(folder) {
                Ok(()) => report.removed_folders.push(folder.clone()),
                Err(e) => report.kept_folders.push((folder.clone(), e.to_string())),
            }
        }
    }
}
