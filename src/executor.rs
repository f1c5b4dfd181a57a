/// Plan execution.
///
/// Applies a [`Plan`] to the filesystem one operation at a time, in `seq`
/// order, journaling every outcome before the next operation starts. A
/// failure never stops the run: the failed operation is recorded and any
/// operation that depends on a folder that was not created is skipped.
use crate::log_store::{
    ExecutedOperation, FailureReason, OperationLogEntry, OperationLogStore, OperationOutcome,
    SkipReason, StoreError,
};
use crate::plan::{Action, Plan, PlannedOperation};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("source root {} is not a directory", .0.display())]
    InvalidRoot(PathBuf),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type Observer<'a> = Box<dyn FnMut(&ExecutedOperation) + 'a>;

/// Runs plans against the filesystem, recording into an [`OperationLogStore`].
pub struct PlanExecutor<'a> {
    store: &'a OperationLogStore,
    cancel: Option<Arc<AtomicBool>>,
    observer: Option<Observer<'a>>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(store: &'a OperationLogStore) -> Self {
        Self {
            store,
            cancel: None,
            observer: None,
        }
    }

    /// Stops the run before the next operation once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Called after each operation has been journaled.
    pub fn on_operation(mut self, observer: impl FnMut(&ExecutedOperation) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Executes every operation of `plan` and returns the sealed log entry.
    ///
    /// The source root is locked for the duration of the run. Per-operation
    /// failures are recorded in the returned entry; only a journal that
    /// cannot be written (or a missing source root) aborts the run. Each
    /// operation is recorded after it is applied, so when recording fails
    /// that one operation's change is on disk without a journal line; no
    /// later operation is attempted.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use llm_organizer::executor::PlanExecutor;
    /// use llm_organizer::log_store::OperationLogStore;
    /// # fn demo(plan: &llm_organizer::plan::Plan) -> Result<(), Box<dyn std::error::Error>> {
    /// let store = OperationLogStore::open("/tmp/organizer-data")?;
    /// let entry = PlanExecutor::new(&store).execute(plan)?;
    /// println!("run {} moved {} files", entry.run_id, entry.counts().succeeded);
    /// # Ok(())
    /// # }
    /// ```
    pub fn execute(mut self, plan: &Plan) -> Result<OperationLogEntry, ExecuteError> {
        if !plan.source_root.is_dir() {
            return Err(ExecuteError::InvalidRoot(plan.source_root.clone()));
        }

        let _lock = self.store.lock_root(&plan.source_root)?;
        let mut journal = self.store.begin(&plan.source_root, plan.files_considered)?;

        let mut operations: Vec<&PlannedOperation> = plan.operations.iter().collect();
        operations.sort_by_key(|op| op.seq);

        let mut unavailable: Vec<PathBuf> = Vec::new();
        let mut cancelled = false;

        for planned in operations {
            if self.is_cancelled() {
                info!(run_id = %journal.run_id(), "run cancelled");
                cancelled = true;
                break;
            }

            let outcome = if unavailable.iter().any(|f| planned.action.target().starts_with(f)) {
                OperationOutcome::Skipped {
                    reason: SkipReason::DependencyFailed,
                }
            } else {
                apply(&planned.action)
            };

            if let Action::CreateFolder { path } = &planned.action
                && blocks_dependents(&outcome)
            {
                unavailable.push(path.clone());
            }

            debug!(seq = planned.seq, action = ?planned.action, outcome = ?outcome, "operation");
            if !matches!(outcome, OperationOutcome::Success) {
                warn!(seq = planned.seq, outcome = ?outcome, "operation did not succeed");
            }

            let executed = ExecutedOperation {
                seq: planned.seq,
                action: planned.action.clone(),
                outcome,
            };
            journal.record(executed.clone())?;
            if let Some(observer) = self.observer.as_mut() {
                observer(&executed);
            }
        }

        Ok(journal.seal(cancelled)?)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// A folder that already exists as a directory can still receive its files.
fn blocks_dependents(outcome: &OperationOutcome) -> bool {
    !matches!(
        outcome,
        OperationOutcome::Success
            | OperationOutcome::Failed {
                reason: FailureReason::FolderExists
            }
    )
}

fn apply(action: &Action) -> OperationOutcome {
    let result = match action {
        Action::CreateFolder { path } => create_folder(path),
        Action::MoveFile {
            source,
            destination,
            ..
        } => move_file(source, destination),
    };
    match result {
        Ok(()) => OperationOutcome::Success,
        Err(reason) => OperationOutcome::Failed { reason },
    }
}

fn create_folder(path: &Path) -> Result<(), FailureReason> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if path.is_dir() {
                Err(FailureReason::FolderExists)
            } else {
                Err(FailureReason::DestinationExists)
            }
        }
        Err(e) => Err(FailureReason::Io(e.to_string())),
    }
}

fn move_file(source: &Path, destination: &Path) -> Result<(), FailureReason> {
    if fs::symlink_metadata(source).is_err() {
        return Err(FailureReason::SourceMissing);
    }
    if fs::symlink_metadata(destination).is_ok() {
        return Err(FailureReason::DestinationExists);
    }
    move_path(source, destination).map_err(|e| FailureReason::Io(e.to_string()))
}

/// Moves a file or directory, copying across filesystems when a rename is
/// not possible. The source is removed only after the copy is on disk.
pub(crate) fn move_path(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(source = %source.display(), "rename crosses devices, copying");
            copy_then_remove(source, destination)
        }
        result => result,
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    let copied = if fs::symlink_metadata(source)?.is_dir() {
        copy_tree(source, destination)
    } else {
        copy_file(source, destination)
    };
    if let Err(e) = copied {
        let _ = if destination.is_dir() {
            fs::remove_dir_all(destination)
        } else {
            fs::remove_file(destination)
        };
        return Err(e);
    }

    if source.is_dir() {
        fs::remove_dir_all(source)
    } else {
        fs::remove_file(source)
    }
}

fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    let expected = fs::copy(source, destination)?;
    let file = File::open(destination)?;
    file.sync_all()?;
    let written = file.metadata()?.len();
    if written != expected {
        return Err(io::Error::other(format!(
            "copied {written} of {expected} bytes to {}",
            destination.display()
        )));
    }
    Ok(())
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    copy_file(link, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::naming::{NamingPolicy, NamingScheme};
    use crate::plan::build_plan;
    use crate::scanner::FileDescriptor;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct Setup {
        source: TempDir,
        _data: TempDir,
        store: OperationLogStore,
    }

    fn setup() -> Setup {
        let source = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = OperationLogStore::open(data.path()).unwrap();
        Setup {
            source,
            _data: data,
            store,
        }
    }

    fn plan_for(root: &Path, files: &[(&str, &str)]) -> Plan {
        let classified = files
            .iter()
            .map(|(name, folder)| {
                let path = root.join(name);
                fs::write(&path, name).unwrap();
                (
                    FileDescriptor::from_path(path),
                    Ok(Classification::new(*folder)),
                )
            })
            .collect();
        let policy = NamingPolicy {
            scheme: NamingScheme::Preserve,
            max_depth: 3,
        };
        build_plan(root, classified, &policy).unwrap()
    }

    #[test]
    fn test_execute_moves_files_and_records_everything() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(root, &[("a.txt", "Docs"), ("b.png", "Images")]);

        let entry = PlanExecutor::new(&s.store).execute(&plan).unwrap();

        assert!(root.join("Docs/a.txt").exists());
        assert!(root.join("Images/b.png").exists());
        assert!(!root.join("a.txt").exists());
        assert!(entry.sealed);
        assert!(!entry.cancelled);
        assert_eq!(entry.operations.len(), plan.operations.len());
        assert_eq!(
            entry.created_folders,
            vec![root.join("Docs"), root.join("Images")]
        );
        assert_eq!(s.store.get(&entry.run_id).unwrap(), entry);
    }

    #[test]
    fn test_failed_folder_skips_dependents_but_not_independent_operations() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(
            root,
            &[("a.txt", "Notes"), ("b.txt", "Notes/Deep"), ("c.txt", "Docs")],
        );
        fs::write(root.join("Notes"), "now a file").unwrap();

        let entry = PlanExecutor::new(&s.store).execute(&plan).unwrap();

        for op in &entry.operations {
            let target = op.action.target();
            if target == root.join("Notes") {
                assert_eq!(
                    op.outcome,
                    OperationOutcome::Failed {
                        reason: FailureReason::DestinationExists
                    }
                );
            } else if target.starts_with(root.join("Notes")) {
                assert_eq!(
                    op.outcome,
                    OperationOutcome::Skipped {
                        reason: SkipReason::DependencyFailed
                    }
                );
            } else {
                assert!(op.succeeded(), "independent operation failed: {op:?}");
            }
        }
        assert!(root.join("Docs/c.txt").exists());
        assert!(root.join("a.txt").exists());
        assert!(root.join("b.txt").exists());
        assert_eq!(entry.created_folders, vec![root.join("Docs")]);
    }

    #[test]
    fn test_existing_folder_does_not_block_its_moves() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(root, &[("a.txt", "Notes")]);
        fs::create_dir(root.join("Notes")).unwrap();

        let entry = PlanExecutor::new(&s.store).execute(&plan).unwrap();

        assert_eq!(
            entry.operations[0].outcome,
            OperationOutcome::Failed {
                reason: FailureReason::FolderExists
            }
        );
        assert!(entry.operations[1].succeeded());
        assert!(entry.created_folders.is_empty());
        assert!(root.join("Notes/a.txt").exists());
    }

    #[test]
    fn test_destination_appearing_after_planning_is_not_overwritten() {
        let s = setup();
        let root = s.source.path();
        fs::create_dir(root.join("Notes")).unwrap();
        let plan = plan_for(root, &[("a.txt", "Notes")]);
        fs::write(root.join("Notes/a.txt"), "someone else").unwrap();

        let entry = PlanExecutor::new(&s.store).execute(&plan).unwrap();

        assert_eq!(
            entry.operations[0].outcome,
            OperationOutcome::Failed {
                reason: FailureReason::DestinationExists
            }
        );
        assert_eq!(
            fs::read_to_string(root.join("Notes/a.txt")).unwrap(),
            "someone else"
        );
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "a.txt");
    }

    #[test]
    fn test_missing_source_is_recorded() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(root, &[("a.txt", "Docs"), ("b.txt", "Docs")]);
        fs::remove_file(root.join("a.txt")).unwrap();

        let entry = PlanExecutor::new(&s.store).execute(&plan).unwrap();

        let outcomes: Vec<&OperationOutcome> = entry.operations.iter().map(|op| &op.outcome).collect();
        assert_eq!(outcomes[0], &OperationOutcome::Success);
        assert_eq!(
            outcomes[1],
            &OperationOutcome::Failed {
                reason: FailureReason::SourceMissing
            }
        );
        assert_eq!(outcomes[2], &OperationOutcome::Success);
    }

    #[test]
    fn test_cancellation_stops_after_k_operations() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(
            root,
            &[("a.txt", "Docs"), ("b.txt", "Docs"), ("c.txt", "Docs"), ("d.txt", "Docs")],
        );
        assert_eq!(plan.operations.len(), 5);

        let flag = Arc::new(AtomicBool::new(false));
        let seen = Cell::new(0);
        let stop = Arc::clone(&flag);
        let entry = PlanExecutor::new(&s.store)
            .with_cancel_flag(Arc::clone(&flag))
            .on_operation(|_| {
                seen.set(seen.get() + 1);
                if seen.get() == 3 {
                    stop.store(true, Ordering::SeqCst);
                }
            })
            .execute(&plan)
            .unwrap();

        assert_eq!(entry.operations.len(), 3);
        assert!(entry.cancelled);
        assert!(entry.sealed);
        assert!(root.join("Docs/a.txt").exists());
        assert!(root.join("Docs/b.txt").exists());
        assert!(root.join("c.txt").exists());
        assert_eq!(s.store.get(&entry.run_id).unwrap().operations.len(), 3);
    }

    #[test]
    fn test_locked_root_is_refused() {
        let s = setup();
        let root = s.source.path();
        let plan = plan_for(root, &[("a.txt", "Docs")]);

        let _held = s.store.lock_root(root).unwrap();
        let result = PlanExecutor::new(&s.store).execute(&plan);

        assert!(matches!(
            result,
            Err(ExecuteError::Store(StoreError::RootLocked { .. }))
        ));
        assert!(root.join("a.txt").exists());
        assert!(s.store.list().unwrap().is_empty());
    }

    #[test]
    fn test_copy_then_remove_moves_directory_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("project");
        fs::create_dir_all(source.join("src")).unwrap();
        fs::write(source.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(source.join("README.md"), "hello").unwrap();
        let destination = temp.path().join("moved");

        copy_then_remove(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(
            fs::read_to_string(destination.join("src/main.rs")).unwrap(),
            "fn main() {}"
        );
        assert_eq!(
            fs::read_to_string(destination.join("README.md")).unwrap(),
            "hello"
        );
    }
}
