//! Durable operation log.
//!
//! Each run is journaled to `<dir>/runs/<run_id>.jsonl`, one JSON record per
//! line. A run starts with a `begin` record, gets one `operation` record per
//! attempted operation, and ends with `sealed`. Undoing a run appends an
//! `undone` record. Every line is flushed to disk before the caller moves on,
//! so a crash loses at most the operation that was in flight and the journal
//! always describes exactly the mutations that happened.
//!
//! Runs against the same source root are serialized with lock files under
//! `<dir>/locks/`.

use crate::plan::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const RUNS_DIR: &str = "runs";
const LOCKS_DIR: &str = "locks";
const JOURNAL_EXT: &str = "jsonl";
const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("journal for run {run_id} is corrupt at line {line}: {reason}")]
    Corrupt {
        run_id: String,
        line: usize,
        reason: String,
    },
    #[error("run {0} already exists")]
    DuplicateRun(String),
    #[error("no run with id '{0}'")]
    RunNotFound(String),
    #[error(
        "{} is being organized by another run (remove {} if no run is active)",
        .root.display(),
        .lock.display()
    )]
    RootLocked { root: PathBuf, lock: PathBuf },
    #[error("could not serialize journal record: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Why an operation did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("destination already exists")]
    DestinationExists,
    #[error("source no longer exists")]
    SourceMissing,
    #[error("folder already exists")]
    FolderExists,
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    #[error("a folder it depends on was not created")]
    DependencyFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success,
    Failed { reason: FailureReason },
    Skipped { reason: SkipReason },
}

/// A planned operation together with what happened when it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedOperation {
    pub seq: u64,
    pub action: Action,
    pub outcome: OperationOutcome,
}

impl ExecutedOperation {
    pub fn succeeded(&self) -> bool {
        self.outcome == OperationOutcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The persisted record of one execution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub run_id: String,
    pub source_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_considered: usize,
    /// Operations in execution order; only attempted ones appear.
    pub operations: Vec<ExecutedOperation>,
    /// Folders this run created, in creation order.
    pub created_folders: Vec<PathBuf>,
    /// False when the run was interrupted before it finished.
    pub sealed: bool,
    pub cancelled: bool,
    pub undone: bool,
    pub undone_at: Option<DateTime<Utc>>,
}

impl OperationLogEntry {
    fn new(
        run_id: String,
        source_root: PathBuf,
        started_at: DateTime<Utc>,
        files_considered: usize,
    ) -> Self {
        Self {
            run_id,
            source_root,
            started_at,
            finished_at: None,
            files_considered,
            operations: Vec::new(),
            created_folders: Vec::new(),
            sealed: false,
            cancelled: false,
            undone: false,
            undone_at: None,
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for op in &self.operations {
            match op.outcome {
                OperationOutcome::Success => counts.succeeded += 1,
                OperationOutcome::Failed { .. } => counts.failed += 1,
                OperationOutcome::Skipped { .. } => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        let counts = self.counts();
        counts.failed + counts.skipped > 0
    }

    fn push(&mut self, op: ExecutedOperation) {
        if op.succeeded()
            && let Action::CreateFolder { path } = &op.action
        {
            self.created_folders.push(path.clone());
        }
        self.operations.push(op);
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JournalRecord {
    Begin {
        run_id: String,
        source_root: PathBuf,
        started_at: DateTime<Utc>,
        files_considered: usize,
    },
    Operation(ExecutedOperation),
    Sealed {
        finished_at: DateTime<Utc>,
        cancelled: bool,
    },
    Undone {
        at: DateTime<Utc>,
    },
}

impl JournalRecord {
    fn to_line(&self) -> Result<String, StoreError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// File-backed store of [`OperationLogEntry`] values.
#[derive(Debug, Clone)]
pub struct OperationLogStore {
    dir: PathBuf,
}

impl OperationLogStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        for sub in [RUNS_DIR, LOCKS_DIR] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn runs_dir(&self) -> PathBuf {
        self.dir.join(RUNS_DIR)
    }

    fn journal_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.{JOURNAL_EXT}"))
    }

    /// Starts journaling a new run under a fresh, unique id.
    pub fn begin(
        &self,
        source_root: &Path,
        files_considered: usize,
    ) -> Result<RunJournal, StoreError> {
        let started_at = Utc::now();
        let base = started_at.format(RUN_ID_FORMAT).to_string();

        let mut attempt = 0u32;
        let (run_id, path, file) = loop {
            let run_id = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.journal_path(&run_id);
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => break (run_id, path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(io_error(&path)(e)),
            }
        };
        sync_dir(&self.runs_dir())?;

        let entry = OperationLogEntry::new(
            run_id.clone(),
            source_root.to_path_buf(),
            started_at,
            files_considered,
        );
        let mut journal = RunJournal { file, path, entry };
        journal.write(&JournalRecord::Begin {
            run_id,
            source_root: source_root.to_path_buf(),
            started_at,
            files_considered,
        })?;

        info!(run_id = %journal.run_id(), root = %source_root.display(), "run started");
        Ok(journal)
    }

    /// Persists a complete entry in one step.
    ///
    /// The journal is written to a temporary file, flushed, and renamed into
    /// place, so readers see either nothing or the whole entry.
    /// `created_folders` is derived from the operations.
    pub fn append(&self, entry: &OperationLogEntry) -> Result<(), StoreError> {
        validate_run_id(&entry.run_id)?;
        let path = self.journal_path(&entry.run_id);
        if path.exists() {
            return Err(StoreError::DuplicateRun(entry.run_id.clone()));
        }

        let mut text = JournalRecord::Begin {
            run_id: entry.run_id.clone(),
            source_root: entry.source_root.clone(),
            started_at: entry.started_at,
            files_considered: entry.files_considered,
        }
        .to_line()?;
        for op in &entry.operations {
            text.push_str(&JournalRecord::Operation(op.clone()).to_line()?);
        }
        if entry.sealed {
            text.push_str(
                &JournalRecord::Sealed {
                    finished_at: entry.finished_at.unwrap_or_else(Utc::now),
                    cancelled: entry.cancelled,
                }
                .to_line()?,
            );
        }
        if entry.undone {
            text.push_str(
                &JournalRecord::Undone {
                    at: entry.undone_at.unwrap_or_else(Utc::now),
                }
                .to_line()?,
            );
        }

        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
        file.write_all(text.as_bytes()).map_err(io_error(&tmp))?;
        file.sync_all().map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        sync_dir(&self.runs_dir())
    }

    pub fn get(&self, run_id: &str) -> Result<OperationLogEntry, StoreError> {
        validate_run_id(run_id)?;
        let path = self.journal_path(run_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::RunNotFound(run_id.to_string()));
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        replay(run_id, &text)
    }

    /// All readable runs, oldest first. Unreadable journals are skipped.
    pub fn list(&self) -> Result<Vec<OperationLogEntry>, StoreError> {
        Ok(self.load_runs()?.entries)
    }

    /// All runs, oldest first, plus the journals that could not be read.
    pub fn load_runs(&self) -> Result<RunListing, StoreError> {
        let runs_dir = self.runs_dir();
        let mut listing = RunListing::default();
        for item in fs::read_dir(&runs_dir).map_err(io_error(&runs_dir))? {
            let item = item.map_err(io_error(&runs_dir))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXT) {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get(run_id) {
                Ok(entry) => listing.entries.push(entry),
                Err(e) => {
                    warn!(run_id, error = %e, "skipping unreadable journal");
                    listing.unreadable.push((run_id.to_string(), e));
                }
            }
        }
        listing.entries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        listing.unreadable.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(listing)
    }

    /// The most recent run, undone or not.
    pub fn latest(&self) -> Result<Option<OperationLogEntry>, StoreError> {
        Ok(self.list()?.pop())
    }

    /// The most recent run that has not been undone.
    pub fn latest_pending(&self) -> Result<Option<OperationLogEntry>, StoreError> {
        Ok(self.list()?.into_iter().rev().find(|entry| !entry.undone))
    }

    /// Flags a run as undone. Marking an undone run again changes nothing.
    pub fn mark_undone(&self, run_id: &str) -> Result<(), StoreError> {
        let entry = self.get(run_id)?;
        if entry.undone {
            return Ok(());
        }
        let path = self.journal_path(run_id);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;
        drop_torn_tail(&file, &path)?;
        let line = JournalRecord::Undone { at: Utc::now() }.to_line()?;
        file.write_all(line.as_bytes()).map_err(io_error(&path))?;
        file.sync_data().map_err(io_error(&path))?;
        info!(run_id, "run marked undone");
        Ok(())
    }

    /// Takes the exclusive lock for a source root.
    pub fn lock_root(&self, root: &Path) -> Result<RootLock, StoreError> {
        let digest = Sha256::digest(root.to_string_lossy().as_bytes());
        let key = format!("{digest:x}");
        let path = self.dir.join(LOCKS_DIR).join(format!("{}.lock", &key[..16]));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let holder = format!("{}\n{}\n", std::process::id(), root.display());
                file.write_all(holder.as_bytes()).map_err(io_error(&path))?;
                debug!(root = %root.display(), lock = %path.display(), "root locked");
                Ok(RootLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::RootLocked {
                root: root.to_path_buf(),
                lock: path,
            }),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

/// Result of [`OperationLogStore::load_runs`].
#[derive(Debug, Default)]
pub struct RunListing {
    pub entries: Vec<OperationLogEntry>,
    /// Run id and error of every journal that failed to load.
    pub unreadable: Vec<(String, StoreError)>,
}

/// Cuts a partial last line left by a crash, so the next record starts on
/// a line of its own.
fn drop_torn_tail(file: &File, path: &Path) -> Result<(), StoreError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    warn!(
        journal = %path.display(),
        bytes = bytes.len() - keep,
        "truncating torn journal line"
    );
    file.set_len(keep as u64).map_err(io_error(path))?;
    file.sync_data().map_err(io_error(path))
}

/// Exclusive claim on a source root, released when dropped.
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "could not release root lock");
        }
    }
}

/// Open journal of a run in progress.
#[derive(Debug)]
pub struct RunJournal {
    file: File,
    path: PathBuf,
    entry: OperationLogEntry,
}

impl RunJournal {
    pub fn run_id(&self) -> &str {
        &self.entry.run_id
    }

    pub fn entry(&self) -> &OperationLogEntry {
        &self.entry
    }

    /// Durably records one operation outcome.
    pub fn record(&mut self, op: ExecutedOperation) -> Result<(), StoreError> {
        self.write(&JournalRecord::Operation(op.clone()))?;
        self.entry.push(op);
        Ok(())
    }

    /// Closes the run and returns the final entry.
    pub fn seal(mut self, cancelled: bool) -> Result<OperationLogEntry, StoreError> {
        let finished_at = Utc::now();
        self.write(&JournalRecord::Sealed {
            finished_at,
            cancelled,
        })?;
        self.entry.sealed = true;
        self.entry.cancelled = cancelled;
        self.entry.finished_at = Some(finished_at);
        info!(
            run_id = %self.entry.run_id,
            operations = self.entry.operations.len(),
            cancelled,
            "run sealed"
        );
        Ok(self.entry)
    }

    fn write(&mut self, record: &JournalRecord) -> Result<(), StoreError> {
        let line = record.to_line()?;
        self.file
            .write_all(line.as_bytes())
            .map_err(io_error(&self.path))?;
        self.file.sync_data().map_err(io_error(&self.path))
    }
}

fn validate_run_id(run_id: &str) -> Result<(), StoreError> {
    let valid = !run_id.is_empty()
        && !run_id.starts_with('.')
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::RunNotFound(run_id.to_string()))
    }
}

/// Rebuilds an entry from its journal lines.
///
/// A final line that does not parse is a write torn by a crash and is
/// dropped; a bad line anywhere else is corruption.
fn replay(run_id: &str, text: &str) -> Result<OperationLogEntry, StoreError> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    let corrupt = |line: usize, reason: String| StoreError::Corrupt {
        run_id: run_id.to_string(),
        line: line + 1,
        reason,
    };

    let mut entry: Option<OperationLogEntry> = None;
    for (position, (index, line)) in lines.iter().enumerate() {
        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) if position + 1 == lines.len() => {
                warn!(run_id, line = index + 1, error = %e, "ignoring torn journal line");
                break;
            }
            Err(e) => return Err(corrupt(*index, e.to_string())),
        };

        let out_of_order = || corrupt(*index, "record out of order".to_string());
        if let JournalRecord::Begin {
            run_id: recorded,
            source_root,
            started_at,
            files_considered,
        } = record
        {
            if entry.is_some() {
                return Err(out_of_order());
            }
            if recorded != run_id {
                return Err(corrupt(*index, format!("journal names run {recorded}")));
            }
            entry = Some(OperationLogEntry::new(
                recorded,
                source_root,
                started_at,
                files_considered,
            ));
            continue;
        }

        let Some(current) = entry.as_mut() else {
            return Err(out_of_order());
        };
        match record {
            JournalRecord::Operation(op) if !current.sealed => current.push(op),
            JournalRecord::Sealed {
                finished_at,
                cancelled,
            } => {
                current.sealed = true;
                current.cancelled = cancelled;
                current.finished_at = Some(finished_at);
            }
            JournalRecord::Undone { at } => {
                if !current.undone {
                    current.undone = true;
                    current.undone_at = Some(at);
                }
            }
            _ => return Err(out_of_order()),
        }
    }

    entry.ok_or_else(|| StoreError::Corrupt {
        run_id: run_id.to_string(),
        line: 1,
        reason: "missing begin record".to_string(),
    })
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(io_error(dir))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn move_op(seq: u64, outcome: OperationOutcome) -> ExecutedOperation {
        ExecutedOperation {
            seq,
            action: Action::MoveFile {
                source: PathBuf::from(format!("/root/f{seq}.txt")),
                destination: PathBuf::from(format!("/root/Docs/f{seq}.txt")),
                content_hash: None,
            },
            outcome,
        }
    }

    fn folder_op(seq: u64, path: &str) -> ExecutedOperation {
        ExecutedOperation {
            seq,
            action: Action::CreateFolder {
                path: PathBuf::from(path),
            },
            outcome: OperationOutcome::Success,
        }
    }

    #[test]
    fn test_journal_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let mut journal = store.begin(Path::new("/root"), 2).unwrap();
        let run_id = journal.run_id().to_string();
        journal.record(folder_op(1, "/root/Docs")).unwrap();
        journal.record(move_op(2, OperationOutcome::Success)).unwrap();
        journal
            .record(move_op(
                3,
                OperationOutcome::Failed {
                    reason: FailureReason::DestinationExists,
                },
            ))
            .unwrap();
        let sealed = journal.seal(false).unwrap();

        let loaded = store.get(&run_id).unwrap();
        assert_eq!(loaded, sealed);
        assert!(loaded.sealed);
        assert_eq!(loaded.created_folders, vec![PathBuf::from("/root/Docs")]);
        assert_eq!(
            loaded.counts(),
            OutcomeCounts {
                succeeded: 2,
                failed: 1,
                skipped: 0
            }
        );
        assert!(loaded.has_failures());
    }

    #[test]
    fn test_unsealed_journal_keeps_recorded_operations() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let mut journal = store.begin(Path::new("/root"), 5).unwrap();
        let run_id = journal.run_id().to_string();
        journal.record(move_op(1, OperationOutcome::Success)).unwrap();
        journal.record(move_op(2, OperationOutcome::Success)).unwrap();
        drop(journal);

        let loaded = store.get(&run_id).unwrap();
        assert!(!loaded.sealed);
        assert_eq!(loaded.operations.len(), 2);
        assert!(loaded.finished_at.is_none());
    }

    #[test]
    fn test_torn_last_line_is_ignored_but_inner_corruption_is_not() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let mut journal = store.begin(Path::new("/root"), 1).unwrap();
        let run_id = journal.run_id().to_string();
        journal.record(move_op(1, OperationOutcome::Success)).unwrap();
        drop(journal);

        let path = store.journal_path(&run_id);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"record\":\"operation\",\"seq\":2,\"act").unwrap();
        drop(file);

        let loaded = store.get(&run_id).unwrap();
        assert_eq!(loaded.operations.len(), 1);

        let text = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines.insert(1, "not json");
        fs::write(&path, lines.join("\n")).unwrap();
        assert!(matches!(
            store.get(&run_id),
            Err(StoreError::Corrupt { line: 2, .. })
        ));
    }

    #[test]
    fn test_mark_undone_after_torn_line_is_kept() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let mut journal = store.begin(Path::new("/root"), 1).unwrap();
        let run_id = journal.run_id().to_string();
        journal.record(move_op(1, OperationOutcome::Success)).unwrap();
        drop(journal);

        let path = store.journal_path(&run_id);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"record\":\"operation\",\"seq\":2,\"act").unwrap();
        drop(file);

        store.mark_undone(&run_id).unwrap();

        let loaded = store.get(&run_id).unwrap();
        assert!(loaded.undone);
        assert_eq!(loaded.operations.len(), 1);
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
        assert!(store.latest_pending().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_journal_does_not_hide_other_runs() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let good = store.begin(Path::new("/root"), 0).unwrap().seal(false).unwrap();
        let bad = store.begin(Path::new("/root"), 0).unwrap().seal(false).unwrap();
        let path = store.journal_path(&bad.run_id);
        fs::write(&path, "not json\nstill not json\n").unwrap();

        let listing = store.load_runs().unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].run_id, good.run_id);
        assert_eq!(listing.unreadable.len(), 1);
        assert_eq!(listing.unreadable[0].0, bad.run_id);
        assert!(matches!(listing.unreadable[0].1, StoreError::Corrupt { .. }));

        assert_eq!(store.latest_pending().unwrap().unwrap().run_id, good.run_id);
    }

    #[test]
    fn test_run_ids_are_unique_and_ordered() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let first = store.begin(Path::new("/a"), 0).unwrap().seal(false).unwrap();
        let second = store.begin(Path::new("/b"), 0).unwrap().seal(false).unwrap();
        assert_ne!(first.run_id, second.run_id);

        let listed: Vec<String> = store.list().unwrap().into_iter().map(|e| e.run_id).collect();
        assert_eq!(listed, vec![first.run_id, second.run_id.clone()]);
        assert_eq!(store.latest().unwrap().unwrap().run_id, second.run_id);
    }

    #[test]
    fn test_append_persists_entry_and_rejects_duplicates() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        let mut entry = OperationLogEntry::new(
            "20240101T000000.000000Z".to_string(),
            PathBuf::from("/root"),
            Utc::now(),
            1,
        );
        entry.push(folder_op(1, "/root/Docs"));
        entry.push(move_op(2, OperationOutcome::Success));
        entry.sealed = true;
        entry.finished_at = Some(Utc::now());

        store.append(&entry).unwrap();
        assert_eq!(store.get(&entry.run_id).unwrap(), entry);
        assert!(matches!(
            store.append(&entry),
            Err(StoreError::DuplicateRun(_))
        ));
    }

    #[test]
    fn test_mark_undone_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();
        let run = store.begin(Path::new("/root"), 0).unwrap().seal(false).unwrap();

        store.mark_undone(&run.run_id).unwrap();
        let first = store.get(&run.run_id).unwrap();
        store.mark_undone(&run.run_id).unwrap();
        let second = store.get(&run.run_id).unwrap();

        assert!(first.undone);
        assert_eq!(first.undone_at, second.undone_at);
        assert!(store.latest_pending().unwrap().is_none());
    }

    #[test]
    fn test_unknown_and_invalid_run_ids() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();

        assert!(matches!(
            store.mark_undone("20990101T000000.000000Z"),
            Err(StoreError::RunNotFound(_))
        ));
        assert!(matches!(
            store.get("../escape"),
            Err(StoreError::RunNotFound(_))
        ));
    }

    #[test]
    fn test_latest_pending_skips_undone_runs() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();
        let older = store.begin(Path::new("/root"), 0).unwrap().seal(false).unwrap();
        let newer = store.begin(Path::new("/root"), 0).unwrap().seal(false).unwrap();

        store.mark_undone(&newer.run_id).unwrap();
        assert_eq!(
            store.latest_pending().unwrap().unwrap().run_id,
            older.run_id
        );
    }

    #[test]
    fn test_root_lock_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let store = OperationLogStore::open(temp.path()).unwrap();
        let root = Path::new("/some/root");

        let lock = store.lock_root(root).unwrap();
        assert!(matches!(
            store.lock_root(root),
            Err(StoreError::RootLocked { .. })
        ));
        let other = store.lock_root(Path::new("/other/root")).unwrap();

        drop(lock);
        drop(other);
        assert!(store.lock_root(root).is_ok());
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let op = move_op(
            4,
            OperationOutcome::Failed {
                reason: FailureReason::Io("permission denied".to_string()),
            },
        );
        let value = serde_json::to_value(JournalRecord::Operation(op)).unwrap();
        assert_eq!(value["record"], "operation");
        assert_eq!(value["action"]["op"], "move_file");
        assert_eq!(value["outcome"]["status"], "failed");
        assert_eq!(value["outcome"]["reason"]["kind"], "io");
        assert_eq!(value["outcome"]["reason"]["detail"], "permission denied");
    }
}
