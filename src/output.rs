//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, plan previews and run reports. Diagnostics go through
//! `tracing`; everything here is meant for the person running the command.

use crate::log_store::{OperationLogEntry, OperationOutcome};
use crate::plan::{Action, Plan};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for operations
/// - Plan previews, run summaries and undo reports
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use llm_organizer::output::OutputFormatter;
    /// OutputFormatter::success("Organization complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates and returns a progress bar for file operations.
    ///
    /// The bar draws to stderr and stays hidden when stderr is not a terminal.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use llm_organizer::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100, "Classifying");
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb
    }

    /// Prints every planned move, the skipped files and a per-folder table.
    pub fn plan_preview(plan: &Plan) {
        let root = &plan.source_root;
        Self::header(&format!("PLAN for {}", root.display()));

        if plan.placements.is_empty() {
            Self::plain("  Nothing to move.");
        }
        for placement in &plan.placements {
            let tags = if placement.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", placement.tags.join(", "))
            };
            println!(
                "  {} {} {}{}",
                relative(root, &placement.source),
                "→".cyan(),
                relative(root, &placement.destination).green(),
                tags.dimmed()
            );
        }

        if !plan.skipped.is_empty() {
            Self::header("SKIPPED");
            for skipped in &plan.skipped {
                println!(
                    "  {} {}",
                    relative(root, &skipped.path),
                    format!("({})", skipped.reason).yellow()
                );
            }
        }

        let summary = plan.summary();
        Self::summary_table(&folder_counts(plan), summary.files_to_move);
        println!(
            "{} folders to create, {} moves, {} skipped (of {} files considered)",
            summary.folders_to_create,
            summary.files_to_move,
            summary.files_skipped,
            plan.files_considered
        );
    }

    /// Prints a summary table with the number of moves per destination folder.
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_moves: usize) {
        Self::header("SUMMARY");

        let max_folder_len = folder_counts
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6); // "Folder"

        println!(
            "{:<width$} | {}",
            "Folder".bold(),
            "Moves".bold(),
            width = max_folder_len
        );
        println!("{}", "-".repeat(max_folder_len + 10));

        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count, "item", "items"),
                width = max_folder_len
            );
        }

        println!("{}", "-".repeat(max_folder_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_moves.to_string().green().bold(),
            plural(total_moves, "item", "items"),
            width = max_folder_len
        );
    }

    pub fn preview_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Prints the outcome of an execution run.
    pub fn run_summary(entry: &OperationLogEntry) {
        let root = &entry.source_root;
        for op in &entry.operations {
            let detail = match &op.outcome {
                OperationOutcome::Success => continue,
                OperationOutcome::Failed { reason } => reason.to_string(),
                OperationOutcome::Skipped { reason } => reason.to_string(),
            };
            Self::warning(&format!(
                "#{} {}: {}",
                op.seq,
                describe(root, &op.action),
                detail
            ));
        }

        let counts = entry.counts();
        Self::header("RUN");
        println!("  Run id:    {}", entry.run_id.bold());
        println!("  Succeeded: {}", counts.succeeded.to_string().green());
        if counts.failed > 0 {
            println!("  Failed:    {}", counts.failed.to_string().red());
        }
        if counts.skipped > 0 {
            println!("  Skipped:   {}", counts.skipped.to_string().yellow());
        }
        if entry.cancelled {
            Self::warning("Run was cancelled before all operations ran.");
        }
    }

    pub fn undo_report(report: &UndoReport) {
        Self::header(&format!("UNDO {}", report.run_id));
        println!("  Restored: {}", report.restored.to_string().green());
        if report.not_executed > 0 {
            println!("  Not executed in the run: {}", report.not_executed);
        }
        if !report.removed_folders.is_empty() {
            println!("  Folders removed: {}", report.removed_folders.len());
        }

        for path in &report.modified {
            Self::warning(&format!(
                "{} changed after it was organized",
                path.display()
            ));
        }
        for (path, reason) in &report.kept_folders {
            Self::warning(&format!("Kept folder {}: {}", path.display(), reason));
        }
        if !report.failed.is_empty() {
            println!("  Failed: {}", report.failed.len().to_string().red());
            for (path, reason) in &report.failed {
                eprintln!("    - {}: {}", path.display(), reason);
            }
        }
    }

    /// Prints one line per recorded run, oldest first.
    pub fn history(entries: &[OperationLogEntry]) {
        if entries.is_empty() {
            Self::info("No runs recorded yet.");
            return;
        }
        Self::header("HISTORY");
        for entry in entries {
            let counts = entry.counts();
            println!(
                "  {}  {}  {} moved/created, {} failed, {} skipped  {}",
                entry.run_id.bold(),
                entry.source_root.display(),
                counts.succeeded,
                counts.failed,
                counts.skipped,
                run_state(entry)
            );
        }
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// `path` relative to `root` when it lies inside it.
fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn describe(root: &Path, action: &Action) -> String {
    match action {
        Action::CreateFolder { path } => format!("create {}", relative(root, path)),
        Action::MoveFile {
            source,
            destination,
            ..
        } => format!(
            "move {} → {}",
            relative(root, source),
            relative(root, destination)
        ),
    }
}

fn run_state(entry: &OperationLogEntry) -> ColoredString {
    if entry.undone {
        "undone".dimmed()
    } else if !entry.sealed {
        "interrupted".red()
    } else if entry.cancelled {
        "cancelled".yellow()
    } else {
        "active".green()
    }
}

/// Moves per destination folder, relative to the plan's root.
fn folder_counts(plan: &Plan) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for op in &plan.operations {
        if let Action::MoveFile { destination, .. } = &op.action {
            let folder = destination
                .parent()
                .map(|p| relative(&plan.source_root, p))
                .unwrap_or_default();
            *counts.entry(folder).or_insert(0) += 1;
        }
    }
    counts
}
