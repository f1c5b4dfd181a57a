//! Command-line interface module for llm-organizer.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing and validation
//! - Scanning and classification
//! - Plan preview and execution
//! - Undo and run history

use crate::classify::{CategoryClassifier, Classifier, ManifestClassifier};
use crate::config::{AppConfig, load_exclusions};
use crate::executor::PlanExecutor;
use crate::log_store::OperationLogStore;
use crate::naming::NamingScheme;
use crate::output::OutputFormatter;
use crate::plan::PlanBuilder;
use crate::scanner::Scanner;
use crate::undo::UndoEngine;
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Organize a directory into folders, preview the plan and undo any run
#[derive(Parser, Debug)]
#[command(name = "llm-organizer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./.llm-organizer.toml, then ~/.config/llm-organizer/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Plan and execute the organization of a directory
    Organize(OrganizeArgs),

    /// Revert a run (default: the most recent run not yet undone)
    Undo {
        /// Run id as printed by `organize` or `history`
        run_id: Option<String>,
    },

    /// List recorded runs
    History,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OrganizeArgs {
    /// Directory to organize
    pub directory: PathBuf,

    /// Print the plan without changing anything
    #[arg(long)]
    pub preview: bool,

    /// Extra glob pattern to exclude (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// YAML file with exclusion patterns
    #[arg(long, value_name = "FILE")]
    pub exclude_file: Option<PathBuf>,

    /// JSON file with per-file classifications (default: classify by content type)
    #[arg(long, value_name = "FILE")]
    pub classifications: Option<PathBuf>,

    /// Naming scheme for destination folders
    #[arg(long, value_enum)]
    pub naming_scheme: Option<NamingScheme>,

    /// Maximum depth of destination folders
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Organize files inside project directories individually
    #[arg(long)]
    pub no_preserve_projects: bool,
}

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some operations or reversals failed.
    Partial,
}

impl RunStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::Partial => ExitCode::from(1),
        }
    }
}

/// Parses arguments, sets up logging and runs the command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli_with_config(&cli.command, cli.config.as_deref()) {
        Ok(status) => status.exit_code(),
        Err(e) => {
            OutputFormatter::error(&format!("{e:#}"));
            ExitCode::from(2)
        }
    }
}

/// RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Runs one command with an optional configuration file.
///
/// # Arguments
///
/// * `command` - The command to execute
/// * `config_path` - Optional path to configuration file
///
/// # Examples
///
/// ```no_run
/// use llm_organizer::cli::{run_cli_with_config, Command, OrganizeArgs};
///
/// let command = Command::Organize(OrganizeArgs {
///     directory: "/path/to/directory".into(),
///     preview: true,
///     ..OrganizeArgs::default()
/// });
/// match run_cli_with_config(&command, None) {
///     Ok(status) => println!("Finished: {:?}", status),
///     Err(e) => eprintln!("Error: {:#}", e),
/// }
/// ```
pub fn run_cli_with_config(command: &Command, config_path: Option<&Path>) -> Result<RunStatus> {
    let config = AppConfig::load(config_path).context("Error loading configuration")?;

    match command {
        Command::Organize(args) => organize_directory(args, config),
        Command::Undo { run_id } => undo_run(run_id.as_deref(), &config),
        Command::History => show_history(&config),
    }
}

fn open_store(config: &AppConfig) -> Result<OperationLogStore> {
    let dir = config.data_dir()?;
    OperationLogStore::open(&dir)
        .with_context(|| format!("Error opening operation log at {}", dir.display()))
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_overrides(args: &OrganizeArgs, config: &mut AppConfig) -> Result<()> {
    config
        .filters
        .exclude
        .patterns
        .extend(args.exclude.iter().cloned());
    if let Some(path) = &args.exclude_file {
        config
            .filters
            .exclude
            .patterns
            .extend(load_exclusions(path)?);
    }
    if let Some(scheme) = args.naming_scheme {
        config.organizer.naming_scheme = scheme;
    }
    if let Some(depth) = args.max_depth {
        config.organizer.max_folder_depth = depth;
    }
    if args.no_preserve_projects {
        config.organizer.preserve_projects = false;
    }
    Ok(())
}

/// Scans, classifies, plans and (unless previewing) executes.
///
/// This function:
/// 1. Applies command-line overrides to the configuration
/// 2. Scans the directory, skipping excluded files and the operation log
/// 3. Classifies every file (manifest or content type)
/// 4. Builds and prints the plan
/// 5. Executes it, recording each operation for undo
fn organize_directory(args: &OrganizeArgs, mut config: AppConfig) -> Result<RunStatus> {
    apply_overrides(args, &mut config)?;

    let root = fs::canonicalize(&args.directory)
        .with_context(|| format!("Error reading directory {}", args.directory.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    OutputFormatter::info(&format!("Organizing contents of: {}", root.display()));

    let store = open_store(&config)?;
    let store_dir = fs::canonicalize(store.dir()).unwrap_or_else(|_| store.dir().to_path_buf());
    let filters = config.compile_filters()?;
    let scan = Scanner::new(&filters, &config.organizer)
        .skip_path(store_dir)
        .scan(&root)?;
    for (path, reason) in &scan.errors {
        OutputFormatter::warning(&format!("Could not read {}: {}", path.display(), reason));
    }
    if scan.files.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(RunStatus::Success);
    }

    let classifier: Box<dyn Classifier> = match &args.classifications {
        Some(path) => {
            let manifest = ManifestClassifier::load(path, &root)?;
            info!(entries = manifest.len(), "loaded classifications");
            Box::new(manifest)
        }
        None => Box::new(CategoryClassifier::default()),
    };

    let pb = OutputFormatter::create_progress_bar(scan.files.len() as u64, "Classifying");
    let classified = scan
        .files
        .into_iter()
        .map(|file| {
            let classification = classifier.classify(&file);
            pb.inc(1);
            (file, classification)
        })
        .collect();
    pb.finish_and_clear();

    let plan = PlanBuilder::new(&root, config.organizer.naming_policy())
        .preserve_roots(scan.project_roots)
        .build(classified)?;
    OutputFormatter::plan_preview(&plan);

    if args.preview {
        OutputFormatter::preview_notice("No files were modified.");
        return Ok(RunStatus::Success);
    }
    if plan.is_empty() {
        OutputFormatter::success("Nothing to do.");
        return Ok(RunStatus::Success);
    }

    let pb = OutputFormatter::create_progress_bar(plan.operations.len() as u64, "Organizing");
    let entry = PlanExecutor::new(&store)
        .on_operation(|_| pb.inc(1))
        .execute(&plan)?;
    pb.finish_and_clear();

    OutputFormatter::run_summary(&entry);
    if entry.has_failures() {
        OutputFormatter::warning("Some operations did not complete. Please review the warnings above.");
        OutputFormatter::plain(&format!(
            "Use 'llm-organizer undo {}' to revert the completed ones.",
            entry.run_id
        ));
        Ok(RunStatus::Partial)
    } else {
        OutputFormatter::success("Organization complete!");
        OutputFormatter::plain(&format!(
            "Use 'llm-organizer undo {}' to revert changes.",
            entry.run_id
        ));
        Ok(RunStatus::Success)
    }
}

fn undo_run(run_id: Option<&str>, config: &AppConfig) -> Result<RunStatus> {
    let store = open_store(config)?;
    OutputFormatter::info("Undoing previous organization...");

    let report = UndoEngine::new(&store).undo(run_id)?;
    OutputFormatter::undo_report(&report);

    if report.is_complete_success() {
        OutputFormatter::success("Undo complete!");
        Ok(RunStatus::Success)
    } else {
        warn!(run_id = %report.run_id, failed = report.failed.len(), "undo incomplete");
        OutputFormatter::warning("Some files could not be restored. Please review errors above.");
        Ok(RunStatus::Partial)
    }
}

fn show_history(config: &AppConfig) -> Result<RunStatus> {
    let store = open_store(config)?;
    let listing = store.load_runs()?;
    OutputFormatter::history(&listing.entries);
    for (run_id, error) in &listing.unreadable {
        OutputFormatter::warning(&format!("Could not read run {run_id}: {error}"));
    }
    Ok(RunStatus::Success)
}
