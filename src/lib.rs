//! llm-organizer - reversible directory organization
//!
//! This library turns per-file classifications into an ordered, previewable
//! plan of folder creations and moves, executes it while journaling every
//! operation to a durable log, and can reverse any recorded run exactly.
//! Scanning with TOML-configured filters, naming schemes and a built-in
//! content-type classifier feed the planner; classifications from a language
//! model are read through the same `Classifier` seam.

pub mod classify;
pub mod cli;
pub mod config;
pub mod executor;
pub mod file_category;
pub mod log_store;
pub mod naming;
pub mod output;
pub mod plan;
pub mod scanner;
pub mod undo;

pub use classify::{CategoryClassifier, Classification, ClassifyError, Classifier, ManifestClassifier};
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use executor::{ExecuteError, PlanExecutor};
pub use file_category::{Category, FileMapper};
pub use log_store::{
    ExecutedOperation, FailureReason, OperationLogEntry, OperationLogStore, OperationOutcome,
    RunListing, SkipReason, StoreError,
};
pub use naming::{NamingPolicy, NamingScheme};
pub use plan::{Action, Plan, PlanBuilder, PlanError, PlannedOperation, build_plan};
pub use scanner::{FileDescriptor, Scanner};
pub use undo::{UndoEngine, UndoError, UndoReport};

pub use cli::{Command, RunStatus, run_cli_with_config};
