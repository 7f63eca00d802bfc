//! Configuration management

use crate::provider::RemoteRef;
use crate::store::StorageKind;
use crate::types::{Profile, Rule, ScanMode, SyncError, SyncTask};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings loaded from an optional TOML file; every field has a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root folder for generated scripts and reports
    pub batch_folder: PathBuf,

    /// Pause after each store write during scans (milliseconds)
    pub operation_delay_ms: u64,

    /// How long a store call may wait on a locked database
    pub command_timeout_secs: u64,

    /// Per batch job and per remote HTTP call
    pub process_timeout_secs: u64,

    /// Scan flush size, pending page size and remote page size
    pub file_batch_size: usize,

    pub storage: StorageKind,

    /// SQLite file used when `storage = "sqlite"`
    pub database: PathBuf,

    pub journal_max_size: u64,
    pub journal_allocation_delta: u64,

    /// Agent bind address
    pub listen: String,

    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_folder: PathBuf::from("batches"),
            operation_delay_ms: 10,
            command_timeout_secs: 300,
            process_timeout_secs: 3600,
            file_batch_size: 1000,
            storage: StorageKind::Memory,
            database: PathBuf::from("journsync.db"),
            journal_max_size: 0x1000_0000,
            journal_allocation_delta: 0x10_0000,
            listen: "127.0.0.1:5000".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read settings file {}: {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("Invalid settings file {}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.file_batch_size == 0 {
            return Err(SyncError::Config("file_batch_size must be at least 1".to_string()));
        }
        if self.process_timeout_secs == 0 {
            return Err(SyncError::Config("process_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn operation_delay(&self) -> Duration {
        Duration::from_millis(self.operation_delay_ms)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Single pipeline stage to run instead of the whole sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// Scan source and target into the store
    Scan,
    /// Compute the pending set from the store
    Process,
    /// Generate and execute batches from the pending set
    Run,
}

/// Journal-accelerated tree diff and batched copy planner
#[derive(Debug, Parser)]
#[command(name = "journsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare source and target and copy what differs
    Sync(SyncArgs),
    /// Run the remote scan agent
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Folder to copy from (local path or journsync:server/path)
    #[arg(short = 's', long, required_unless_present = "profile")]
    pub source: Option<String>,

    /// Folder to copy to (local path or journsync:server/path)
    #[arg(short = 't', long, required_unless_present = "profile")]
    pub target: Option<String>,

    /// Folder for generated copy scripts and reports
    #[arg(short = 'b', long)]
    pub batch: Option<PathBuf>,

    /// Run a single stage instead of the whole pipeline
    #[arg(short = 'o', long, value_enum)]
    pub operation: Option<Operation>,

    /// Number of batch scripts executed concurrently
    #[arg(short = 'm', long, default_value_t = 1)]
    pub threads: usize,

    /// SQLite database file (selects the persisted store)
    #[arg(short = 'd', long)]
    pub database: Option<PathBuf>,

    /// Release store state after each task
    #[arg(short = 'a', long)]
    pub auto_teardown: bool,

    /// Enumerate local NTFS folders through the change journal
    #[arg(short = 'n', long)]
    pub journal: bool,

    /// JSON profile with a list of tasks
    #[arg(short = 'p', long, conflicts_with_all = ["source", "target"])]
    pub profile: Option<PathBuf>,

    /// Comparison rule: standard, newer or larger
    #[arg(short = 'r', long, default_value = "standard")]
    pub rule: String,

    /// File name glob (repeatable)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Size/date limit such as sizemin=10M or datemax=7D (repeatable)
    #[arg(long = "limit")]
    pub limits: Vec<String>,

    /// Settings file (TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind, overriding the settings file
    #[arg(long)]
    pub listen: Option<String>,

    /// Settings file (TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

/// Validated configuration for one sync run
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,

    /// Enabled tasks, in order, with batch folders filled in
    pub tasks: Vec<SyncTask>,

    /// Tasks came from a profile
    pub from_profile: bool,

    /// None runs the whole pipeline
    pub operation: Option<Operation>,

    pub threads: usize,
    pub auto_teardown: bool,
    pub use_journal: bool,
    pub storage: StorageKind,
    pub database: PathBuf,
}

impl Config {
    /// Store teardown after each task
    pub fn teardown_after_task(&self) -> bool {
        self.auto_teardown || self.from_profile
    }

    /// Validate one task before anything runs
    pub fn validate_task(task: &SyncTask) -> Result<(), SyncError> {
        if task.source_folder.trim().is_empty() || task.target_folder.trim().is_empty() {
            return Err(SyncError::Validation(
                "Source and target folders are required".to_string(),
            ));
        }
        if task.source_folder == task.target_folder {
            return Err(SyncError::Validation(format!(
                "Source and target cannot be the same: {}",
                task.source_folder
            )));
        }
        if !RemoteRef::is_remote(&task.source_folder) && !Path::new(&task.source_folder).is_dir() {
            return Err(SyncError::Validation(format!(
                "Source folder does not exist: {}",
                task.source_folder
            )));
        }
        // Compiles patterns and limits
        task.scan_task(ScanMode::Source, false)?;
        Ok(())
    }
}

impl TryFrom<SyncArgs> for Config {
    type Error = SyncError;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        let mut settings = Settings::load(args.config.as_deref())?;
        if let Some(batch) = args.batch {
            settings.batch_folder = batch;
        }
        if args.threads == 0 {
            return Err(SyncError::Validation("threads must be at least 1".to_string()));
        }

        let (tasks, from_profile) = match &args.profile {
            Some(profile) => (Profile::load(profile)?.tasks, true),
            None => {
                let rule: Rule = args.rule.parse()?;
                let mut task = SyncTask::new(
                    args.source.clone().unwrap_or_default(),
                    args.target.clone().unwrap_or_default(),
                );
                task.rule = rule;
                task.file_patterns = args.patterns.clone();
                task.limits = args.limits.clone();
                (vec![task], false)
            }
        };

        let mut enabled = Vec::with_capacity(tasks.len());
        for mut task in tasks.into_iter().filter(|t| t.enabled) {
            Config::validate_task(&task)?;
            if task.batch_folder.is_none() {
                task.batch_folder = Some(settings.batch_folder.clone());
            }
            enabled.push(task);
        }
        if enabled.is_empty() {
            return Err(SyncError::Validation("No enabled tasks to run".to_string()));
        }

        let (storage, database) = match args.database {
            Some(path) => (StorageKind::Sqlite, path),
            None => (settings.storage, settings.database.clone()),
        };

        Ok(Config {
            settings,
            tasks: enabled,
            from_profile,
            operation: args.operation,
            threads: args.threads,
            auto_teardown: args.auto_teardown,
            use_journal: args.journal,
            storage,
            database,
        })
    }
}
