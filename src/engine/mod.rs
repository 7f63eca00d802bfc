//! Task orchestration: scan, diff, batch, report.
//!
//! A run walks the configured tasks in order. Each task scans its source and
//! target into the store, computes the pending set, then generates and
//! executes copy scripts; `Config::operation` narrows this to one stage.
//! A task that fails keeps going to the next one. Remote protocol failures
//! skip the task without a report; any other failure still reports the counts
//! gathered before it stopped.

use crate::batch::{BatchExecutor, BatchGenerator, ScriptFlavor};
use crate::config::{Config, Operation};
use crate::provider::ProviderSet;
use crate::report::{FileReportSink, LogReportSink, ReportSink, ReportType, SyncReport};
use crate::scan::ScanCoordinator;
use crate::store::{open_store, FileStore};
use crate::types::{FileSet, ScanMode, SyncError, SyncTask};
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::{error, info, warn};

/// What happened to one task
#[derive(Debug)]
pub enum TaskResult {
    Completed(SyncReport),
    /// Stopped part way; the report holds what was counted before the error
    Failed { report: SyncReport, reason: String },
    /// Remote protocol failure, no report
    Skipped { source: String, reason: String },
}

/// Outcome of a whole run
#[derive(Debug)]
pub struct RunSummary {
    pub tasks: Vec<TaskResult>,
    pub total: SyncReport,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, TaskResult::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, TaskResult::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, TaskResult::Skipped { .. }))
            .count()
    }
}

/// Runs every task of a validated [`Config`]
pub struct SyncEngine {
    config: Config,
    store: Box<dyn FileStore>,
    providers: ProviderSet,
    sinks: Vec<Box<dyn ReportSink>>,
    flavor: ScriptFlavor,
}

impl SyncEngine {
    /// Open the configured store with the standard providers and both report sinks
    pub fn new(config: Config) -> Result<Self, SyncError> {
        let store = open_store(config.storage, &config.database, config.settings.command_timeout())?;
        let providers = ProviderSet::standard(&config.settings);
        let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(LogReportSink), Box::new(FileReportSink)];
        Ok(Self::with_parts(config, store, providers, sinks, ScriptFlavor::default()))
    }

    pub fn with_parts(
        config: Config,
        store: Box<dyn FileStore>,
        providers: ProviderSet,
        sinks: Vec<Box<dyn ReportSink>>,
        flavor: ScriptFlavor,
    ) -> Self {
        Self {
            config,
            store,
            providers,
            sinks,
            flavor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Narrow later runs to one stage, or `None` for the whole pipeline
    pub fn set_operation(&mut self, operation: Option<Operation>) {
        self.config.operation = operation;
    }

    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    /// Run every task, then write the run report
    pub fn run(&mut self) -> Result<RunSummary, SyncError> {
        let run_started = Local::now();
        let mut total = SyncReport::new();
        let executor = BatchExecutor::new(
            self.config.threads,
            self.config.settings.process_timeout(),
            self.flavor,
        )?;

        info!(
            tasks = self.config.tasks.len(),
            operation = ?self.config.operation,
            storage = ?self.config.storage,
            "Sync started"
        );

        let tasks = self.config.tasks.clone();
        let mut results = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let mut report = SyncReport::new();
            let outcome = self.run_task(task, &executor, &mut report);
            self.release_after_task(task);
            report.finish();

            let result = match outcome {
                Ok(()) => TaskResult::Completed(report),
                Err(e) if suppresses_report(&e) => {
                    error!(source = %task.source_folder, target = %task.target_folder, error = %e, "Task skipped");
                    results.push(TaskResult::Skipped {
                        source: task.source_folder.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    error!(source = %task.source_folder, target = %task.target_folder, error = %e, "Task failed");
                    TaskResult::Failed {
                        report,
                        reason: e.to_string(),
                    }
                }
            };

            if let TaskResult::Completed(report) | TaskResult::Failed { report, .. } = &result {
                self.emit(run_started, ReportType::Task, task.batch_folder.as_deref(), report);
                total.absorb(report);
            }
            results.push(result);
        }

        total.finish();
        let batch_folder = self.config.settings.batch_folder.clone();
        self.emit(run_started, ReportType::Sync, Some(&batch_folder), &total);

        let summary = RunSummary { tasks: results, total };
        info!(
            completed = summary.completed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "Sync finished"
        );
        Ok(summary)
    }

    /// Counters land in `report` as each stage finishes, so a failure keeps them
    fn run_task(
        &mut self,
        task: &SyncTask,
        executor: &BatchExecutor,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let operation = self.config.operation;
        let wants = |stage: Operation| operation.is_none() || operation == Some(stage);

        info!(source = %task.source_folder, target = %task.target_folder, rule = %task.rule, "Task started");
        self.store.initialize()?;

        if wants(Operation::Scan) {
            report.source_files = self.scan(task, ScanMode::Source)?;
            report.target_files = self.scan(task, ScanMode::Target)?;
        } else {
            report.source_files = self.store.record_count(FileSet::Source)?;
            report.target_files = self.store.record_count(FileSet::Target)?;
        }

        if wants(Operation::Process) {
            let stats = self.store.compute_diff(task.rule)?;
            info!(
                files = stats.pending_files,
                bytes = stats.pending_bytes,
                rule = %task.rule,
                "Pending set computed"
            );
            report.pending_files = stats.pending_files;
            report.pending_bytes = stats.pending_bytes;
        }

        if wants(Operation::Run) {
            let batch_root = task
                .batch_folder
                .clone()
                .unwrap_or_else(|| self.config.settings.batch_folder.clone());
            let generator = BatchGenerator::new(batch_root, self.config.settings.file_batch_size, self.flavor);
            let run = generator.generate(self.store.as_ref(), task)?;
            if operation == Some(Operation::Run) {
                report.pending_files = run.files;
                report.pending_bytes = run.bytes;
            }

            let execution = executor.execute(&run);
            report.jobs_succeeded = execution.succeeded() as u64;
            report.jobs_failed = execution.failed() as u64;
        }

        Ok(())
    }

    fn scan(&mut self, task: &SyncTask, mode: ScanMode) -> Result<u64, SyncError> {
        let scan_task = task.scan_task(mode, self.config.use_journal)?;
        ScanCoordinator::new(
            self.store.as_mut(),
            &mut self.providers,
            self.config.settings.file_batch_size,
            self.config.settings.operation_delay(),
        )
        .scan(&scan_task)
    }

    fn release_after_task(&mut self, task: &SyncTask) {
        if !self.config.teardown_after_task() {
            return;
        }
        if let Err(e) = self.store.teardown() {
            warn!(source = %task.source_folder, error = %e, "Store teardown failed");
        }
    }

    fn emit(&self, started: DateTime<Local>, report_type: ReportType, batch_folder: Option<&Path>, report: &SyncReport) {
        let lines = report.lines();
        for sink in &self.sinks {
            if let Err(e) = sink.write(started, report_type, batch_folder, &lines) {
                warn!(report = %report_type, error = %e, "Report sink failed");
            }
        }
    }
}

/// Failures after which a task has nothing worth reporting
fn suppresses_report(error: &SyncError) -> bool {
    error.is_remote_error() || error.is_validation_error()
}
