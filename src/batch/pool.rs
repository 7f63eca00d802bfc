//! Bounded-concurrency batch executor.
//!
//! Owns a tokio runtime; every script runs as a child process under a shared
//! semaphore and its own timeout. Outcomes are collected for every job, a
//! failing job never cancels its siblings.

use super::generator::{BatchJob, BatchRun, ScriptFlavor};
use crate::types::SyncError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How one job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    /// Non-zero exit
    Failed { code: Option<i32>, stderr: String },
    /// Process could not be started
    LaunchFailed(String),
    TimedOut,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub id: usize,
    pub script: PathBuf,
    pub status: JobStatus,
    pub elapsed: Duration,
}

/// Aggregated result of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub outcomes: Vec<JobOutcome>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn outcome(&self, id: usize) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }
}

/// Runs generated scripts with bounded parallelism and per-job timeouts
pub struct BatchExecutor {
    runtime: Runtime,
    max_parallelism: usize,
    timeout: Duration,
    flavor: ScriptFlavor,
}

impl BatchExecutor {
    pub fn new(max_parallelism: usize, timeout: Duration, flavor: ScriptFlavor) -> Result<Self, SyncError> {
        let workers = max_parallelism.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_all()
            .build()
            .map_err(SyncError::Io)?;

        Ok(Self {
            runtime,
            max_parallelism: workers,
            timeout,
            flavor,
        })
    }

    /// Run every job of `run`, then remove the run folder
    pub fn execute(&self, run: &BatchRun) -> ExecutionReport {
        if run.jobs.is_empty() {
            return ExecutionReport::default();
        }

        info!(
            jobs = run.jobs.len(),
            parallelism = self.max_parallelism,
            timeout_secs = self.timeout.as_secs(),
            "Executing batches"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let timeout = self.timeout;
        let flavor = self.flavor;

        let mut outcomes = self.runtime.block_on(async {
            let mut set = JoinSet::new();
            for job in run.jobs.iter().cloned() {
                let semaphore = Arc::clone(&semaphore);
                set.spawn(async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_job(job, flavor, timeout).await
                });
            }

            let mut outcomes = Vec::with_capacity(run.jobs.len());
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => error!(error = %map_join_error(e), "Batch worker panicked"),
                }
            }
            outcomes
        });
        outcomes.sort_by_key(|o| o.id);

        remove_run_folder(&run.folder);

        let report = ExecutionReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch execution finished"
        );
        report
    }
}

fn command_for(flavor: ScriptFlavor, script: &Path) -> Command {
    let mut command = match flavor {
        ScriptFlavor::Cmd => {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        }
        ScriptFlavor::Shell => {
            let mut c = Command::new("sh");
            c.arg(script);
            c
        }
    };
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

async fn run_job(job: BatchJob, flavor: ScriptFlavor, timeout: Duration) -> JobOutcome {
    let started = Instant::now();
    info!(job = job.id, files = job.commands.len(), "Batch started");

    let status = match command_for(flavor, &job.script).spawn() {
        Err(e) => JobStatus::LaunchFailed(e.to_string()),
        // Dropping the timed-out future kills the child
        Ok(child) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => JobStatus::TimedOut,
            Ok(Err(e)) => JobStatus::LaunchFailed(e.to_string()),
            Ok(Ok(output)) if output.status.success() => JobStatus::Succeeded,
            Ok(Ok(output)) => JobStatus::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
        },
    };

    let elapsed = started.elapsed();
    match &status {
        JobStatus::Succeeded => {
            info!(job = job.id, elapsed_ms = elapsed.as_millis() as u64, "Batch finished");
            if let Err(e) = tokio::fs::remove_file(&job.script).await {
                warn!(job = job.id, error = %e, "Failed to delete finished script");
            }
        }
        JobStatus::TimedOut => {
            error!(job = job.id, timeout_secs = timeout.as_secs(), "Batch timed out and was terminated")
        }
        JobStatus::Failed { code, stderr } => {
            error!(job = job.id, code = ?code, stderr = %stderr, "Batch failed")
        }
        JobStatus::LaunchFailed(reason) => {
            error!(job = job.id, reason = %reason, "Batch could not be started")
        }
    }

    JobOutcome {
        id: job.id,
        script: job.script,
        status,
        elapsed,
    }
}

fn remove_run_folder(folder: &Path) {
    if let Err(e) = std::fs::remove_dir_all(folder) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(folder = %folder.display(), error = %e, "Failed to remove batch folder");
        }
    }
}

fn map_join_error(error: tokio::task::JoinError) -> SyncError {
    SyncError::Batch(format!("batch worker task failed: {}", error))
}
