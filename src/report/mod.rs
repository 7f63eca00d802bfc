//! Run summaries and the sinks they are written to

use crate::types::SyncError;
use chrono::{DateTime, Local};
use indicatif::HumanBytes;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Scope of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    /// One sync task
    Task,
    /// A whole run, summing every task
    Sync,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Task => f.write_str("Task"),
            ReportType::Sync => f.write_str("Sync"),
        }
    }
}

/// Counters and timing for one task or run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub started: DateTime<Local>,
    pub finished: Option<DateTime<Local>>,
    timer: Instant,
    elapsed: Option<Duration>,
    pub source_files: u64,
    pub target_files: u64,
    pub pending_files: u64,
    pub pending_bytes: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncReport {
    pub fn new() -> Self {
        Self {
            started: Local::now(),
            finished: None,
            timer: Instant::now(),
            elapsed: None,
            source_files: 0,
            target_files: 0,
            pending_files: 0,
            pending_bytes: 0,
            jobs_succeeded: 0,
            jobs_failed: 0,
        }
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(Local::now());
            self.elapsed = Some(self.timer.elapsed());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.timer.elapsed())
    }

    /// Add a finished task's counters into a run total
    pub fn absorb(&mut self, task: &SyncReport) {
        self.source_files += task.source_files;
        self.target_files += task.target_files;
        self.pending_files += task.pending_files;
        self.pending_bytes += task.pending_bytes;
        self.jobs_succeeded += task.jobs_succeeded;
        self.jobs_failed += task.jobs_failed;
    }

    /// Human-readable summary
    pub fn lines(&self) -> Vec<String> {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let (bytes_per_sec, files_per_sec) = if secs > 0.0 {
            (
                (self.pending_bytes as f64 / secs) as u64,
                self.pending_files as f64 / secs,
            )
        } else {
            (0, 0.0)
        };
        let finished = self
            .finished
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        vec![
            format!("Started: {}", self.started.format("%Y-%m-%d %H:%M:%S")),
            format!("Finished: {}", finished),
            format!("Duration: {}", format_duration(elapsed)),
            format!("Source files: {}", self.source_files),
            format!("Target files: {}", self.target_files),
            format!("Processed files: {}", self.pending_files),
            format!("Processed size: {}", HumanBytes(self.pending_bytes)),
            format!(
                "Batches: {} succeeded, {} failed",
                self.jobs_succeeded, self.jobs_failed
            ),
            format!("Data throughput: {}/s", HumanBytes(bytes_per_sec)),
            format!("File throughput: {:.1} files/s", files_per_sec),
        ]
    }
}

/// Format a duration as `1h 5m`, `2m 30s` or `42s`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds == 0 {
        return "0s".to_string();
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        if minutes > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    } else if minutes > 0 {
        if seconds > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}m", minutes)
        }
    } else {
        format!("{}s", seconds)
    }
}

/// Destination for report lines
pub trait ReportSink: Send {
    fn write(
        &self,
        started: DateTime<Local>,
        report_type: ReportType,
        batch_folder: Option<&Path>,
        lines: &[String],
    ) -> Result<(), SyncError>;
}

/// Writes reports through `tracing`
#[derive(Debug, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn write(
        &self,
        _started: DateTime<Local>,
        report_type: ReportType,
        _batch_folder: Option<&Path>,
        lines: &[String],
    ) -> Result<(), SyncError> {
        for line in lines {
            info!(report = %report_type, "{}", line);
        }
        Ok(())
    }
}

/// Appends reports to `<batch folder>/<YYYY-MM-DD HHMMSS>.txt`
#[derive(Debug, Default)]
pub struct FileReportSink;

impl FileReportSink {
    pub fn file_name(started: DateTime<Local>) -> String {
        format!("{}.txt", started.format("%Y-%m-%d %H%M%S"))
    }
}

impl ReportSink for FileReportSink {
    fn write(
        &self,
        started: DateTime<Local>,
        report_type: ReportType,
        batch_folder: Option<&Path>,
        lines: &[String],
    ) -> Result<(), SyncError> {
        let Some(folder) = batch_folder else {
            return Ok(());
        };
        std::fs::create_dir_all(folder)?;
        let path = folder.join(Self::file_name(started));

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "[{} report]", report_type)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        writeln!(file)?;

        debug!(path = %path.display(), "Report written");
        Ok(())
    }
}
