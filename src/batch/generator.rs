//! Turns the pending set into copy scripts, one per page

use crate::provider::RemoteRef;
use crate::store::FileStore;
use crate::types::{PendingRecord, SyncError, SyncTask};
use chrono::Local;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Script dialect used for generated batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    /// `cmd.exe` batch file with `COPY "src" "dst" /y` lines
    Cmd,
    /// POSIX shell script with `cp -f 'src' 'dst'` lines
    Shell,
}

impl Default for ScriptFlavor {
    fn default() -> Self {
        if cfg!(windows) {
            ScriptFlavor::Cmd
        } else {
            ScriptFlavor::Shell
        }
    }
}

impl ScriptFlavor {
    pub fn extension(&self) -> &'static str {
        match self {
            ScriptFlavor::Cmd => "bat",
            ScriptFlavor::Shell => "sh",
        }
    }

    fn separator(&self) -> char {
        match self {
            ScriptFlavor::Cmd => '\\',
            ScriptFlavor::Shell => '/',
        }
    }

    fn line_ending(&self) -> &'static str {
        match self {
            ScriptFlavor::Cmd => "\r\n",
            ScriptFlavor::Shell => "\n",
        }
    }

    fn header(&self) -> &'static [&'static str] {
        match self {
            ScriptFlavor::Cmd => &["@echo off", "chcp 65001 > nul"],
            ScriptFlavor::Shell => &["#!/bin/sh"],
        }
    }

    /// Join a root and a `/`-separated relative path
    pub fn join(&self, root: &str, relative: &str) -> String {
        let sep = self.separator();
        let root = root.trim_end_matches(['/', '\\']);
        let relative: String = relative
            .chars()
            .map(|c| if c == '/' || c == '\\' { sep } else { c })
            .collect();
        format!("{}{}{}", root, sep, relative.trim_start_matches(sep))
    }

    fn make_dir_line(&self, dir: &str) -> String {
        match self {
            ScriptFlavor::Cmd => {
                let dir = escape_cmd(dir);
                format!("if not exist \"{}\\\" mkdir \"{}\"", dir, dir)
            }
            ScriptFlavor::Shell => format!("mkdir -p {}", quote_shell(dir)),
        }
    }

    fn copy_line(&self, command: &CopyCommand) -> String {
        match self {
            ScriptFlavor::Cmd => format!(
                "COPY \"{}\" \"{}\" /y",
                escape_cmd(&command.source),
                escape_cmd(&command.target)
            ),
            ScriptFlavor::Shell => format!(
                "cp -f {} {}",
                quote_shell(&command.source),
                quote_shell(&command.target)
            ),
        }
    }
}

/// `%` would be expanded as a variable reference inside a batch file
fn escape_cmd(path: &str) -> String {
    path.replace('%', "%%")
}

fn quote_shell(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

/// One file copy inside a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCommand {
    pub source: String,
    pub target: String,
}

/// A generated script and the copies it performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub id: usize,
    pub script: PathBuf,
    pub commands: Vec<CopyCommand>,
}

/// All scripts generated for one task, under a run-scoped folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRun {
    pub folder: PathBuf,
    pub jobs: Vec<BatchJob>,
    pub files: u64,
    pub bytes: u64,
}

/// Pages through Pending and writes one script per page
pub struct BatchGenerator {
    batch_root: PathBuf,
    page_size: usize,
    flavor: ScriptFlavor,
}

impl BatchGenerator {
    pub fn new(batch_root: impl Into<PathBuf>, page_size: usize, flavor: ScriptFlavor) -> Self {
        Self {
            batch_root: batch_root.into(),
            page_size: page_size.max(1),
            flavor,
        }
    }

    pub fn flavor(&self) -> ScriptFlavor {
        self.flavor
    }

    /// Write scripts for every pending record of `task`.
    ///
    /// No folder or script is created when nothing is pending.
    pub fn generate(&self, store: &dyn FileStore, task: &SyncTask) -> Result<BatchRun, SyncError> {
        let source_root = RemoteRef::local_part(&task.source_folder);
        let target_root = RemoteRef::local_part(&task.target_folder);

        let mut run = BatchRun {
            folder: self.run_folder(),
            jobs: Vec::new(),
            files: 0,
            bytes: 0,
        };
        let mut cursor = 0u64;

        loop {
            let page = store.pending_page(cursor, self.page_size)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id;

            if run.jobs.is_empty() {
                fs::create_dir_all(&run.folder)?;
            }
            let job = self.write_job(&run.folder, run.jobs.len() + 1, &page, source_root, target_root)?;
            run.files += page.len() as u64;
            run.bytes += page.iter().map(|p| p.size).sum::<u64>();
            debug!(job = job.id, files = job.commands.len(), script = %job.script.display(), "Generated batch");
            run.jobs.push(job);
        }

        info!(
            jobs = run.jobs.len(),
            files = run.files,
            folder = %run.folder.display(),
            "Batch generation finished"
        );
        Ok(run)
    }

    fn run_folder(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut folder = self.batch_root.join(&stamp);
        let mut suffix = 1;
        while folder.exists() {
            folder = self.batch_root.join(format!("{}-{}", stamp, suffix));
            suffix += 1;
        }
        folder
    }

    fn write_job(
        &self,
        folder: &Path,
        id: usize,
        page: &[PendingRecord],
        source_root: &str,
        target_root: &str,
    ) -> Result<BatchJob, SyncError> {
        let commands: Vec<CopyCommand> = page
            .iter()
            .map(|record| CopyCommand {
                source: self.flavor.join(source_root, &record.path),
                target: self.flavor.join(target_root, &record.path),
            })
            .collect();

        let sep = self.flavor.separator();
        let target_dirs: BTreeSet<&str> = commands
            .iter()
            .filter_map(|c| c.target.rsplit_once(sep).map(|(dir, _)| dir))
            .filter(|dir| !dir.is_empty())
            .collect();

        let mut lines: Vec<String> = self.flavor.header().iter().map(|l| l.to_string()).collect();
        lines.extend(target_dirs.iter().map(|dir| self.flavor.make_dir_line(dir)));
        lines.extend(commands.iter().map(|c| self.flavor.copy_line(c)));

        let eol = self.flavor.line_ending();
        let mut content = lines.join(eol);
        content.push_str(eol);

        let script = folder.join(format!("{}.{}", id, self.flavor.extension()));
        fs::write(&script, content)?;

        Ok(BatchJob {
            id,
            script,
            commands,
        })
    }
}
