//! Copy script generation and execution

mod generator;
mod pool;

pub use generator::{BatchGenerator, BatchJob, BatchRun, CopyCommand, ScriptFlavor};
pub use pool::{BatchExecutor, ExecutionReport, JobOutcome, JobStatus};
