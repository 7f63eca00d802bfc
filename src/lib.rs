//! # journsync - journal-accelerated tree diff and batched copy planner
//!
//! Enumerates a source and a target tree (through the NTFS change journal,
//! a plain directory walk, or a remote agent), records both listings in a
//! store, computes the set of files to copy under a comparison rule, and
//! writes and runs copy scripts for that set in bounded parallel batches.

// Module declarations
pub mod batch;
pub mod config;
pub mod engine;
pub mod filter;
pub mod journal;
pub mod logging;
pub mod provider;
pub mod remote;
pub mod report;
pub mod scan;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{Config, Settings};
pub use engine::{RunSummary, SyncEngine};
pub use types::{FileRecord, JournalError, Rule, SyncError, SyncTask};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
